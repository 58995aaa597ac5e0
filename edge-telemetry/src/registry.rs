//! Monitor table (kind name -> constructor) and the name-keyed registry of
//! live monitor instances built from it.

use crate::monitor::{share, BackgroundTask, Monitor, MonitorContext, MonitorMode, SharedMonitor};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Builds one monitor instance from its context
pub type Constructor = Arc<dyn Fn(MonitorContext) -> Box<dyn Monitor> + Send + Sync>;

struct Registration {
    kind: String,
    mode: MonitorMode,
    constructor: Constructor,
}

/// Statically registered monitor kinds, in registration order
#[derive(Default)]
pub struct MonitorTable {
    registrations: Vec<Registration>,
}

impl MonitorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `kind`; an existing registration with the same name is replaced
    pub fn register<F>(&mut self, kind: &str, mode: MonitorMode, constructor: F)
    where
        F: Fn(MonitorContext) -> Box<dyn Monitor> + Send + Sync + 'static,
    {
        let registration = Registration {
            kind: kind.to_string(),
            mode,
            constructor: Arc::new(constructor),
        };

        if let Some(existing) = self.registrations.iter_mut().find(|r| r.kind == kind) {
            warn!("Monitor kind {} registered twice, replacing", kind);
            *existing = registration;
        } else {
            self.registrations.push(registration);
        }
    }

    pub fn lookup(&self, kind: &str) -> Option<Constructor> {
        self.registrations
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.constructor.clone())
    }

    pub fn mode_of(&self, kind: &str) -> Option<MonitorMode> {
        self.registrations.iter().find(|r| r.kind == kind).map(|r| r.mode)
    }

    pub fn kinds(&self) -> Vec<String> {
        self.registrations.iter().map(|r| r.kind.clone()).collect()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.registrations.iter().any(|r| r.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

/// A registered monitor instance and its supervision state
pub struct MonitorEntry {
    name: String,
    mode: MonitorMode,
    monitor: SharedMonitor,
    instance_id: Uuid,
    respawn_count: u32,
    pub(crate) task: Option<BackgroundTask>,
}

impl MonitorEntry {
    pub fn new(monitor: Box<dyn Monitor>, mode: MonitorMode) -> Self {
        let name = monitor.name().to_string();
        Self {
            name,
            mode,
            monitor: share(monitor),
            instance_id: Uuid::new_v4(),
            respawn_count: 0,
            task: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn monitor(&self) -> &SharedMonitor {
        &self.monitor
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn respawn_count(&self) -> u32 {
        self.respawn_count
    }

    pub fn task(&self) -> Option<&BackgroundTask> {
        self.task.as_ref()
    }

    /// Starts the refresh loop of a background monitor, if not already running
    pub fn start(&mut self) {
        if self.mode == MonitorMode::Background && self.task.is_none() {
            self.task = Some(BackgroundTask::spawn(self.monitor.clone()));
        }
    }

    /// Builds the entry that replaces this one, keeping name, mode and history
    pub(crate) fn successor(&self, monitor: Box<dyn Monitor>) -> Self {
        let mut next = MonitorEntry::new(monitor, self.mode);
        next.name = self.name.clone();
        next.respawn_count = self.respawn_count + 1;
        next
    }
}

/// Live monitors keyed by unique name
#[derive(Default)]
pub struct MonitorRegistry {
    entries: BTreeMap<String, MonitorEntry>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the registry from every kind of `table` not listed in `excluded`.
    ///
    /// Running background tasks of the previous build are dropped, which
    /// stops them at their next wake-up.
    pub fn build(&mut self, table: &MonitorTable, template: &MonitorContext, excluded: &BTreeSet<String>) {
        self.entries.clear();

        for name in excluded {
            if !table.contains(name) {
                warn!("Excluded monitor {} is not a known monitor kind", name);
            }
        }

        for kind in table.kinds() {
            if excluded.contains(&kind) {
                info!("Monitor {} excluded by configuration", kind);
                continue;
            }

            let (Some(constructor), Some(mode)) = (table.lookup(&kind), table.mode_of(&kind)) else {
                continue;
            };

            let monitor = constructor(template.for_monitor(&kind, mode));
            debug!("Monitor {} built ({})", kind, mode);
            let mut entry = MonitorEntry::new(monitor, mode);
            entry.name = kind.clone();
            self.entries.insert(kind, entry);
        }

        info!("Monitor registry built with {} monitors: [{}]", self.entries.len(), self.names().join(", "));
    }

    pub fn insert(&mut self, entry: MonitorEntry) -> Option<MonitorEntry> {
        self.entries.insert(entry.name.clone(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&MonitorEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MonitorEntry> {
        self.entries.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<MonitorEntry> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitorEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MonitorEntry> {
        self.entries.values_mut()
    }

    pub(crate) fn drain(&mut self) -> Vec<MonitorEntry> {
        std::mem::take(&mut self.entries).into_values().collect()
    }
}
