/*!
Sonde de vivacité scriptée: le test décide quels monitors sont morts.
*/

use edge_telemetry::{LivenessProbe, MonitorEntry};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct ScriptedProbe {
    dead: Mutex<BTreeSet<String>>,
    queries: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dead(&self, name: &str) {
        self.dead.lock().insert(name.to_string());
    }

    /// Number of liveness questions asked so far
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl LivenessProbe for ScriptedProbe {
    fn needs_recreation(&self, entry: &MonitorEntry) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.dead.lock().contains(entry.name())
    }
}
