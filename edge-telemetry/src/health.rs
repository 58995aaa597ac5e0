//! Per-cycle monitor supervision
//!
//! - on-demand monitors: refreshed on every check, this is their only trigger
//! - background monitors: respawned when the [`LivenessProbe`] reports them dead
//!
//! Refreshes run on the blocking pool with a deadline, so a wedged collector
//! costs one timeout per cycle and is skipped as busy afterwards.

use crate::monitor::{refresh_blocking, MonitorContext, MonitorMode};
use crate::registry::{MonitorEntry, MonitorRegistry, MonitorTable};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Decides whether a background monitor must be re-created
pub trait LivenessProbe: Send + Sync {
    fn needs_recreation(&self, entry: &MonitorEntry) -> bool;
}

/// Default probe: no task, a finished task, or a silent task needs recreation
#[derive(Debug, Clone)]
pub struct HeartbeatProbe {
    stale_after: Duration,
}

impl HeartbeatProbe {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }
}

impl Default for HeartbeatProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(90))
    }
}

impl LivenessProbe for HeartbeatProbe {
    fn needs_recreation(&self, entry: &MonitorEntry) -> bool {
        let Some(task) = entry.task() else {
            info!("Creating {} task", entry.name());
            return true;
        };

        if task.is_finished() {
            warn!("Recreating {} task because it is not alive", entry.name());
            return true;
        }

        let limit = self.stale_after.max(task.period() * 3);
        let age = task.heartbeat_age();
        if age > limit {
            warn!("Recreating {} task, no heartbeat for {:?}", entry.name(), age);
            return true;
        }

        debug!("Task {} is alive", entry.name());
        false
    }
}

/// What one health check did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub refreshed: Vec<String>,
    pub refresh_failures: Vec<String>,
    pub respawned: Vec<String>,
}

pub struct HealthSupervisor {
    retire_grace: Duration,
    refresh_timeout: Duration,
}

impl HealthSupervisor {
    pub fn new(retire_grace: Duration, refresh_timeout: Duration) -> Self {
        Self {
            retire_grace,
            refresh_timeout,
        }
    }

    pub fn retire_grace(&self) -> Duration {
        self.retire_grace
    }

    pub async fn check(
        &self,
        registry: &mut MonitorRegistry,
        table: &MonitorTable,
        template: &MonitorContext,
        probe: &dyn LivenessProbe,
    ) -> HealthReport {
        let mut report = HealthReport::default();

        for name in registry.names() {
            let Some(entry) = registry.get(&name) else {
                continue;
            };

            debug!("Monitor: {} - Mode: {} - Respawns: {}", name, entry.mode(), entry.respawn_count());

            match entry.mode() {
                MonitorMode::OnDemand => {
                    let monitor = entry.monitor().clone();
                    match refresh_blocking(monitor, self.refresh_timeout).await {
                        Ok(()) => report.refreshed.push(name),
                        Err(e) => {
                            error!("Error updating data in monitor {}: {}", name, e);
                            report.refresh_failures.push(name);
                        }
                    }
                }
                MonitorMode::Background => {
                    if !probe.needs_recreation(entry) {
                        continue;
                    }
                    if self.respawn(registry, table, template, &name).await {
                        report.respawned.push(name);
                    }
                }
            }
        }

        let durations: BTreeMap<&str, Option<Duration>> = registry
            .iter()
            .map(|e| (e.name(), e.monitor().try_lock().and_then(|m| m.last_process_duration())))
            .collect();
        debug!("Monitors processing duration: {:?}", durations);

        report
    }

    /// Replaces `name` with a fresh instance from the table and starts it.
    /// The previous task is stopped and joined first.
    async fn respawn(
        &self,
        registry: &mut MonitorRegistry,
        table: &MonitorTable,
        template: &MonitorContext,
        name: &str,
    ) -> bool {
        let Some(constructor) = table.lookup(name) else {
            error!("Cannot respawn monitor {}: kind no longer registered", name);
            return false;
        };
        let Some(entry) = registry.get_mut(name) else {
            return false;
        };

        let monitor = constructor(template.for_monitor(name, entry.mode()));
        let mut replacement = entry.successor(monitor);

        if let Some(old) = entry.task.take() {
            let outcome = old.retire(self.retire_grace).await;
            debug!("Previous {} task retired: {:?}", name, outcome);
        }

        replacement.start();
        info!(
            "Monitor {} started (instance {}, respawn #{})",
            name,
            replacement.instance_id(),
            replacement.respawn_count()
        );
        registry.insert(replacement);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{Monitor, MonitorError, MonitorState};
    use crate::snapshot::Snapshot;

    struct Idle {
        state: MonitorState,
    }

    impl Monitor for Idle {
        fn name(&self) -> &str {
            "idle"
        }

        fn mode(&self) -> MonitorMode {
            MonitorMode::Background
        }

        fn is_updated(&self) -> bool {
            self.state.is_updated()
        }

        fn refresh(&mut self) -> Result<(), MonitorError> {
            self.state.track(|| Ok(()))
        }

        fn contribute(&mut self, _buffer: &mut Snapshot) -> Result<(), MonitorError> {
            self.state.consume();
            Ok(())
        }

        fn period(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    fn entry() -> MonitorEntry {
        MonitorEntry::new(Box::new(Idle { state: MonitorState::new() }), MonitorMode::Background)
    }

    #[test]
    fn test_missing_task_needs_creation() {
        assert!(HeartbeatProbe::default().needs_recreation(&entry()));
    }

    #[tokio::test]
    async fn test_running_task_is_alive() {
        let mut entry = entry();
        entry.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!HeartbeatProbe::default().needs_recreation(&entry));

        if let Some(task) = entry.task.take() {
            task.retire(Duration::from_secs(1)).await;
        }
    }
}
