//! Telemetry orchestrator
//!
//! One [`Telemetry::run`] call is one cycle:
//! 1. collect: merge the contributions of updated monitors into the snapshot
//! 2. health: refresh on-demand monitors, respawn dead background ones
//! 3. status: bridge the shared [`EdgeStatus`] onto the snapshot
//! 4. publish: stamp the time and try to enqueue a copy, never waiting
//!
//! No phase propagates an error out of `run()`.

use crate::config::MonitorSettings;
use crate::engine::EngineClient;
use crate::health::{HealthReport, HealthSupervisor, HeartbeatProbe, LivenessProbe};
use crate::monitor::{contain, MonitorContext, MonitorMode};
use crate::registry::{MonitorRegistry, MonitorTable};
use crate::snapshot::Snapshot;
use crate::status::{EdgeStatus, LivenessTracker, StatusReport, StatusSender};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

/// Name under which the orchestrator reports its liveness
pub const COMPONENT_NAME: &str = "telemetry";

/// Outcome of one publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Queue saturated, report dropped
    Dropped,
    /// Consumer gone, report dropped
    Disconnected,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub reports_sent: u64,
    pub reports_dropped: u64,
    pub contribute_failures: u64,
    pub respawns: u64,
}

pub struct Telemetry {
    node_id: String,
    snapshot: Snapshot,
    report_channel: mpsc::Sender<Snapshot>,
    edge_status: EdgeStatus,
    table: Arc<MonitorTable>,
    registry: MonitorRegistry,
    excluded: BTreeSet<String>,
    template: MonitorContext,
    probe: Arc<dyn LivenessProbe>,
    liveness: Arc<dyn LivenessTracker>,
    supervisor: HealthSupervisor,
    stats: CycleStats,
}

impl Telemetry {
    /// Builds the orchestrator and its monitor registry
    pub fn new(
        engine: Arc<dyn EngineClient>,
        report_channel: mpsc::Sender<Snapshot>,
        status_channel: mpsc::Sender<StatusReport>,
        node_id: &str,
        excluded: BTreeSet<String>,
        table: Arc<MonitorTable>,
        settings: &MonitorSettings,
    ) -> Self {
        debug!("Initialising Telemetry for {}", node_id);
        info!("Excluded monitors received in Telemetry: {:?}", excluded);

        let edge_status = EdgeStatus::new();
        let template = MonitorContext {
            name: String::new(),
            mode: MonitorMode::OnDemand,
            node_id: node_id.to_string(),
            engine,
            status: edge_status.clone(),
            period: settings.period(),
        };

        let mut telemetry = Self {
            node_id: node_id.to_string(),
            snapshot: Snapshot::new(),
            report_channel,
            edge_status,
            table,
            registry: MonitorRegistry::new(),
            excluded,
            template,
            probe: Arc::new(HeartbeatProbe::new(settings.heartbeat_timeout())),
            liveness: Arc::new(StatusSender::new(status_channel)),
            supervisor: HealthSupervisor::new(settings.retire_timeout(), settings.refresh_timeout()),
            stats: CycleStats::default(),
        };
        telemetry.initialize_monitors();
        telemetry
    }

    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_liveness_tracker(mut self, tracker: Arc<dyn LivenessTracker>) -> Self {
        self.liveness = tracker;
        self
    }

    /// Builds (or rebuilds) the registry from the table minus excluded kinds
    pub fn initialize_monitors(&mut self) {
        self.registry.build(&self.table, &self.template, &self.excluded);
    }

    /// Merges the contributions of every updated monitor, then applies them
    /// to the snapshot with a single merge.
    ///
    /// Never waits on a monitor: one locked by a refresh in progress counts
    /// as not updated for this cycle.
    pub fn collect_metrics(&mut self) {
        let mut buffer = Snapshot::new();

        for entry in self.registry.iter() {
            let name = entry.name();
            let Some(mut monitor) = entry.monitor().try_lock() else {
                info!("Monitor {} busy refreshing, skipped this cycle", name);
                continue;
            };

            if !monitor.is_updated() {
                info!("Data not updated yet in monitor {}", name);
                continue;
            }

            if let Err(e) = contain(|| monitor.contribute(&mut buffer)) {
                error!("Error retrieving data from monitor {}: {}", name, e);
                self.stats.contribute_failures += 1;
            }
        }

        debug!("Merging {} collected fields", buffer.len());
        self.snapshot.merge(buffer);
    }

    pub async fn check_health(&mut self) -> HealthReport {
        let report = self
            .supervisor
            .check(&mut self.registry, &self.table, &self.template, self.probe.as_ref())
            .await;
        self.stats.respawns += report.respawned.len() as u64;
        report
    }

    /// Copies the defined fields of the shared status onto the snapshot
    pub fn sync_status(&mut self) {
        let info = self.edge_status.current_info();
        if !info.is_empty() {
            self.snapshot.merge(info);
        }
    }

    /// Zero-wait enqueue of a copy of the snapshot
    pub fn publish(&mut self) -> Delivery {
        debug!("Writing telemetry to report queue: {}", self.snapshot.to_json());

        match self.report_channel.try_send(self.snapshot.clone()) {
            Ok(()) => {
                self.stats.reports_sent += 1;
                Delivery::Sent
            }
            Err(TrySendError::Full(_)) => {
                warn!("Telemetry queue is full, agent not consuming data...");
                self.stats.reports_dropped += 1;
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                error!("Telemetry queue closed, report dropped");
                self.stats.reports_dropped += 1;
                Delivery::Disconnected
            }
        }
    }

    /// One full cycle: collect, health check, status sync, publish
    pub async fn run(&mut self) {
        info!("Collecting monitor metrics...");
        self.collect_metrics();
        self.check_health().await;

        info!("Translating telemetry data");
        self.sync_status();

        // current_time always changes, so every cycle carries at least one update
        self.snapshot.stamp(Utc::now());
        self.publish();

        self.stats.cycles += 1;
        self.liveness.mark_running(COMPONENT_NAME);
    }

    /// Stops and joins every background task
    pub async fn shutdown(&mut self) {
        info!("Stopping telemetry monitors for {}", self.node_id);
        let grace = self.supervisor.retire_grace();
        for mut entry in self.registry.drain() {
            if let Some(task) = entry.task.take() {
                let outcome = task.retire(grace).await;
                debug!("Monitor {} retired: {:?}", entry.name(), outcome);
            }
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub fn edge_status(&self) -> &EdgeStatus {
        &self.edge_status
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }
}
