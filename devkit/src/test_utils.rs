/*!
Test Harness pour l'orchestrateur de télémétrie

Facilite l'écriture de tests avec:
- Table de monitors simulés et compteurs partagés
- Files de rapports et de statuts à capacité choisie
- Sonde scriptée ou sonde par heartbeat réelle
*/

use crate::mock_engine::{MockEngine, RecordingTracker};
use crate::mock_monitor::{MockBehavior, MockMonitor, MonitorCounters};
use crate::probe::ScriptedProbe;
use edge_telemetry::{MonitorMode, MonitorSettings, MonitorTable, Snapshot, StatusReport, Telemetry};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Node identity used by every harness
pub const TEST_NODE_ID: &str = "node/1234";

/// Builder of a fully wired [`Telemetry`]
pub struct TestHarness {
    table: MonitorTable,
    excluded: BTreeSet<String>,
    report_capacity: usize,
    status_capacity: usize,
    settings: MonitorSettings,
    heartbeat_probe: bool,
}

/// A built orchestrator and the test side of its collaborators
pub struct HarnessRun {
    pub telemetry: Telemetry,
    pub reports: mpsc::Receiver<Snapshot>,
    pub statuses: mpsc::Receiver<StatusReport>,
    pub probe: Arc<ScriptedProbe>,
    pub tracker: Arc<RecordingTracker>,
    report_tx: mpsc::Sender<Snapshot>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Self {
        // Init logging pour tests
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        Self {
            table: MonitorTable::new(),
            excluded: BTreeSet::new(),
            report_capacity: 10,
            status_capacity: 64,
            settings: MonitorSettings::default(),
            heartbeat_probe: false,
        }
    }

    pub fn with_report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Keeps the default heartbeat probe instead of the scripted one
    pub fn with_heartbeat_probe(mut self) -> Self {
        self.heartbeat_probe = true;
        self
    }

    /// Registers a mock monitor kind and returns its counters
    pub fn register(&mut self, kind: &str, mode: MonitorMode, behavior: MockBehavior) -> Arc<MonitorCounters> {
        MockMonitor::register(&mut self.table, kind, mode, behavior)
    }

    pub fn exclude(&mut self, kind: &str) -> &mut Self {
        self.excluded.insert(kind.to_string());
        self
    }

    pub fn table_mut(&mut self) -> &mut MonitorTable {
        &mut self.table
    }

    pub fn build(self) -> HarnessRun {
        let (report_tx, reports) = mpsc::channel(self.report_capacity);
        let (status_tx, statuses) = mpsc::channel(self.status_capacity);
        let engine = Arc::new(MockEngine::new());
        let probe = Arc::new(ScriptedProbe::new());
        let tracker = Arc::new(RecordingTracker::new());

        let mut telemetry = Telemetry::new(
            engine,
            report_tx.clone(),
            status_tx,
            TEST_NODE_ID,
            self.excluded,
            Arc::new(self.table),
            &self.settings,
        )
        .with_liveness_tracker(tracker.clone());

        if !self.heartbeat_probe {
            telemetry = telemetry.with_probe(probe.clone());
        }
        info!("🧪 Harness built with {} monitors", telemetry.registry().len());

        HarnessRun {
            telemetry,
            reports,
            statuses,
            probe,
            tracker,
            report_tx,
        }
    }
}

impl HarnessRun {
    /// Every report currently queued, oldest first
    pub fn received_reports(&mut self) -> Vec<Snapshot> {
        let mut received = Vec::new();
        while let Ok(report) = self.reports.try_recv() {
            received.push(report);
        }
        received
    }

    /// Fills the report queue so the next publish finds it saturated
    pub fn saturate_reports(&self) {
        while self.report_tx.try_send(Snapshot::new()).is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_harness_builds_registry() {
        let mut harness = TestHarness::new();
        let counters = harness.register("a", MonitorMode::OnDemand, MockBehavior::with_field("ip", json!("10.0.0.1")));
        harness.register("b", MonitorMode::Background, MockBehavior::default());
        harness.exclude("b");

        let run = harness.build();
        assert_eq!(run.telemetry.registry().names(), vec!["a"]);
        assert_eq!(counters.constructions(), 1);
    }

    #[test]
    fn test_saturate_reports() {
        let mut run = TestHarness::new().with_report_capacity(2).build();
        run.saturate_reports();
        assert_eq!(run.received_reports().len(), 2);
    }
}
