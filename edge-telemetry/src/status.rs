//! Node status: the shared status object, module liveness reports and their
//! aggregation into an overall node state.

use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Reports older than this are treated as failing
pub const STATUS_TIMEOUT_SECS: i64 = 5 * 60;

/// Status object maintained outside the orchestrator.
///
/// Writers publish whole sections; readers get the folded view through
/// [`EdgeStatus::current_info`]. Cloning shares the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct EdgeStatus {
    sections: Arc<RwLock<BTreeMap<String, Snapshot>>>,
}

impl EdgeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the content of `section`
    pub fn publish(&self, section: &str, data: Snapshot) {
        self.sections.write().insert(section.to_string(), data);
    }

    pub fn section(&self, section: &str) -> Option<Snapshot> {
        self.sections.read().get(section).cloned()
    }

    /// All sections folded into one snapshot, empty values dropped.
    /// Sections are applied in name order, so a later section wins on conflicts.
    pub fn current_info(&self) -> Snapshot {
        let sections = self.sections.read();
        let mut info = Snapshot::new();
        for data in sections.values() {
            info.merge(data.clone().without_empty());
        }
        info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleStatus {
    Starting,
    Running,
    Stopped,
    Failing,
    Failed,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Starting => "STARTING",
            ModuleStatus::Running => "RUNNING",
            ModuleStatus::Stopped => "STOPPED",
            ModuleStatus::Failing => "FAILING",
            ModuleStatus::Failed => "FAILED",
        }
    }

    fn is_degraded(&self) -> bool {
        matches!(self, ModuleStatus::Stopped | ModuleStatus::Failing | ModuleStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub origin_module: String,
    pub module_status: ModuleStatus,
    pub date: DateTime<Utc>,
    pub message: String,
}

impl StatusReport {
    pub fn new(origin_module: &str, module_status: ModuleStatus, message: &str) -> Self {
        Self {
            origin_module: origin_module.to_string(),
            module_status,
            date: Utc::now(),
            message: message.to_string(),
        }
    }
}

/// Capability used by components to signal they are alive
pub trait LivenessTracker: Send + Sync {
    fn mark_running(&self, component: &str);
}

/// Sending half of the bounded status queue
#[derive(Debug, Clone)]
pub struct StatusSender {
    channel: mpsc::Sender<StatusReport>,
}

impl StatusSender {
    pub fn new(channel: mpsc::Sender<StatusReport>) -> Self {
        Self { channel }
    }

    /// Zero-wait send; a saturated or closed queue drops the report
    pub fn send(&self, component: &str, status: ModuleStatus, message: &str) -> bool {
        match self.channel.try_send(StatusReport::new(component, status, message)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Status queue is full, dropping {} report from {}", status.as_str(), component);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Status queue closed, dropping {} report from {}", status.as_str(), component);
                false
            }
        }
    }

    pub fn starting(&self, component: &str, message: &str) -> bool {
        self.send(component, ModuleStatus::Starting, message)
    }

    pub fn stopped(&self, component: &str, message: &str) -> bool {
        self.send(component, ModuleStatus::Stopped, message)
    }

    pub fn failing(&self, component: &str, message: &str) -> bool {
        self.send(component, ModuleStatus::Failing, message)
    }
}

impl LivenessTracker for StatusSender {
    fn mark_running(&self, component: &str) {
        self.send(component, ModuleStatus::Running, "");
    }
}

/// Overall state derived from module reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Operational,
    Degraded,
    Unknown,
}

/// Aggregates the latest report of every module
#[derive(Debug)]
pub struct StatusHandler {
    reports: BTreeMap<String, StatusReport>,
    state: NodeState,
    notes: Vec<String>,
}

impl Default for StatusHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandler {
    pub fn new() -> Self {
        Self {
            reports: BTreeMap::new(),
            state: NodeState::Unknown,
            notes: Vec::new(),
        }
    }

    pub fn add_report(&mut self, report: StatusReport) {
        self.reports.insert(report.origin_module.clone(), report);
    }

    /// Moves every queued report into the handler without waiting
    pub fn drain(&mut self, channel: &mut mpsc::Receiver<StatusReport>) -> usize {
        let mut received = 0;
        while let Ok(report) = channel.try_recv() {
            self.add_report(report);
            received += 1;
        }
        debug!("Consumed {} status reports", received);
        received
    }

    pub fn process(&mut self) -> (NodeState, &[String]) {
        self.process_at(Utc::now())
    }

    pub fn process_at(&mut self, now: DateTime<Utc>) -> (NodeState, &[String]) {
        let mut state = NodeState::Unknown;
        let mut notes = Vec::with_capacity(self.reports.len());

        for (module, report) in &self.reports {
            let age = (now - report.date).num_seconds().max(0);
            let stale = age > STATUS_TIMEOUT_SECS;

            if report.module_status.is_degraded() || stale {
                if state != NodeState::Degraded {
                    warn!("Module {} reports {} ({}s ago)", module, report.module_status.as_str(), age);
                }
                state = NodeState::Degraded;
            } else if state != NodeState::Degraded {
                state = NodeState::Operational;
            }

            let message = if report.message.is_empty() {
                String::new()
            } else {
                format!(" - {}", report.message)
            };
            notes.push(format!(
                "{:<16} - {:<6}s: {:<9}{}",
                module,
                age,
                report.module_status.as_str(),
                message
            ));
        }

        self.state = state;
        self.notes = notes;
        (self.state, &self.notes)
    }

    /// `status` and `status_notes` fields for the telemetry snapshot
    pub fn to_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        // both fields are part of the schema
        let _ = snapshot.set("status", json!(self.state));
        let _ = snapshot.set("status_notes", json!(self.notes));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn report_at(module: &str, status: ModuleStatus, date: DateTime<Utc>) -> StatusReport {
        StatusReport {
            origin_module: module.to_string(),
            module_status: status,
            date,
            message: String::new(),
        }
    }

    #[test]
    fn test_edge_status_folds_sections() {
        let status = EdgeStatus::new();
        let mut info = Snapshot::new();
        info.set("operating_system", json!("Test_OS")).unwrap();
        info.set("hostname", json!("")).unwrap();
        status.publish("node_info", info);

        let mut agent = Snapshot::new();
        agent.set("status", json!("OPERATIONAL")).unwrap();
        status.publish("agent_status", agent);

        let current = status.current_info();
        assert_eq!(current.get("operating_system"), Some(&json!("Test_OS")));
        assert_eq!(current.get("status"), Some(&json!("OPERATIONAL")));
        assert!(!current.is_defined("hostname"));
    }

    #[test]
    fn test_clones_share_state() {
        let status = EdgeStatus::new();
        let writer = status.clone();
        let mut info = Snapshot::new();
        info.set("ip", json!("10.1.1.1")).unwrap();
        writer.publish("network", info);
        assert!(status.section("network").is_some());
    }

    #[test]
    fn test_no_reports_is_unknown() {
        let mut handler = StatusHandler::new();
        let (state, notes) = handler.process();
        assert_eq!(state, NodeState::Unknown);
        assert!(notes.is_empty());
    }

    #[test]
    fn test_running_modules_are_operational() {
        let now = Utc::now();
        let mut handler = StatusHandler::new();
        handler.add_report(report_at("telemetry", ModuleStatus::Running, now));
        handler.add_report(report_at("reporter", ModuleStatus::Starting, now));

        let (state, notes) = handler.process_at(now);
        assert_eq!(state, NodeState::Operational);
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn test_one_failing_module_degrades_node() {
        let now = Utc::now();
        let mut handler = StatusHandler::new();
        handler.add_report(report_at("a_module", ModuleStatus::Failed, now));
        handler.add_report(report_at("telemetry", ModuleStatus::Running, now));

        let (state, _) = handler.process_at(now);
        assert_eq!(state, NodeState::Degraded);
    }

    #[test]
    fn test_stale_report_degrades_node() {
        let now = Utc::now();
        let mut handler = StatusHandler::new();
        handler.add_report(report_at("telemetry", ModuleStatus::Running, now - Duration::minutes(10)));

        let (state, _) = handler.process_at(now);
        assert_eq!(state, NodeState::Degraded);
    }

    #[test]
    fn test_latest_report_wins() {
        let now = Utc::now();
        let mut handler = StatusHandler::new();
        handler.add_report(report_at("telemetry", ModuleStatus::Failing, now));
        handler.add_report(report_at("telemetry", ModuleStatus::Running, now));

        let (state, notes) = handler.process_at(now);
        assert_eq!(state, NodeState::Operational);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("telemetry        - 0     s: RUNNING"));
    }

    #[tokio::test]
    async fn test_sender_and_drain() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = StatusSender::new(tx);

        sender.mark_running("telemetry");
        // queue holds a single report
        assert!(!sender.failing("telemetry", "late"));

        let mut handler = StatusHandler::new();
        assert_eq!(handler.drain(&mut rx), 1);
        handler.process();

        let snapshot = handler.to_snapshot();
        assert_eq!(snapshot.get("status"), Some(&json!("OPERATIONAL")));
        assert_eq!(snapshot.get("status_notes").and_then(|n| n.as_array()).map(Vec::len), Some(1));
    }
}
