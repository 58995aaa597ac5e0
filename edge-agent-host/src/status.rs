//! Status aggregator: turns module liveness reports into the node state
//! published on the shared status object

use edge_telemetry::{EdgeStatus, NodeState, StatusHandler, StatusReport};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Section of the shared status fed by the aggregator
pub const STATUS_SECTION: &str = "agent_status";

pub struct StatusAggregator {
    handler: StatusHandler,
    edge_status: EdgeStatus,
    state: NodeState,
}

impl StatusAggregator {
    pub fn new(edge_status: EdgeStatus) -> Self {
        Self {
            handler: StatusHandler::new(),
            edge_status,
            state: NodeState::Unknown,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Folds `report` and anything already queued behind it, then publishes
    pub fn apply(&mut self, report: StatusReport, channel: &mut mpsc::Receiver<StatusReport>) {
        self.handler.add_report(report);
        self.handler.drain(channel);

        let (state, notes) = self.handler.process();
        if state != self.state {
            info!("Node state changed: {:?} -> {:?}", self.state, state);
        }
        debug!("Status notes: {:?}", notes);
        self.state = state;

        self.edge_status.publish(STATUS_SECTION, self.handler.to_snapshot());
    }

    pub async fn run(mut self, mut channel: mpsc::Receiver<StatusReport>) {
        info!("Status aggregator started");
        while let Some(report) = channel.recv().await {
            self.apply(report, &mut channel);
        }
        debug!("Status queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_telemetry::ModuleStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_apply_publishes_section() {
        let edge_status = EdgeStatus::new();
        let mut aggregator = StatusAggregator::new(edge_status.clone());
        let (tx, mut rx) = mpsc::channel(8);

        tx.send(StatusReport::new("network", ModuleStatus::Running, "")).await.unwrap();
        aggregator.apply(StatusReport::new("telemetry", ModuleStatus::Running, ""), &mut rx);

        assert_eq!(aggregator.state(), NodeState::Operational);
        let section = edge_status.section(STATUS_SECTION).unwrap();
        assert_eq!(section.get("status"), Some(&json!("OPERATIONAL")));
        assert_eq!(section.get("status_notes").unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_module_degrades() {
        let edge_status = EdgeStatus::new();
        let mut aggregator = StatusAggregator::new(edge_status.clone());
        let (_tx, mut rx) = mpsc::channel(8);

        aggregator.apply(StatusReport::new("telemetry", ModuleStatus::Running, ""), &mut rx);
        aggregator.apply(StatusReport::new("peripherals", ModuleStatus::Failing, "usb scan"), &mut rx);

        assert_eq!(aggregator.state(), NodeState::Degraded);
        assert_eq!(edge_status.current_info().get("status"), Some(&json!("DEGRADED")));
    }
}
