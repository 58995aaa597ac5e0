//! Host identity and engine facts

use chrono::{DateTime, SecondsFormat};
use edge_telemetry::{
    EdgeStatus, EngineClient, Monitor, MonitorContext, MonitorError, MonitorMode, MonitorState, NodeInfo, Snapshot,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

/// Section of the shared status fed by this monitor
pub const STATUS_SECTION: &str = "node_info";

pub struct NodeInfoMonitor {
    name: String,
    mode: MonitorMode,
    engine: Arc<dyn EngineClient>,
    status: EdgeStatus,
    state: MonitorState,
    info: Option<NodeInfo>,
    last_boot: Option<String>,
}

impl NodeInfoMonitor {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            name: ctx.name,
            mode: ctx.mode,
            engine: ctx.engine,
            status: ctx.status,
            state: MonitorState::new(),
            info: None,
            last_boot: None,
        }
    }

    /// Engine facts shared through the status object
    fn engine_section(info: &NodeInfo) -> Result<Snapshot, MonitorError> {
        let mut section = Snapshot::new();
        if let Some(version) = &info.engine_version {
            section.set("engine_version", json!(version))?;
            section.set("docker_server_version", json!(version))?;
        }
        if let Some(cluster_id) = &info.cluster_id {
            section.set("cluster_id", json!(cluster_id))?;
        }
        if let Some(role) = &info.cluster_node_role {
            section.set("cluster_node_role", json!(role))?;
        }
        section.set("container_plugins", json!(info.container_plugins))?;
        Ok(section)
    }
}

fn last_boot() -> Option<String> {
    let boot = i64::try_from(System::boot_time()).ok()?;
    DateTime::from_timestamp(boot, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl Monitor for NodeInfoMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> MonitorMode {
        self.mode
    }

    fn is_updated(&self) -> bool {
        self.state.is_updated()
    }

    fn refresh(&mut self) -> Result<(), MonitorError> {
        self.state.track(|| {
            let info = self.engine.node_info()?;
            self.status.publish(STATUS_SECTION, Self::engine_section(&info)?);
            debug!("Node info refreshed for {}", info.hostname);

            self.info = Some(info);
            self.last_boot = last_boot();
            Ok(())
        })
    }

    fn contribute(&mut self, buffer: &mut Snapshot) -> Result<(), MonitorError> {
        let Some(info) = &self.info else {
            return Ok(());
        };

        let mut fields = Snapshot::new();
        fields.set("hostname", json!(info.hostname))?;
        fields.set("operating_system", json!(info.operating_system))?;
        fields.set("architecture", json!(info.architecture))?;
        fields.set("orchestrator", json!(self.engine.orchestrator()))?;
        // Only the engine knows the cluster node id
        if let Some(node_id) = &info.node_id {
            fields.set("node_id", json!(node_id))?;
        }
        if let Some(last_boot) = &self.last_boot {
            fields.set("last_boot", json!(last_boot))?;
        }

        buffer.merge(fields);
        self.state.consume();
        Ok(())
    }

    fn last_process_duration(&self) -> Option<Duration> {
        self.state.last_process_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitors::testing::{context, StubEngine};

    #[test]
    fn test_refresh_publishes_engine_section() {
        let ctx = context("node_info", MonitorMode::OnDemand, false);
        let status = ctx.status.clone();
        let mut monitor = NodeInfoMonitor::new(ctx);

        monitor.refresh().unwrap();
        assert!(monitor.is_updated());

        let section = status.section(STATUS_SECTION).unwrap();
        assert_eq!(section.get("engine_version"), Some(&json!("24.0.7")));
        assert_eq!(section.get("cluster_id"), Some(&json!("cluster-1")));
    }

    #[test]
    fn test_contribute_writes_identity() {
        let mut monitor = NodeInfoMonitor::new(context("node_info", MonitorMode::OnDemand, false));
        monitor.refresh().unwrap();

        let mut buffer = Snapshot::new();
        monitor.contribute(&mut buffer).unwrap();
        assert_eq!(buffer.get("hostname"), Some(&json!("edge-test")));
        assert_eq!(buffer.get("operating_system"), Some(&json!("Test_OS")));
        assert_eq!(buffer.get("orchestrator"), Some(&json!("docker")));
        assert!(!buffer.is_defined("node_id"));
        assert!(!monitor.is_updated());
    }

    #[test]
    fn test_node_id_comes_from_engine() {
        let mut ctx = context("node_info", MonitorMode::OnDemand, false);
        ctx.engine = Arc::new(StubEngine {
            fail: false,
            node_id: Some("swarm-node-7".into()),
        });
        let mut monitor = NodeInfoMonitor::new(ctx);
        monitor.refresh().unwrap();

        let mut buffer = Snapshot::new();
        monitor.contribute(&mut buffer).unwrap();
        assert_eq!(buffer.get("node_id"), Some(&json!("swarm-node-7")));
    }

    #[test]
    fn test_engine_failure_leaves_nothing() {
        let mut monitor = NodeInfoMonitor::new(context("node_info", MonitorMode::OnDemand, true));
        assert!(monitor.refresh().is_err());
        assert!(!monitor.is_updated());

        let mut buffer = Snapshot::new();
        monitor.contribute(&mut buffer).unwrap();
        assert!(buffer.is_empty());
    }
}
