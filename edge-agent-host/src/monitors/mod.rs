//! Built-in host monitors
//!
//! Each monitor owns its collector state (sysinfo handles, engine client)
//! and writes its fields into the cycle buffer in one piece:
//! - node_info (on-demand): host identity, boot time, engine facts
//! - resources (background): CPU, memory, disks
//! - network (background): interfaces, addresses, traffic counters
//! - temperature (on-demand): sensor readings
//! - container_stats (on-demand): per-container usage from the engine

mod container_stats;
mod network;
mod node_info;
mod resources;
mod temperature;

pub use container_stats::ContainerStatsMonitor;
pub use network::NetworkMonitor;
pub use node_info::NodeInfoMonitor;
pub use resources::ResourcesMonitor;
pub use temperature::TemperatureMonitor;

use edge_telemetry::{Monitor, MonitorMode, MonitorTable};

/// Registers every built-in monitor kind, in collection order
pub fn register_builtin(table: &mut MonitorTable) {
    table.register("node_info", MonitorMode::OnDemand, |ctx| {
        Box::new(NodeInfoMonitor::new(ctx)) as Box<dyn Monitor>
    });
    table.register("resources", MonitorMode::Background, |ctx| {
        Box::new(ResourcesMonitor::new(ctx)) as Box<dyn Monitor>
    });
    table.register("network", MonitorMode::Background, |ctx| {
        Box::new(NetworkMonitor::new(ctx)) as Box<dyn Monitor>
    });
    table.register("temperature", MonitorMode::OnDemand, |ctx| {
        Box::new(TemperatureMonitor::new(ctx)) as Box<dyn Monitor>
    });
    table.register("container_stats", MonitorMode::OnDemand, |ctx| {
        Box::new(ContainerStatsMonitor::new(ctx)) as Box<dyn Monitor>
    });
}

#[cfg(test)]
pub(crate) mod testing {
    use edge_telemetry::{
        ContainerStats, EdgeStatus, EngineClient, EngineError, MonitorContext, MonitorMode, NodeInfo,
    };
    use std::sync::Arc;
    use std::time::Duration;

    /// Engine returning fixed data, or failing on every call
    pub struct StubEngine {
        pub fail: bool,
        /// Cluster node id reported by the engine
        pub node_id: Option<String>,
    }

    impl EngineClient for StubEngine {
        fn orchestrator(&self) -> &str {
            "docker"
        }

        fn node_info(&self) -> Result<NodeInfo, EngineError> {
            if self.fail {
                return Err(EngineError::Unavailable("stub".into()));
            }
            Ok(NodeInfo {
                hostname: "edge-test".into(),
                operating_system: "Test_OS".into(),
                architecture: "x86_64".into(),
                engine_version: Some("24.0.7".into()),
                cluster_id: Some("cluster-1".into()),
                node_id: self.node_id.clone(),
                ..NodeInfo::default()
            })
        }

        fn container_stats(&self) -> Result<Vec<ContainerStats>, EngineError> {
            if self.fail {
                return Err(EngineError::Unavailable("stub".into()));
            }
            Ok(vec![ContainerStats {
                id: "abc123".into(),
                name: "web".into(),
                cpu_percent: 1.5,
                status: "running".into(),
                ..ContainerStats::default()
            }])
        }
    }

    pub fn context(name: &str, mode: MonitorMode, fail: bool) -> MonitorContext {
        MonitorContext {
            name: name.to_string(),
            mode,
            node_id: "node/1234".into(),
            engine: Arc::new(StubEngine { fail, node_id: None }),
            status: EdgeStatus::new(),
            period: Duration::from_secs(15),
        }
    }
}
