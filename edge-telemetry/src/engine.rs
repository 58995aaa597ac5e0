//! Orchestration engine capability used by monitors
//!
//! The orchestrator never calls the engine itself; it only hands the client
//! to monitors through their [`crate::monitor::MonitorContext`].

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Container engine unavailable: {0}")]
    Unavailable(String),
    #[error("Engine command failed: {0}")]
    Command(String),
    #[error("Cannot parse engine output: {0}")]
    Parse(String),
}

/// Host and cluster facts reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub hostname: String,
    pub operating_system: String,
    pub architecture: String,
    pub engine_version: Option<String>,
    pub node_id: Option<String>,
    pub cluster_id: Option<String>,
    pub cluster_node_role: Option<String>,
    pub container_plugins: Vec<String>,
}

/// Per-container resource usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub id: String,
    pub name: String,
    pub cpu_percent: f64,
    pub mem_usage_mb: f64,
    pub mem_limit_mb: f64,
    pub net_in_mb: f64,
    pub net_out_mb: f64,
    pub status: String,
}

pub trait EngineClient: Send + Sync {
    /// Engine family, e.g. `docker` or `kubernetes`
    fn orchestrator(&self) -> &str;

    fn node_info(&self) -> Result<NodeInfo, EngineError>;

    fn container_stats(&self) -> Result<Vec<ContainerStats>, EngineError>;
}
