//! Edge Telemetry - orchestration loop of the edge agent
//!
//! Runs a set of pluggable monitors, merges their output into one node
//! status snapshot and publishes it to a bounded delivery queue:
//! - Snapshot model with defined/undefined fields and diffing
//! - Monitors, on-demand or self-scheduled in the background
//! - Health supervision that respawns dead background monitors
//! - Non-blocking delivery with drop-on-full backpressure

pub mod config;
pub mod engine;
pub mod health;
pub mod monitor;
pub mod registry;
pub mod snapshot;
pub mod status;
pub mod telemetry;

pub use config::{ConfigError, MonitorSettings, TelemetryConfig};
pub use engine::{ContainerStats, EngineClient, EngineError, NodeInfo};
pub use health::{HealthReport, HeartbeatProbe, LivenessProbe};
pub use monitor::{Monitor, MonitorContext, MonitorError, MonitorMode, MonitorState, SharedMonitor};
pub use registry::{Constructor, MonitorEntry, MonitorRegistry, MonitorTable};
pub use snapshot::{diff, Diff, Snapshot, SnapshotError};
pub use status::{EdgeStatus, LivenessTracker, ModuleStatus, NodeState, StatusHandler, StatusReport, StatusSender};
pub use telemetry::{CycleStats, Delivery, Telemetry, COMPONENT_NAME};
