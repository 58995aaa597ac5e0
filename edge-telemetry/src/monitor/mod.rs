//! Monitor capability
//!
//! A monitor collects one telemetry category. It runs either:
//! - on demand: the health check calls [`Monitor::refresh`] every cycle
//! - in the background: a [`task::BackgroundTask`] calls it on the monitor's own period
//!
//! Either way the orchestrator only consumes data through [`Monitor::contribute`].

pub mod task;

use crate::engine::{EngineClient, EngineError};
use crate::snapshot::{Snapshot, SnapshotError};
use crate::status::EdgeStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use task::BackgroundTask;

/// Cadence used by background monitors that do not override [`Monitor::period`]
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorMode {
    OnDemand,
    Background,
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::OnDemand => write!(f, "on-demand"),
            MonitorMode::Background => write!(f, "background"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Collection failed: {0}")]
    Collection(String),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("Monitor panicked: {0}")]
    Panicked(String),
    #[error("Monitor busy with a previous refresh")]
    Busy,
    #[error("Refresh did not complete within {0:?}")]
    TimedOut(Duration),
}

pub trait Monitor: Send {
    fn name(&self) -> &str;

    fn mode(&self) -> MonitorMode;

    /// New data is available since the last successful [`Monitor::contribute`]
    fn is_updated(&self) -> bool;

    /// Collects fresh data; marks the monitor updated on success
    fn refresh(&mut self) -> Result<(), MonitorError>;

    /// Writes the currently available fields into `buffer`.
    ///
    /// Implementations only write once all their fields are ready, and clear
    /// the updated flag on success.
    fn contribute(&mut self, buffer: &mut Snapshot) -> Result<(), MonitorError>;

    fn period(&self) -> Duration {
        DEFAULT_PERIOD
    }

    fn last_process_duration(&self) -> Option<Duration> {
        None
    }
}

pub type SharedMonitor = Arc<Mutex<Box<dyn Monitor>>>;

pub fn share(monitor: Box<dyn Monitor>) -> SharedMonitor {
    Arc::new(Mutex::new(monitor))
}

/// Freshness bookkeeping embedded by concrete monitors
#[derive(Debug, Default, Clone)]
pub struct MonitorState {
    updated: bool,
    last_process_duration: Option<Duration>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn last_process_duration(&self) -> Option<Duration> {
        self.last_process_duration
    }

    /// Runs one collection, timing it and marking the state updated on success
    pub fn track<F>(&mut self, collect: F) -> Result<(), MonitorError>
    where
        F: FnOnce() -> Result<(), MonitorError>,
    {
        let started = Instant::now();
        let result = collect();
        self.last_process_duration = Some(started.elapsed());
        if result.is_ok() {
            self.updated = true;
        }
        result
    }

    pub fn consume(&mut self) {
        self.updated = false;
    }
}

/// What a monitor receives at construction time
#[derive(Clone)]
pub struct MonitorContext {
    pub name: String,
    pub mode: MonitorMode,
    pub node_id: String,
    pub engine: Arc<dyn EngineClient>,
    pub status: EdgeStatus,
    pub period: Duration,
}

impl MonitorContext {
    /// Same collaborators, different identity
    pub fn for_monitor(&self, name: &str, mode: MonitorMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            ..self.clone()
        }
    }
}

impl fmt::Debug for MonitorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorContext")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("node_id", &self.node_id)
            .field("orchestrator", &self.engine.orchestrator())
            .field("period", &self.period)
            .finish()
    }
}

/// Message carried by a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Refreshes `monitor` on the blocking pool, giving up after `limit`.
///
/// A monitor still locked by an earlier refresh is reported [`MonitorError::Busy`]
/// without waiting. On timeout the refresh keeps running detached and keeps
/// the lock until it returns.
pub(crate) async fn refresh_blocking(monitor: SharedMonitor, limit: Duration) -> Result<(), MonitorError> {
    let job = tokio::task::spawn_blocking(move || match monitor.try_lock() {
        Some(mut guard) => guard.refresh(),
        None => Err(MonitorError::Busy),
    });

    match tokio::time::timeout(limit, job).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => Err(MonitorError::Panicked(panic_message(e.into_panic().as_ref()))),
        Ok(Err(e)) => Err(MonitorError::Panicked(e.to_string())),
        Err(_) => Err(MonitorError::TimedOut(limit)),
    }
}

/// Runs `f`, turning a panic into [`MonitorError::Panicked`]
pub(crate) fn contain<F>(f: F) -> Result<(), MonitorError>
where
    F: FnOnce() -> Result<(), MonitorError>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(MonitorError::Panicked(panic_message(payload.as_ref()))),
    }
}
