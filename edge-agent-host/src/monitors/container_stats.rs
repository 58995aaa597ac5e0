//! Per-container resource usage, read through the engine client

use edge_telemetry::{
    ContainerStats, EngineClient, Monitor, MonitorContext, MonitorError, MonitorMode, MonitorState, Snapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ContainerStatsMonitor {
    name: String,
    mode: MonitorMode,
    engine: Arc<dyn EngineClient>,
    state: MonitorState,
    stats: Option<Vec<ContainerStats>>,
}

impl ContainerStatsMonitor {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            name: ctx.name,
            mode: ctx.mode,
            engine: ctx.engine,
            state: MonitorState::new(),
            stats: None,
        }
    }
}

impl Monitor for ContainerStatsMonitor {
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
            let stats = self.engine.container_stats()?;
            debug!("{} containers reported by {}", stats.len(), self.engine.orchestrator());
            self.stats = Some(stats);
            Ok(())
        })
    }

    fn contribute(&mut self, buffer: &mut Snapshot) -> Result<(), MonitorError> {
        if let Some(stats) = &self.stats {
            buffer.set_serialized("container_stats", stats)?;
        }
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
    use crate::monitors::testing::context;

    #[test]
    fn test_contribute_after_refresh() {
        let mut monitor = ContainerStatsMonitor::new(context("container_stats", MonitorMode::OnDemand, false));
        monitor.refresh().unwrap();

        let mut buffer = Snapshot::new();
        monitor.contribute(&mut buffer).unwrap();
        let stats = buffer.get("container_stats").unwrap().as_array().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0]["name"], "web");
    }

    #[test]
    fn test_engine_error_propagates() {
        let mut monitor = ContainerStatsMonitor::new(context("container_stats", MonitorMode::OnDemand, true));
        let err = monitor.refresh().unwrap_err();
        assert!(matches!(err, MonitorError::Engine(_)));
        assert!(!monitor.is_updated());
    }
}
