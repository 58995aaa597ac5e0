//! CPU, memory and disk usage
//!
//! Keeps its sysinfo handles between refreshes so CPU usage is computed
//! over the monitor period instead of a short sleep.

use edge_telemetry::{Monitor, MonitorContext, MonitorError, MonitorMode, MonitorState, Snapshot};
use serde::Serialize;
use std::time::Duration;
use sysinfo::{Disks, System};
use tracing::debug;

const MB: u64 = 1024 * 1024;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Value of the `resources` field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMetrics {
    pub cpu: CpuMetrics,
    pub ram: MemoryMetrics,
    pub disks: Vec<DiskMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuMetrics {
    pub capacity: usize,
    pub percent: f32,
    pub load_avg: [f64; 3], // [1min, 5min, 15min]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryMetrics {
    pub capacity_mb: u64,
    pub used_mb: u64,
    pub percent_used: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskMetrics {
    pub device: String,
    pub mount_point: String,
    pub capacity_gb: f64,
    pub used_gb: f64,
}

pub struct ResourcesMonitor {
    name: String,
    mode: MonitorMode,
    period: Duration,
    state: MonitorState,
    sys: System,
    disks: Disks,
    metrics: Option<ResourceMetrics>,
}

impl ResourcesMonitor {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            name: ctx.name,
            mode: ctx.mode,
            period: ctx.period,
            state: MonitorState::new(),
            sys: System::new(),
            disks: Disks::new_with_refreshed_list(),
            metrics: None,
        }
    }

    pub fn metrics(&self) -> Option<&ResourceMetrics> {
        self.metrics.as_ref()
    }
}

impl CpuMetrics {
    fn collect(sys: &System) -> Self {
        let load_avg = if cfg!(unix) {
            let load = System::load_average();
            [load.one, load.five, load.fifteen]
        } else {
            [0.0, 0.0, 0.0]
        };

        CpuMetrics {
            capacity: sys.cpus().len(),
            percent: sys.global_cpu_info().cpu_usage(),
            load_avg,
        }
    }
}

impl MemoryMetrics {
    fn collect(sys: &System) -> Self {
        let total = sys.total_memory();
        let used = total.saturating_sub(sys.available_memory());

        let percent_used = if total > 0 {
            (used as f32 / total as f32) * 100.0
        } else {
            0.0
        };

        MemoryMetrics {
            capacity_mb: total / MB,
            used_mb: used / MB,
            percent_used,
        }
    }
}

impl DiskMetrics {
    fn collect(disks: &Disks) -> Vec<Self> {
        disks
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let used = total.saturating_sub(disk.available_space());
                DiskMetrics {
                    device: disk.name().to_string_lossy().to_string(),
                    mount_point: disk.mount_point().display().to_string(),
                    capacity_gb: total as f64 / GB,
                    used_gb: used as f64 / GB,
                }
            })
            .collect()
    }
}

impl Monitor for ResourcesMonitor {
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
            self.sys.refresh_cpu_usage();
            self.sys.refresh_memory();
            self.disks.refresh();

            let metrics = ResourceMetrics {
                cpu: CpuMetrics::collect(&self.sys),
                ram: MemoryMetrics::collect(&self.sys),
                disks: DiskMetrics::collect(&self.disks),
            };
            debug!(
                "Resources: cpu {:.1}%, ram {}/{} MB, {} disks",
                metrics.cpu.percent,
                metrics.ram.used_mb,
                metrics.ram.capacity_mb,
                metrics.disks.len()
            );

            self.metrics = Some(metrics);
            Ok(())
        })
    }

    fn contribute(&mut self, buffer: &mut Snapshot) -> Result<(), MonitorError> {
        if let Some(metrics) = &self.metrics {
            buffer.set_serialized("resources", metrics)?;
        }
        self.state.consume();
        Ok(())
    }

    fn period(&self) -> Duration {
        self.period
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
    fn test_refresh_collects() {
        let mut monitor = ResourcesMonitor::new(context("resources", MonitorMode::Background, false));
        assert!(monitor.metrics().is_none());

        monitor.refresh().unwrap();
        let metrics = monitor.metrics().unwrap();
        assert!(metrics.cpu.capacity > 0);
        assert!(metrics.ram.capacity_mb > 0);
        assert!(metrics.ram.used_mb <= metrics.ram.capacity_mb);
    }

    #[test]
    fn test_contribute_sets_resources() {
        let mut monitor = ResourcesMonitor::new(context("resources", MonitorMode::Background, false));
        monitor.refresh().unwrap();

        let mut buffer = Snapshot::new();
        monitor.contribute(&mut buffer).unwrap();
        let resources = buffer.get("resources").unwrap();
        assert!(resources.get("cpu").is_some());
        assert!(resources.get("ram").is_some());
        assert!(!monitor.is_updated());
    }

    #[test]
    fn test_period_from_context() {
        let monitor = ResourcesMonitor::new(context("resources", MonitorMode::Background, false));
        assert_eq!(monitor.period(), Duration::from_secs(15));
    }
}
