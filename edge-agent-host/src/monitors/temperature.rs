//! Temperature sensor readings

use edge_telemetry::{Monitor, MonitorContext, MonitorError, MonitorMode, MonitorState, Snapshot};
use serde::Serialize;
use std::time::Duration;
use sysinfo::Components;

/// One entry of the `temperatures` field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSensor {
    pub thermal_zone: String,
    pub value: f32,
    pub critical: Option<f32>,
}

pub struct TemperatureMonitor {
    name: String,
    mode: MonitorMode,
    state: MonitorState,
    components: Components,
    sensors: Option<Vec<TemperatureSensor>>,
}

impl TemperatureMonitor {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            name: ctx.name,
            mode: ctx.mode,
            state: MonitorState::new(),
            components: Components::new_with_refreshed_list(),
            sensors: None,
        }
    }
}

impl Monitor for TemperatureMonitor {
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
            self.components.refresh();
            let sensors = self
                .components
                .iter()
                .filter(|c| c.temperature().is_finite())
                .map(|c| TemperatureSensor {
                    thermal_zone: c.label().to_string(),
                    value: c.temperature(),
                    critical: c.critical(),
                })
                .collect();
            self.sensors = Some(sensors);
            Ok(())
        })
    }

    fn contribute(&mut self, buffer: &mut Snapshot) -> Result<(), MonitorError> {
        // hosts without sensors leave the field undefined
        if let Some(sensors) = self.sensors.as_ref().filter(|s| !s.is_empty()) {
            buffer.set_serialized("temperatures", sensors)?;
        }
        self.state.consume();
        Ok(())
    }

    fn last_process_duration(&self) -> Option<Duration> {
        self.state.last_process_duration()
    }
}
