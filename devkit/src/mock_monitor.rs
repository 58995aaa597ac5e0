/*!
Monitor simulé pour tests d'orchestration

Chaque instance partage ses compteurs avec le test, y compris les
instances recréées par la supervision.
*/

use edge_telemetry::{Monitor, MonitorContext, MonitorError, MonitorMode, MonitorState, MonitorTable, Snapshot};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Calls observed across every instance of one monitor kind
#[derive(Debug, Default)]
pub struct MonitorCounters {
    refreshes: AtomicUsize,
    contributions: AtomicUsize,
    constructions: AtomicUsize,
}

impl MonitorCounters {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn contributions(&self) -> usize {
        self.contributions.load(Ordering::SeqCst)
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

/// What a mock monitor does when called
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub fields: Vec<(String, Value)>,
    pub updated: bool,
    pub fail_refresh: bool,
    pub fail_contribute: bool,
    pub panic_on_refresh: bool,
    pub period: Option<Duration>,
    /// Blocks every refresh this long, holding the monitor lock
    pub slow_refresh: Option<Duration>,
}

impl MockBehavior {
    /// Up to date from construction, contributing `field = value`
    pub fn with_field(field: &str, value: Value) -> Self {
        Self {
            fields: vec![(field.to_string(), value)],
            updated: true,
            ..Self::default()
        }
    }

    pub fn field(mut self, field: &str, value: Value) -> Self {
        self.fields.push((field.to_string(), value));
        self
    }

    pub fn stale(mut self) -> Self {
        self.updated = false;
        self
    }

    pub fn failing_contribute(mut self) -> Self {
        self.fail_contribute = true;
        self
    }

    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_refresh = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.slow_refresh = Some(delay);
        self
    }

    pub fn every(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }
}

pub struct MockMonitor {
    name: String,
    mode: MonitorMode,
    state: MonitorState,
    behavior: MockBehavior,
    counters: Arc<MonitorCounters>,
}

impl MockMonitor {
    pub fn new(ctx: MonitorContext, behavior: MockBehavior, counters: Arc<MonitorCounters>) -> Self {
        counters.constructions.fetch_add(1, Ordering::SeqCst);

        let mut state = MonitorState::new();
        if behavior.updated {
            let _ = state.track(|| Ok(()));
        }

        Self {
            name: ctx.name,
            mode: ctx.mode,
            state,
            behavior,
            counters,
        }
    }

    /// Registers `kind` so every construction shares the returned counters
    pub fn register(table: &mut MonitorTable, kind: &str, mode: MonitorMode, behavior: MockBehavior) -> Arc<MonitorCounters> {
        let counters = Arc::new(MonitorCounters::default());
        let shared = counters.clone();
        table.register(kind, mode, move |ctx| {
            Box::new(MockMonitor::new(ctx, behavior.clone(), shared.clone())) as Box<dyn Monitor>
        });
        counters
    }
}

impl Monitor for MockMonitor {
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
        self.counters.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.behavior.panic_on_refresh {
            panic!("mock monitor {} crashed", self.name);
        }
        if let Some(delay) = self.behavior.slow_refresh {
            std::thread::sleep(delay);
        }

        let fail = self.behavior.fail_refresh;
        self.state.track(|| {
            if fail {
                Err(MonitorError::Collection("mock refresh failure".into()))
            } else {
                Ok(())
            }
        })
    }

    fn contribute(&mut self, buffer: &mut Snapshot) -> Result<(), MonitorError> {
        self.counters.contributions.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_contribute {
            return Err(MonitorError::Collection(format!("{} has no data", self.name)));
        }

        for (field, value) in &self.behavior.fields {
            buffer.set(field, value.clone())?;
        }
        self.state.consume();
        Ok(())
    }

    fn period(&self) -> Duration {
        self.behavior.period.unwrap_or(edge_telemetry::monitor::DEFAULT_PERIOD)
    }

    fn last_process_duration(&self) -> Option<Duration> {
        self.state.last_process_duration()
    }
}
