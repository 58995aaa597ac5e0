/*!
Capture des logs pour les assertions des tests

Couche `tracing_subscriber` qui garde le message de chaque événement WARN,
installée comme subscriber par défaut du thread courant.
*/

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Messages of the WARN events seen while installed
#[derive(Debug, Clone, Default)]
pub struct WarningCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarningCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes this thread's events through the capture until the guard drops.
    /// Tokio tests must run on the current-thread runtime for every event to be seen.
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Number of captured warnings containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.messages.lock().iter().filter(|m| m.contains(needle)).count()
    }
}

impl<S: Subscriber> Layer<S> for WarningCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.messages.lock().push(visitor.message);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn test_captures_warnings_only() {
        let capture = WarningCapture::new();
        {
            let _guard = capture.install();
            info!("queue drained");
            warn!("queue is full, {} dropped", 1);
            warn!("sensor offline");
        }
        warn!("after the guard");

        assert_eq!(capture.messages(), vec!["queue is full, 1 dropped", "sensor offline"]);
        assert_eq!(capture.count("queue is full"), 1);
    }
}
