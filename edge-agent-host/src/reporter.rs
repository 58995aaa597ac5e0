//! Consumer side of the report queue
//!
//! The first report is delivered in full, later ones only carry the fields
//! that changed or appeared since the last delivery.

use edge_telemetry::Snapshot;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct Reporter {
    last_sent: Option<Snapshot>,
    delivered: u64,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Payload to deliver for `report`, remembering it as the last one sent
    pub fn payload(&mut self, report: Snapshot) -> Snapshot {
        let payload = match &self.last_sent {
            Some(previous) => report.delta(previous),
            None => report.clone(),
        };
        self.last_sent = Some(report);
        self.delivered += 1;
        payload
    }

    /// Consumes the queue until every sender is gone
    pub async fn run(mut self, mut channel: mpsc::Receiver<Snapshot>) {
        info!("Reporter started");
        while let Some(report) = channel.recv().await {
            let full = self.last_sent.is_none();
            let payload = self.payload(report);

            match serde_json::to_string(&payload.to_json()) {
                Ok(body) => info!(
                    "Telemetry report #{} ({} fields{}): {}",
                    self.delivered,
                    payload.len(),
                    if full { ", full" } else { "" },
                    body
                ),
                Err(e) => warn!("Cannot serialize telemetry report: {}", e),
            }
        }
        debug!("Report queue closed after {} reports", self.delivered);
    }
}
