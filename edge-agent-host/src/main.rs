//! Edge Agent Host - runs the telemetry loop on an edge node
//!
//! - Loads configuration (TOML file, `.env`, environment overrides)
//! - Registers the built-in host monitors
//! - Runs one telemetry cycle per interval until Ctrl-C
//! - Consumes the report and status queues in background tasks

mod engine;
mod monitors;
mod reporter;
mod status;

use anyhow::{Context, Result};
use edge_telemetry::{MonitorTable, StatusSender, Telemetry, TelemetryConfig, COMPONENT_NAME};
use engine::HostEngine;
use reporter::Reporter;
use status::StatusAggregator;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Main agent state
struct Agent {
    config: TelemetryConfig,
    session_id: Uuid,
    telemetry: Telemetry,
    status: StatusSender,
    consumers: Vec<JoinHandle<()>>,
}

impl Agent {
    /// Create new agent instance
    fn new(config: TelemetryConfig) -> Result<Self> {
        let session_id = Uuid::new_v4();
        let node_id = config
            .node_id
            .clone()
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().to_string());
        info!("Initializing Edge Agent Host v{} (node {}, session {})", env!("CARGO_PKG_VERSION"), node_id, session_id);

        let (report_tx, report_rx) = mpsc::channel(config.queues.report_capacity);
        let (status_tx, status_rx) = mpsc::channel(config.queues.status_capacity);

        let mut table = MonitorTable::new();
        monitors::register_builtin(&mut table);

        let telemetry = Telemetry::new(
            Arc::new(HostEngine::new()),
            report_tx,
            status_tx.clone(),
            &node_id,
            config.excluded(),
            Arc::new(table),
            &config.monitors,
        );

        let consumers = vec![
            tokio::spawn(Reporter::new().run(report_rx)),
            tokio::spawn(StatusAggregator::new(telemetry.edge_status().clone()).run(status_rx)),
        ];

        Ok(Agent {
            config,
            session_id,
            telemetry,
            status: StatusSender::new(status_tx),
            consumers,
        })
    }

    /// Runs telemetry cycles until Ctrl-C
    async fn run(&mut self) -> Result<()> {
        info!(
            "Starting telemetry loop every {:?} with {} monitors",
            self.config.cycle.interval(),
            self.telemetry.registry().len()
        );
        self.status.starting(COMPONENT_NAME, "telemetry loop starting");

        let mut cycle_timer = interval(self.config.cycle.interval());
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cycle_timer.tick() => {
                    self.telemetry.run().await;
                }

                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("Cannot listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn shutdown(mut self) {
        self.telemetry.shutdown().await;
        self.status.stopped(COMPONENT_NAME, "telemetry loop stopped");

        let stats = self.telemetry.stats().clone();
        info!(
            "Session {} ended: {} cycles, {} reports sent, {} dropped, {} respawns",
            self.session_id, stats.cycles, stats.reports_sent, stats.reports_dropped, stats.respawns
        );

        // Closing the queues lets the consumers drain and return
        drop(self.telemetry);
        drop(self.status);
        for consumer in self.consumers {
            if let Err(e) = consumer.await {
                warn!("Queue consumer ended abnormally: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Edge Agent Host starting...");

    let config = TelemetryConfig::load().context("Failed to load telemetry configuration")?;
    let mut agent = Agent::new(config).context("Failed to create agent")?;

    agent.run().await.context("Agent execution failed")?;
    agent.shutdown().await;

    Ok(())
}
