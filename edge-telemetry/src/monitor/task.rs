//! Supervised background execution for background-mode monitors

use super::SharedMonitor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// How a retired task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    /// Left its loop after the stop signal
    Stopped,
    /// Had already ended on its own (returned or panicked)
    AlreadyDead,
    /// Ignored the stop signal for the whole grace period
    Aborted,
}

/// Handle on a monitor's refresh loop
#[derive(Debug)]
pub struct BackgroundTask {
    instance_id: Uuid,
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
    heartbeat: Arc<Mutex<Instant>>,
    period: Duration,
}

impl BackgroundTask {
    /// Spawns the refresh loop on the current tokio runtime.
    ///
    /// The loop refreshes once immediately, then every `period()` of the
    /// monitor, and records a heartbeat after every iteration. Each refresh
    /// runs on the blocking pool so a slow collector never stalls a runtime
    /// worker. A panicking refresh ends the loop. Dropping the returned
    /// handle stops the loop at its next wake-up.
    pub fn spawn(monitor: SharedMonitor) -> Self {
        let (name, period) = {
            let guard = monitor.lock();
            (guard.name().to_string(), guard.period())
        };

        let instance_id = Uuid::new_v4();
        let (stop, mut stop_rx) = watch::channel(false);
        let heartbeat = Arc::new(Mutex::new(Instant::now()));
        let beat = heartbeat.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        debug!("Background task {} ({}) stopping", name, instance_id);
                        break;
                    }
                    _ = ticker.tick() => {
                        let shared = monitor.clone();
                        match tokio::task::spawn_blocking(move || shared.lock().refresh()).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!("Monitor {} failed to refresh: {}", name, e),
                            Err(e) => {
                                error!("Monitor {} refresh crashed, ending task {}: {}", name, instance_id, e);
                                break;
                            }
                        }
                        *beat.lock() = Instant::now();
                    }
                }
            }
        });

        Self {
            instance_id,
            handle,
            stop,
            heartbeat,
            period,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// The loop returned or panicked
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn last_heartbeat(&self) -> Instant {
        *self.heartbeat.lock()
    }

    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat().elapsed()
    }

    /// Signals the loop to stop and waits for it, aborting after `grace`.
    ///
    /// Returns within about twice `grace`. A refresh still running on the
    /// blocking pool is left detached.
    pub async fn retire(mut self, grace: Duration) -> Retirement {
        if self.handle.is_finished() {
            let _ = (&mut self.handle).await;
            return Retirement::AlreadyDead;
        }

        let _ = self.stop.send(true);

        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => Retirement::Stopped,
            Ok(Err(e)) => {
                debug!("Background task {} ended with {}", self.instance_id, e);
                Retirement::AlreadyDead
            }
            Err(_) => {
                warn!(
                    "Background task {} did not stop within {:?}, aborting",
                    self.instance_id, grace
                );
                self.handle.abort();
                if tokio::time::timeout(grace, &mut self.handle).await.is_err() {
                    warn!("Background task {} still running after abort, detaching", self.instance_id);
                }
                Retirement::Aborted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{share, Monitor, MonitorError, MonitorMode, MonitorState};
    use crate::snapshot::Snapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ticker {
        state: MonitorState,
        refreshes: Arc<AtomicUsize>,
        panic_on_refresh: bool,
        delay: Duration,
    }

    impl Monitor for Ticker {
        fn name(&self) -> &str {
            "ticker"
        }

        fn mode(&self) -> MonitorMode {
            MonitorMode::Background
        }

        fn is_updated(&self) -> bool {
            self.state.is_updated()
        }

        fn refresh(&mut self) -> Result<(), MonitorError> {
            if self.panic_on_refresh {
                panic!("collector crashed");
            }
            std::thread::sleep(self.delay);
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.state.track(|| Ok(()))
        }

        fn contribute(&mut self, _buffer: &mut Snapshot) -> Result<(), MonitorError> {
            self.state.consume();
            Ok(())
        }

        fn period(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    fn ticker(panic_on_refresh: bool) -> (SharedMonitor, Arc<AtomicUsize>) {
        slow_ticker(panic_on_refresh, Duration::ZERO)
    }

    fn slow_ticker(panic_on_refresh: bool, delay: Duration) -> (SharedMonitor, Arc<AtomicUsize>) {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let monitor = share(Box::new(Ticker {
            state: MonitorState::new(),
            refreshes: refreshes.clone(),
            panic_on_refresh,
            delay,
        }));
        (monitor, refreshes)
    }

    #[tokio::test]
    async fn test_task_refreshes_and_stops() {
        let (monitor, refreshes) = ticker(false);
        let task = BackgroundTask::spawn(monitor.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(refreshes.load(Ordering::SeqCst) >= 1);
        assert!(monitor.lock().is_updated());
        assert!(!task.is_finished());

        assert_eq!(task.retire(Duration::from_secs(1)).await, Retirement::Stopped);

        let after = refreshes.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(refreshes.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn test_panicking_task_is_finished() {
        let (monitor, _) = ticker(true);
        let task = BackgroundTask::spawn(monitor);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(task.is_finished());
        assert_eq!(task.retire(Duration::from_secs(1)).await, Retirement::AlreadyDead);
    }

    #[tokio::test]
    async fn test_retire_is_bounded_by_grace_during_slow_refresh() {
        let (monitor, _) = slow_ticker(false, Duration::from_secs(2));
        let task = BackgroundTask::spawn(monitor.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Readers are not held up by the refresh in progress
        assert!(monitor.try_lock().is_none());

        let started = Instant::now();
        assert_eq!(task.retire(Duration::from_millis(200)).await, Retirement::Aborted);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
