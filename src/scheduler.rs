//! Background passes
//!
//! Runs the eviction pass on a fixed interval and, when configured, a
//! periodic sync of the sync root. Both loops stop on the shared shutdown
//! signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, BridgeError};

/// How long `stop` waits for a running pass to finish
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Scheduler {
    bridge: Arc<Bridge>,
    evict_interval: Duration,
    sync_interval: Option<Duration>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(
        bridge: Arc<Bridge>,
        evict_interval: Duration,
        sync_interval: Option<Duration>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            bridge,
            evict_interval,
            sync_interval,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the background loops; calling it twice is a no-op
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Scheduler already started");
            return;
        }

        let bridge = Arc::clone(&self.bridge);
        let shutdown = self.shutdown_tx.subscribe();
        // Eviction waits one full interval before its first pass
        tasks.push((
            "eviction",
            tokio::spawn(run_loop(self.evict_interval, true, shutdown, move || {
                let bridge = Arc::clone(&bridge);
                async move { evict_tick(&bridge).await }
            })),
        ));

        if let Some(interval) = self.sync_interval {
            let bridge = Arc::clone(&self.bridge);
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push((
                "sync",
                tokio::spawn(run_loop(interval, false, shutdown, move || {
                    let bridge = Arc::clone(&bridge);
                    async move { sync_tick(&bridge).await }
                })),
            ));
        }

        info!(
            evict_every_secs = self.evict_interval.as_secs(),
            sync_every_secs = self.sync_interval.map(|d| d.as_secs()),
            "Scheduler started"
        );
    }

    /// Signal the loops and wait for them to exit
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();

        for (name, task) in tasks {
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(())) => debug!(task = name, "Background task stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Background task panicked"),
                Err(_) => warn!(task = name, "Background task did not stop in time"),
            }
        }
        info!("Scheduler stopped");
    }

    pub async fn is_started(&self) -> bool {
        !self.tasks.lock().await.is_empty()
    }
}

async fn run_loop<F, Fut>(
    period: Duration,
    skip_first: bool,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    if skip_first {
        ticker.tick().await;
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn evict_tick(bridge: &Bridge) {
    match bridge.run_eviction_pass().await {
        Ok(report) if report.evicted > 0 || report.errors > 0 => {
            info!(evicted = report.evicted, errors = report.errors, "Scheduled eviction done");
        }
        Ok(_) => {}
        Err(BridgeError::PassInProgress(_)) => debug!("Eviction pass still running, skipping tick"),
        Err(e) => warn!(error = %e, "Scheduled eviction failed"),
    }
}

async fn sync_tick(bridge: &Bridge) {
    match bridge.run_sync_pass().await {
        Ok(report) => debug!(synced = report.synced, errors = report.errors, "Scheduled sync done"),
        Err(BridgeError::PassInProgress(_)) => debug!("Sync pass still running, skipping tick"),
        Err(e) => warn!(error = %e, "Scheduled sync failed"),
    }
}
