//! Background pool diagnostics.
//!
//! Off the request path: a timer task samples the pool, logs the counters,
//! warns on suspiciously many checked-out connections (a likely leak) and
//! evicts stale idle connections. Stopped via [`MonitorHandle::shutdown`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::pool::{ConnectionPool, ManageConnection};
use crate::config::MonitorConfig;

/// Handle to a running pool monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    samples: Arc<AtomicU64>,
}

impl MonitorHandle {
    /// Samples taken so far.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Stop the monitor and wait for its task to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "pool monitor task failed");
        }
    }
}

/// Start sampling `pool` every `config.interval()`.
pub fn spawn_monitor<M: ManageConnection>(
    pool: ConnectionPool<M>,
    config: &MonitorConfig,
) -> MonitorHandle {
    let (stop, mut stopped) = watch::channel(false);
    let samples = Arc::new(AtomicU64::new(0));
    let interval = config.interval();
    let threshold = config.warn_threshold(pool.config().max_size);

    let counter = Arc::clone(&samples);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(?interval, "pool monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = pool.state();
                    info!(
                        active = state.active,
                        idle = state.idle,
                        waiting = state.waiting,
                        max_size = state.max_size,
                        "pool status"
                    );
                    if state.active > threshold {
                        warn!(active = state.active, threshold, "high number of active connections");
                    }
                    pool.evict_idle().await;
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        info!("pool monitor stopped");
    });

    MonitorHandle {
        stop,
        task,
        samples,
    }
}
