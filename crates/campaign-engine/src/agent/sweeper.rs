//! Background staleness sweep
//!
//! Lazy on-read demotion alone leaves a crashed agent ACTIVE until someone
//! reads it. The sweeper re-evaluates every ACTIVE agent on a fixed
//! interval so demotion does not depend on read traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::LivenessTracker;

pub struct LivenessSweeper {
    tracker: Arc<LivenessTracker>,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl LivenessSweeper {
    pub fn new(tracker: Arc<LivenessTracker>, period: Duration) -> Self {
        Self {
            tracker,
            period,
            handle: None,
        }
    }

    /// Spawn the sweep task; a second call while running is a no-op
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let tracker = self.tracker.clone();
        let period = self.period;
        info!(
            "👀 Starting liveness sweep every {:?} (threshold {:?})",
            period,
            tracker.stale_threshold()
        );

        self.handle = Some(tokio::spawn(async move {
            Self::sweep_loop(tracker, period).await;
        }));
    }

    /// Stop the sweep task
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
            info!("Liveness sweep stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn sweep_loop(tracker: Arc<LivenessTracker>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match tracker.sweep().await {
                Ok(report) if report.demoted > 0 => {
                    info!("📊 Liveness sweep - Evaluated: {}, Demoted: {}", report.evaluated, report.demoted);
                }
                Ok(report) => debug!("Liveness sweep evaluated {} active agents", report.evaluated),
                Err(e) => error!("Liveness sweep failed: {}", e),
            }
        }
    }
}

impl Drop for LivenessSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
