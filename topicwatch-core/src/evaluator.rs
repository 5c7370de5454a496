//! Periodic staleness sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::registry::Registry;
use crate::shutdown::ShutdownSignal;

/// Marks live topics stale once they fall silent.
///
/// The evaluator only ever moves `Live` to `Stale`. Ingest moves topics
/// back to `Live`, and `Unknown` topics are left alone.
#[derive(Debug, Clone)]
pub struct StalenessEvaluator {
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    threshold: Duration,
    interval: Duration,
}

impl StalenessEvaluator {
    /// Create an evaluator that reads "now" from the registry's clock.
    pub fn new(registry: Arc<Registry>, threshold: Duration, interval: Duration) -> Self {
        let clock = registry.clock().clone();
        Self {
            registry,
            clock,
            threshold,
            interval,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Run one sweep and return the topics that became stale.
    pub fn sweep(&self) -> Vec<String> {
        let now_ms = self.clock.now_ms();
        let threshold_ms = self.threshold.as_millis() as u64;
        let stale = self.registry.mark_stale(now_ms, threshold_ms);

        for topic in &stale {
            info!(topic = %topic, threshold_ms, "topic went stale");
        }
        stale
    }

    /// Sweep every `interval` until shutdown.
    ///
    /// The first sweep runs immediately.
    pub fn start(self, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                    _ = shutdown.wait() => {
                        debug!("staleness evaluator stopped");
                        break;
                    }
                }
            }
        })
    }
}
