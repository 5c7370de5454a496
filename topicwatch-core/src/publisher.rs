//! Pull and push access to registry snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use topicwatch_types::Snapshot;
use tracing::{debug, warn};

use crate::output::Output;
use crate::registry::Registry;
use crate::shutdown::ShutdownSignal;

/// Publishes registry snapshots to subscribers and outputs.
///
/// Subscribers get a latest-value-wins receiver: a consumer that falls behind
/// only ever sees the newest snapshot, and never slows down ingest.
/// Registry changes are coalesced so that at most one snapshot is published
/// per `min_interval`; a heartbeat publication every `heartbeat` lets
/// consumers see time advance even when nothing changes.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    registry: Arc<Registry>,
    latest: Arc<watch::Sender<Arc<Snapshot>>>,
    outputs: Arc<Vec<Output>>,
    min_interval: Duration,
    heartbeat: Duration,
}

impl SnapshotPublisher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Arc<Registry>) -> SnapshotPublisherBuilder {
        SnapshotPublisherBuilder::new(registry)
    }

    /// Take a fresh snapshot without publishing it.
    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.latest.borrow().clone()
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.latest.subscribe()
    }

    /// Take a snapshot and publish it to subscribers and all outputs.
    pub async fn publish_now(&self) -> Arc<Snapshot> {
        let snapshot = Arc::new(self.registry.snapshot());
        self.latest.send_replace(snapshot.clone());

        for output in self.outputs.iter() {
            if let Err(e) = output.emit(&snapshot).await {
                warn!(output = %output.describe(), error = %e, "failed to emit snapshot");
            }
        }
        snapshot
    }

    /// Publish on registry changes and on every heartbeat until shutdown.
    pub fn start(&self, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        let publisher = self.clone();

        tokio::spawn(async move {
            let mut changes = publisher.registry.changes();
            let mut heartbeat = tokio::time::interval(publisher.heartbeat);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_publish = Instant::now();

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }

                        // Fold in everything that changes until the window reopens
                        let wait = publisher.min_interval.saturating_sub(last_publish.elapsed());
                        if !wait.is_zero() {
                            tokio::select! {
                                _ = tokio::time::sleep(wait) => {}
                                _ = shutdown.wait() => break,
                            }
                        }
                        changes.borrow_and_update();

                        publisher.publish_now().await;
                        last_publish = Instant::now();
                        heartbeat.reset();
                    }
                    _ = heartbeat.tick() => {
                        publisher.publish_now().await;
                        last_publish = Instant::now();
                    }
                    _ = shutdown.wait() => break,
                }
            }
            debug!("snapshot publisher stopped");
        })
    }
}

/// Builder for configuring a [`SnapshotPublisher`].
#[derive(Debug)]
pub struct SnapshotPublisherBuilder {
    registry: Arc<Registry>,
    outputs: Vec<Output>,
    min_interval: Duration,
    heartbeat: Duration,
}

impl SnapshotPublisherBuilder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            outputs: Vec::new(),
            min_interval: Duration::from_millis(100),
            heartbeat: Duration::from_secs(1),
        }
    }

    /// Add an output destination.
    ///
    /// Multiple outputs can be added; snapshots will be emitted to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn outputs(mut self, outputs: impl IntoIterator<Item = Output>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    /// Minimum spacing between change-triggered publications.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }

    pub fn build(self) -> SnapshotPublisher {
        let initial = Arc::new(self.registry.snapshot());
        let (latest, _) = watch::channel(initial);
        SnapshotPublisher {
            registry: self.registry,
            latest: Arc::new(latest),
            outputs: Arc::new(self.outputs),
            min_interval: self.min_interval,
            heartbeat: self.heartbeat,
        }
    }
}
