//! The main Monitor type wiring registry, evaluator and publisher together.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use topicwatch_types::Snapshot;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, MonitorConfig};
use crate::evaluator::StalenessEvaluator;
use crate::output::Output;
use crate::publisher::SnapshotPublisher;
use crate::registry::{EventSink, Registry};
use crate::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};

/// The entry point for monitoring a set of topics.
///
/// A Monitor owns the topic registry, and once started runs the staleness
/// evaluator and the snapshot publisher in the background. Transports push
/// into it through [`Monitor::sink`].
///
/// # Example
///
/// ```rust,no_run
/// use topicwatch_core::{Monitor, Output};
/// use topicwatch_types::{Payload, TopicEvent};
///
/// #[tokio::main]
/// async fn main() {
///     let monitor = Monitor::builder()
///         .output(Output::file("topics.json"))
///         .build()
///         .unwrap();
///
///     monitor.announce("imu");
///     let handle = monitor.start();
///
///     monitor
///         .sink()
///         .ingest(TopicEvent::now("gps", Payload::text("{\"lat\":1.0}")));
///
///     let mut updates = monitor.subscribe();
///     updates.changed().await.unwrap();
///     println!("{} topics", updates.borrow().len());
///
///     handle.shutdown().await;
/// }
/// ```
#[derive(Debug)]
pub struct Monitor {
    registry: Arc<Registry>,
    publisher: SnapshotPublisher,
    config: MonitorConfig,
}

impl Monitor {
    /// Create a monitor with default timings, the wall clock, and no outputs.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            publisher: SnapshotPublisher::new(registry.clone()),
            registry,
            config: MonitorConfig::default(),
        }
    }

    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The ingest callback to hand to transports.
    pub fn sink(&self) -> Arc<dyn EventSink> {
        self.registry.clone()
    }

    /// Pre-register an expected topic.
    pub fn announce(&self, name: &str) -> bool {
        self.registry.announce(name)
    }

    /// Remove a topic from the registry and from future snapshots.
    pub fn remove(&self, name: &str) -> bool {
        self.registry.remove(name)
    }

    /// Take a fresh snapshot of every topic.
    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.publisher.latest()
    }

    /// Subscribe to published snapshots (latest value wins).
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.publisher.subscribe()
    }

    /// Publish a snapshot to subscribers and outputs immediately.
    pub async fn publish_now(&self) -> Arc<Snapshot> {
        self.publisher.publish_now().await
    }

    /// Start the staleness evaluator and the snapshot publisher.
    ///
    /// Returns a handle that stops both. Additional tasks, such as link
    /// supervisors, can be attached to it so one shutdown stops everything.
    pub fn start(&self) -> MonitorHandle {
        let (trigger, signal) = shutdown_channel();

        let evaluator = StalenessEvaluator::new(
            self.registry.clone(),
            self.config.staleness_threshold,
            self.config.sweep_interval,
        );

        let tasks = vec![
            evaluator.start(signal.clone()),
            self.publisher.start(signal.clone()),
        ];

        info!(
            threshold_ms = self.config.staleness_threshold.as_millis() as u64,
            sweep_ms = self.config.sweep_interval.as_millis() as u64,
            "monitor started"
        );

        MonitorHandle {
            trigger,
            signal,
            tasks,
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring a Monitor.
#[derive(Debug, Default)]
pub struct MonitorBuilder {
    config: MonitorConfig,
    outputs: Vec<Output>,
    clock: Option<Arc<dyn Clock>>,
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an output destination.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Clock used to stamp snapshots and to judge staleness.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Monitor, ConfigError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let registry = Arc::new(Registry::with_clock(clock));
        let publisher = SnapshotPublisher::builder(registry.clone())
            .outputs(self.outputs)
            .min_interval(self.config.publish_min_interval)
            .heartbeat(self.config.publish_heartbeat)
            .build();

        Ok(Monitor {
            registry,
            publisher,
            config: self.config,
        })
    }
}

/// Handle for stopping a started Monitor.
///
/// Dropping the handle without calling [`MonitorHandle::shutdown`] also stops
/// the background tasks, without waiting for them.
#[derive(Debug)]
pub struct MonitorHandle {
    trigger: ShutdownTrigger,
    signal: ShutdownSignal,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// A signal for tasks that should stop together with the monitor.
    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Have [`MonitorHandle::shutdown`] wait for `task` as well.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Signal every task to stop and wait for them to finish.
    pub async fn shutdown(self) {
        self.trigger.trigger();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("monitor stopped");
    }
}
