//! Connection supervision: reconnect with backoff, re-subscribe, report status.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use topicwatch_core::{EventSink, ShutdownSignal};
use topicwatch_types::{LinkState, TopicEvent};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{ConnectionError, TransportError};
use crate::pattern::TopicPattern;
use crate::transport::Transport;

/// Settings for one supervised link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Link name, used in snapshots and as the topic prefix.
    pub name: String,
    pub patterns: Vec<TopicPattern>,
    /// Publish topics as `<name>/<topic>`.
    pub prefix_topics: bool,
    pub connect_timeout: Duration,
    pub backoff: Backoff,
    /// Topics expected from this upstream before they deliver anything.
    pub announce: Vec<String>,
}

impl LinkConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: vec![TopicPattern::all()],
            prefix_topics: false,
            connect_timeout: Duration::from_secs(3),
            backoff: Backoff::default(),
            announce: Vec::new(),
        }
    }

    /// Name under which an upstream topic appears in the registry.
    pub fn topic_name(&self, topic: &str) -> String {
        if self.prefix_topics {
            format!("{}/{}", self.name, topic)
        } else {
            topic.to_string()
        }
    }
}

enum LinkEnd {
    Shutdown,
    Lost(ConnectionError),
}

/// Keeps one transport connected and pumps its events into a sink.
///
/// Walks `Disconnected -> Connecting -> Connected -> Disconnected`, reporting
/// every transition to the sink. After a disconnect it reconnects with
/// [`Backoff`] and re-sends every subscription; topic state in the registry
/// is never reset. Once `max_attempts` consecutive attempts fail the link is
/// left `Disconnected` with no retry scheduled.
pub struct LinkSupervisor {
    config: LinkConfig,
    transport: Box<dyn Transport>,
    sink: Arc<dyn EventSink>,
    state: LinkState,
}

impl LinkSupervisor {
    pub fn new(
        config: LinkConfig,
        transport: impl Transport + 'static,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_boxed(config, Box::new(transport), sink)
    }

    /// Like [`LinkSupervisor::new`], for a transport chosen at runtime.
    pub fn with_boxed(
        config: LinkConfig,
        transport: Box<dyn Transport>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            transport,
            sink,
            state: LinkState::idle(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Run the link on its own task until shutdown or give-up.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        for topic in &self.config.announce {
            self.sink.announce(&self.config.topic_name(topic));
        }
        self.set_state(LinkState::idle());

        let mut failures: u32 = 0;

        loop {
            if shutdown.is_triggered() {
                break;
            }

            self.set_state(LinkState::Connecting {
                attempt: failures + 1,
            });

            let attempt = tokio::time::timeout(
                self.config.connect_timeout,
                establish(self.transport.as_mut(), &self.config.patterns),
            );
            let result = tokio::select! {
                result = attempt => result.unwrap_or_else(|_| {
                    Err(ConnectionError::Timeout {
                        endpoint: self.transport.describe(),
                    })
                }),
                _ = shutdown.wait() => break,
            };

            match result {
                Ok(()) => {
                    failures = 0;
                    self.set_state(LinkState::Connected);
                    info!(
                        link = %self.config.name,
                        endpoint = %self.transport.describe(),
                        "link connected"
                    );

                    for topic in self.transport.known_topics() {
                        self.sink.announce(&self.config.topic_name(&topic));
                    }

                    match self.pump(&mut shutdown).await {
                        LinkEnd::Shutdown => {
                            self.transport.disconnect().await;
                            break;
                        }
                        LinkEnd::Lost(e) => {
                            warn!(link = %self.config.name, error = %e, "link lost");
                            self.transport.disconnect().await;
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        link = %self.config.name,
                        attempt = failures,
                        error = %e,
                        "connect failed"
                    );
                    self.transport.disconnect().await;
                }
            }

            if !self.config.backoff.should_retry(failures) {
                self.set_state(LinkState::Disconnected {
                    failures,
                    retry_in_ms: None,
                });
                warn!(
                    link = %self.config.name,
                    failures,
                    "giving up on link; topics from it will go stale"
                );
                break;
            }

            let delay = self.config.backoff.delay(failures.saturating_sub(1));
            self.set_state(LinkState::Disconnected {
                failures,
                retry_in_ms: Some(delay.as_millis() as u64),
            });
            debug!(link = %self.config.name, delay_ms = delay.as_millis() as u64, "reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait() => break,
            }
        }

        debug!(link = %self.config.name, "link supervisor stopped");
    }

    /// Receive until the link drops or shutdown is requested.
    async fn pump(&mut self, shutdown: &mut ShutdownSignal) -> LinkEnd {
        loop {
            tokio::select! {
                received = self.transport.recv() => match received {
                    Ok(event) => self.deliver(event),
                    Err(TransportError::Malformed(e)) => {
                        debug!(link = %self.config.name, error = %e, "dropped malformed event");
                        let topic = e.topic.as_deref().map(|t| self.config.topic_name(t));
                        self.sink.malformed(topic.as_deref());
                    }
                    Err(TransportError::Connection(e)) => return LinkEnd::Lost(e),
                },
                _ = shutdown.wait() => return LinkEnd::Shutdown,
            }
        }
    }

    fn deliver(&self, mut event: TopicEvent) {
        if self.config.prefix_topics {
            event.topic = self.config.topic_name(&event.topic);
        }
        self.sink.ingest(event);
    }

    fn set_state(&mut self, state: LinkState) {
        self.state = state;
        self.sink.link_state(&self.config.name, state);
    }
}

impl std::fmt::Debug for LinkSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSupervisor")
            .field("config", &self.config)
            .field("endpoint", &self.transport.describe())
            .field("state", &self.state)
            .finish()
    }
}

async fn establish(
    transport: &mut dyn Transport,
    patterns: &[TopicPattern],
) -> Result<(), ConnectionError> {
    transport.connect().await?;
    for pattern in patterns {
        transport.subscribe(pattern).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeControl, FakeTransport};
    use topicwatch_core::{
        shutdown_channel, Clock, MonotonicClock, Registry, ShutdownTrigger, StalenessEvaluator,
    };
    use topicwatch_types::{Health, Payload};

    fn config() -> LinkConfig {
        LinkConfig {
            backoff: Backoff::new(Duration::from_millis(100), Duration::from_secs(1)),
            ..LinkConfig::new("robot")
        }
    }

    fn start(config: LinkConfig) -> (Arc<Registry>, FakeControl, ShutdownTrigger, JoinHandle<()>) {
        let registry = Arc::new(Registry::new());
        let (transport, control) = FakeTransport::new("robot");
        let (trigger, signal) = shutdown_channel();
        let task = LinkSupervisor::new(config, transport, registry.clone()).spawn(signal);
        (registry, control, trigger, task)
    }

    async fn until(mut condition: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn connects_and_delivers() {
        let (registry, control, trigger, task) = start(config());
        until(|| control.is_connected()).await;
        assert_eq!(registry.link_state("robot"), Some(LinkState::Connected));

        control.send(TopicEvent::new("imu", Payload::text("x"), 5));
        until(|| registry.get("imu").is_some()).await;
        assert_eq!(registry.get("imu").unwrap().health, Health::Live);

        trigger.trigger();
        task.await.unwrap();
        assert_eq!(control.history().last().map(String::as_str), Some("disconnect"));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_and_resubscribes_after_drop() {
        let config = LinkConfig {
            patterns: vec!["imu/**".parse().unwrap(), "gps".parse().unwrap()],
            ..config()
        };
        let (registry, control, trigger, task) = start(config);
        until(|| control.is_connected()).await;

        control.send(TopicEvent::new("gps", Payload::text("a"), 1));
        until(|| registry.get("gps").is_some()).await;

        control.drop_link();
        until(|| control.connects() == 2 && control.is_connected()).await;

        assert_eq!(control.subscriptions(), ["imu/**", "gps", "imu/**", "gps"]);
        // Topic state survives the reconnect
        assert_eq!(registry.get("gps").unwrap().last_seen_ms, Some(1));

        control.send(TopicEvent::new("gps", Payload::text("b"), 2));
        until(|| registry.get("gps").unwrap().last_seen_ms == Some(2)).await;

        trigger.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let config = LinkConfig {
            backoff: Backoff::new(Duration::from_millis(100), Duration::from_secs(1))
                .with_max_attempts(3),
            ..config()
        };
        let (registry, control, _trigger, task) = start(config);
        control.set_unreachable(true);

        // Gave up: the task ends on its own
        task.await.unwrap();

        let state = registry.link_state("robot").unwrap();
        assert_eq!(
            state,
            LinkState::Disconnected {
                failures: 3,
                retry_in_ms: None
            }
        );
        assert!(registry.snapshot().is_degraded());
        assert_eq!(control.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_counts_as_failure() {
        let config = LinkConfig {
            connect_timeout: Duration::from_millis(500),
            backoff: Backoff::new(Duration::from_millis(10), Duration::from_millis(10))
                .with_max_attempts(2),
            ..config()
        };
        let (registry, control, _trigger, task) = start(config);
        control.hang_connects(true);

        task.await.unwrap();
        assert!(registry.link_state("robot").unwrap().is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let (registry, control, trigger, task) = start(config());
        control.fail_next_connects(3);

        until(|| control.is_connected()).await;
        assert_eq!(registry.link_state("robot"), Some(LinkState::Connected));
        assert_eq!(control.history().iter().filter(|h| *h == "connect").count(), 4);

        trigger.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn prefixes_topics_with_link_name() {
        let config = LinkConfig {
            prefix_topics: true,
            announce: vec!["imu".into()],
            ..config()
        };
        let (registry, control, trigger, task) = start(config);
        control.set_known_topics(&["odom"]);

        until(|| control.is_connected()).await;
        control.send(TopicEvent::new("gps", Payload::text("x"), 1));
        control.send_malformed(Some("gps"));
        until(|| registry.stats().malformed == 1).await;

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.get("robot/imu").unwrap().health, Health::Unknown);
        assert_eq!(snapshot.get("robot/odom").unwrap().health, Health::Unknown);
        assert_eq!(snapshot.get("robot/gps").unwrap().health, Health::Live);
        assert_eq!(snapshot.get("robot/gps").unwrap().malformed, 1);
        assert!(snapshot.get("gps").is_none());

        trigger.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff() {
        let config = LinkConfig {
            backoff: Backoff::new(Duration::from_secs(60), Duration::from_secs(60)),
            ..config()
        };
        let (_registry, control, trigger, task) = start(config);
        control.set_unreachable(true);

        until(|| control.history().len() >= 2).await;
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn topics_go_stale_after_reconnect_instead_of_unknown() {
        let clock = Arc::new(MonotonicClock::anchored_at(0));
        let registry = Arc::new(Registry::with_clock(clock.clone()));
        let (transport, control) = FakeTransport::new("robot");
        let (trigger, signal) = shutdown_channel();
        let evaluator =
            StalenessEvaluator::new(registry.clone(), Duration::from_secs(5), Duration::from_secs(1))
                .start(signal.clone());
        let link = LinkSupervisor::new(config(), transport, registry.clone()).spawn(signal);

        until(|| control.is_connected()).await;
        control.send(TopicEvent::new("imu", Payload::text("x"), clock.now_ms()));
        until(|| registry.get("imu").is_some()).await;

        control.drop_link();
        until(|| control.connects() == 2 && control.is_connected()).await;
        assert_eq!(registry.get("imu").unwrap().health, Health::Live);

        tokio::time::sleep(Duration::from_secs(7)).await;
        let imu = registry.get("imu").unwrap();
        assert_eq!(imu.health, Health::Stale);
        assert_eq!(imu.count, 1);
        assert_eq!(imu.last_value, Some(Payload::text("x")));
        assert_eq!(registry.link_state("robot"), Some(LinkState::Connected));

        trigger.trigger();
        link.await.unwrap();
        evaluator.await.unwrap();
    }
}
