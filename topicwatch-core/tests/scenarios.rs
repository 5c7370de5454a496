//! End-to-end behavior of a running monitor, driven on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use topicwatch_core::{Clock, Health, Monitor, MonitorConfig, MonotonicClock, Payload, TopicEvent};

fn monitor() -> (Monitor, Arc<dyn Clock>) {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::anchored_at(0));
    let monitor = Monitor::builder()
        .config(MonitorConfig {
            staleness_threshold: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
            ..Default::default()
        })
        .clock(clock.clone())
        .build()
        .unwrap();
    (monitor, clock)
}

fn health(monitor: &Monitor, topic: &str) -> Health {
    monitor.snapshot().get(topic).unwrap().health
}

/// Sleep until just past `at_ms` on the monitor's timeline.
async fn advance_to(clock: &Arc<dyn Clock>, at_ms: u64) {
    let now = clock.now_ms();
    if at_ms > now {
        tokio::time::sleep(Duration::from_millis(at_ms - now)).await;
    }
    // Let background sweeps scheduled for this instant run
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn announced_topic_stays_unknown_through_silence() {
    let (monitor, clock) = monitor();
    monitor.announce("imu");
    let handle = monitor.start();

    advance_to(&clock, 10_500).await;
    assert_eq!(health(&monitor, "imu"), Health::Unknown);
    assert!(monitor.snapshot().get("imu").unwrap().last_seen_ms.is_none());

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn out_of_order_event_keeps_newer_timestamp() {
    let (monitor, _clock) = monitor();
    let sink = monitor.sink();

    sink.ingest(TopicEvent::new("lidar", Payload::text("a"), 100));
    sink.ingest(TopicEvent::new("lidar", Payload::text("b"), 90));

    let snapshot = monitor.snapshot();
    let lidar = snapshot.get("lidar").unwrap();
    assert_eq!(lidar.last_seen_ms, Some(100));
    assert_eq!(lidar.last_value, Some(Payload::text("a")));
    assert_eq!(snapshot.stats.out_of_order, 1);
}

#[tokio::test(start_paused = true)]
async fn silent_topic_goes_stale_then_recovers() {
    let (monitor, clock) = monitor();
    let handle = monitor.start();

    monitor
        .sink()
        .ingest(TopicEvent::new("gps", Payload::text("fix"), 0));

    // Sweep at t=5 sees exactly the threshold and leaves it live
    advance_to(&clock, 5_500).await;
    assert_eq!(health(&monitor, "gps"), Health::Live);

    // Sweep at t=6 is the first one past the threshold
    advance_to(&clock, 6_500).await;
    assert_eq!(health(&monitor, "gps"), Health::Stale);

    advance_to(&clock, 7_000).await;
    monitor
        .sink()
        .ingest(TopicEvent::new("gps", Payload::text("fix"), clock.now_ms()));
    assert_eq!(health(&monitor, "gps"), Health::Live);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn topics_live_before_an_outage_become_stale_not_unknown() {
    let (monitor, clock) = monitor();
    monitor.announce("never");
    let handle = monitor.start();
    let sink = monitor.sink();

    for ts in (0..=2_000).step_by(100) {
        advance_to(&clock, ts).await;
        sink.ingest(TopicEvent::new("imu", Payload::text("x"), clock.now_ms()));
        sink.ingest(TopicEvent::new("odom", Payload::text("y"), clock.now_ms()));
    }

    // Upstream goes quiet
    advance_to(&clock, 8_500).await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.get("imu").unwrap().health, Health::Stale);
    assert_eq!(snapshot.get("odom").unwrap().health, Health::Stale);
    assert_eq!(snapshot.get("never").unwrap().health, Health::Unknown);
    assert_eq!(snapshot.get("imu").unwrap().last_seen_ms, Some(2_000));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_every_health_transition_eventually() {
    let (monitor, clock) = monitor();
    let mut updates = monitor.subscribe();
    let handle = monitor.start();

    monitor
        .sink()
        .ingest(TopicEvent::new("gps", Payload::text("fix"), 0));

    advance_to(&clock, 6_500).await;
    let latest = updates.borrow_and_update().clone();
    assert_eq!(latest.get("gps").unwrap().health, Health::Stale);

    handle.shutdown().await;
}
