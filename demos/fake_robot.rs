//! Example: a simulated robot feeding a monitor
//!
//! A scripted in-memory link publishes `imu` at 50 Hz and `lidar` at 10 Hz,
//! while `gps` goes quiet after two seconds and `camera` is announced but
//! never delivers. Halfway through the link drops and the supervisor
//! reconnects. A summary line is printed for every published snapshot.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example fake_robot
//! ```

use std::time::Duration;

use topicwatch_adapters::{Backoff, FakeTransport, LinkConfig, LinkSupervisor};
use topicwatch_core::{Health, Monitor, MonitorConfig, Payload, TopicEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Fake robot example");
    println!("Simulating imu, lidar, gps and camera topics for 8 seconds...\n");

    let monitor = Monitor::builder()
        .config(MonitorConfig {
            staleness_threshold: Duration::from_secs(1),
            sweep_interval: Duration::from_millis(250),
            publish_min_interval: Duration::from_millis(100),
            publish_heartbeat: Duration::from_secs(1),
        })
        .build()?;
    let mut handle = monitor.start();

    let (transport, control) = FakeTransport::new("robot");
    let mut link = LinkConfig::new("robot");
    link.backoff = Backoff::new(Duration::from_millis(200), Duration::from_secs(1));
    link.announce = vec!["camera".to_string()];
    handle.attach(LinkSupervisor::new(link, transport, monitor.sink()).spawn(handle.signal()));

    // Print a line per published snapshot
    let mut snapshots = monitor.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let topics: Vec<String> = snapshot
                .iter()
                .map(|t| format!("{}={}", t.name, t.health))
                .collect();
            println!(
                "[{}] live {} stale {} unknown {} | {}",
                snapshot.timestamp_ms,
                snapshot.count_by_health(Health::Live),
                snapshot.count_by_health(Health::Stale),
                snapshot.count_by_health(Health::Unknown),
                topics.join(" "),
            );
        }
    });

    let mut tick = tokio::time::interval(Duration::from_millis(20));
    for n in 0u64..400 {
        tick.tick().await;

        control.send(TopicEvent::now("imu", Payload::text(format!("{{\"seq\":{n}}}"))));
        if n % 5 == 0 {
            control.send(TopicEvent::now("lidar", Payload::binary(vec![0u8; 64])));
        }
        if n < 100 && n % 10 == 0 {
            control.send(TopicEvent::now("gps", Payload::text("{\"fix\":3}")));
        }
        if n == 200 {
            println!("-- dropping link --");
            control.drop_link();
        }
    }

    let last = monitor.latest();
    println!("\nFinal state:");
    for topic in last.iter() {
        println!("  {:<8} {:<8} count {}", topic.name, topic.health.symbol(), topic.count);
    }

    handle.shutdown().await;
    Ok(())
}
