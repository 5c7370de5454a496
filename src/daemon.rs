//! Wiring of settings into a running monitor.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use topicwatch_adapters::{LinkSupervisor, TcpTransport, Transport};
use topicwatch_core::{Monitor, MonitorHandle, Snapshot};
use tracing::info;

use crate::serve;
use crate::settings::{Settings, UpstreamKind, UpstreamSettings};

/// Build a monitor with the configured timings and outputs.
pub fn build_monitor(settings: &Settings) -> Result<Monitor> {
    let mut builder = Monitor::builder().config(settings.monitor.to_config());
    for output in &settings.outputs {
        builder = builder.output(output.to_output());
    }
    Ok(builder.build()?)
}

/// Create the transport for one upstream.
pub fn transport(upstream: &UpstreamSettings) -> Result<Box<dyn Transport>> {
    match upstream.kind {
        UpstreamKind::Tcp => Ok(Box::new(
            TcpTransport::new(&upstream.endpoint)
                .with_payload_format(upstream.payload)
                .with_every_n(upstream.every_n),
        )),
        #[cfg(feature = "nats")]
        UpstreamKind::Nats => Ok(Box::new(
            topicwatch_adapters::NatsTransport::new(&upstream.endpoint)
                .with_payload_format(upstream.payload)
                .with_every_n(upstream.every_n),
        )),
        #[cfg(not(feature = "nats"))]
        UpstreamKind::Nats => anyhow::bail!(
            "upstream {} needs NATS support; rebuild with the `nats` feature",
            upstream.name
        ),
    }
}

/// Start the monitor and a supervisor for every enabled upstream.
pub fn start(settings: &Settings, monitor: &Monitor) -> Result<MonitorHandle> {
    let mut links = Vec::new();
    for upstream in &settings.upstreams {
        if !upstream.is_enabled() {
            info!(link = %upstream.name, "upstream disabled, skipping");
            continue;
        }
        links.push(LinkSupervisor::with_boxed(
            upstream.link_config()?,
            transport(upstream)?,
            monitor.sink(),
        ));
    }

    let mut handle = monitor.start();
    for link in links {
        handle.attach(link.spawn(handle.signal()));
    }
    Ok(handle)
}

/// Run until Ctrl-C, serving snapshots if a listen address is configured.
pub async fn run(settings: Settings) -> Result<()> {
    let monitor = build_monitor(&settings)?;

    let listener = match &settings.serve.listen {
        Some(addr) => Some(serve::bind(addr).await?),
        None => None,
    };

    let mut handle = start(&settings, &monitor)?;
    if let Some(listener) = listener {
        handle.attach(serve::spawn(
            listener,
            monitor.subscribe(),
            settings.serve.mode,
            handle.signal(),
        ));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");

    handle.shutdown().await;
    Ok(())
}

/// Collect for `window`, then write one snapshot to `path`.
pub async fn export(settings: Settings, path: &Path, window: Duration) -> Result<Arc<Snapshot>> {
    let monitor = build_monitor(&settings)?;
    let handle = start(&settings, &monitor)?;

    tokio::select! {
        _ = tokio::time::sleep(window) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted, exporting early"),
    }

    let snapshot = monitor.publish_now().await;
    handle.shutdown().await;

    let json = serde_json::to_string_pretty(snapshot.as_ref())?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(snapshot)
}
