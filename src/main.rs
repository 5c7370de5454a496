use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use topicwatch::duration::{format_duration, parse_duration};
use topicwatch::{daemon, Settings};
use topicwatch_core::Health;

#[derive(Parser, Debug)]
#[command(name = "topicwatch")]
#[command(about = "Liveness monitor for robot telemetry topics")]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve snapshots on this address (overrides [serve] listen)
    #[arg(short, long)]
    listen: Option<String>,

    /// Collect for --window, write one snapshot to this file and exit
    #[arg(short, long, conflicts_with = "listen")]
    export: Option<PathBuf>,

    /// Collection window for --export (e.g., "5s", "500ms")
    #[arg(short, long, default_value = "5s", requires = "export")]
    window: String,

    /// Log filter (e.g., "info", "topicwatch_adapters=debug"). Defaults to RUST_LOG, then "info"
    #[arg(long)]
    log: Option<String>,
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    let mut settings = Settings::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("failed to load settings from {}", path.display()),
        None => "failed to load settings from environment".to_string(),
    })?;

    if let Some(listen) = args.listen {
        settings.serve.listen = Some(listen);
    }

    if settings.upstreams.is_empty() {
        tracing::warn!("no upstreams configured; every topic will stay unknown");
    }

    if let Some(export_path) = args.export {
        let window = parse_duration(&args.window)
            .with_context(|| format!("invalid --window {:?}", args.window))?;
        let snapshot = daemon::export(settings, &export_path, window).await?;

        println!("Exported topic state to: {}", export_path.display());
        println!(
            "  Window: {}  Topics: {} (live {}, stale {}, unknown {})",
            format_duration(window),
            snapshot.len(),
            snapshot.count_by_health(Health::Live),
            snapshot.count_by_health(Health::Stale),
            snapshot.count_by_health(Health::Unknown),
        );
        for (name, state) in &snapshot.links {
            println!("  Link {name}: {}", state.symbol());
        }
        return Ok(());
    }

    daemon::run(settings).await
}
