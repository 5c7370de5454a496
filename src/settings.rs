//! Startup configuration.
//!
//! Settings are read once from a TOML file, then overridden by
//! `TOPICWATCH__<SECTION>__<KEY>` environment variables:
//!
//! ```toml
//! [monitor]
//! staleness_threshold = "5s"
//! sweep_interval = "1s"
//!
//! [[upstreams]]
//! name = "oak0"
//! endpoint = "127.0.0.1:5001"
//! prefix_topics = true
//! every_n = 1
//! announce = ["imu", "gps"]
//!
//! [serve]
//! listen = "127.0.0.1:8042"
//! mode = "diff"
//!
//! [[outputs]]
//! kind = "file"
//! target = "topics.json"
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use topicwatch_adapters::{Backoff, LinkConfig, PayloadFormat, TopicPattern};
use topicwatch_core::{MonitorConfig, Output};

use crate::serve::StreamMode;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub upstreams: Vec<UpstreamSettings>,
    pub serve: ServeSettings,
    pub outputs: Vec<OutputSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub staleness_threshold: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub sweep_interval: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub publish_min_interval: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub publish_heartbeat: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            staleness_threshold: defaults.staleness_threshold,
            sweep_interval: defaults.sweep_interval,
            publish_min_interval: defaults.publish_min_interval,
            publish_heartbeat: defaults.publish_heartbeat,
        }
    }
}

impl MonitorSettings {
    pub fn to_config(&self) -> MonitorConfig {
        MonitorConfig {
            staleness_threshold: self.staleness_threshold,
            sweep_interval: self.sweep_interval,
            publish_min_interval: self.publish_min_interval,
            publish_heartbeat: self.publish_heartbeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
    #[default]
    Tcp,
    Nats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    pub name: String,
    #[serde(default)]
    pub kind: UpstreamKind,
    pub endpoint: String,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub prefix_topics: bool,
    #[serde(default)]
    pub payload: PayloadFormat,
    /// Only every N-th event per topic is delivered.
    #[serde(default = "default_every_n")]
    pub every_n: u32,
    #[serde(default = "default_connect_timeout", deserialize_with = "crate::duration::deserialize")]
    pub connect_timeout: Duration,
    #[serde(default = "default_backoff_base", deserialize_with = "crate::duration::deserialize")]
    pub backoff_base: Duration,
    #[serde(default = "default_backoff_cap", deserialize_with = "crate::duration::deserialize")]
    pub backoff_cap: Duration,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub announce: Vec<String>,
}

fn default_patterns() -> Vec<String> {
    vec!["**".to_string()]
}

fn default_every_n() -> u32 {
    1
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_cap() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

impl UpstreamSettings {
    /// Disabled upstreams, and endpoints on port 0, are skipped.
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.endpoint.ends_with(":0")
    }

    pub fn link_config(&self) -> Result<LinkConfig> {
        let patterns = self
            .patterns
            .iter()
            .map(|p| TopicPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid pattern in upstream {}", self.name))?;

        let mut backoff = Backoff::new(self.backoff_base, self.backoff_cap);
        backoff.max_attempts = self.max_attempts;

        Ok(LinkConfig {
            name: self.name.clone(),
            patterns,
            prefix_topics: self.prefix_topics,
            connect_timeout: self.connect_timeout,
            backoff,
            announce: self.announce.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    /// Address of the snapshot server. No server when unset.
    pub listen: Option<String>,
    /// `full` snapshots on every line, or `diff` after the first.
    pub mode: StreamMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    File,
    Tcp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    pub kind: OutputKind,
    pub target: String,
}

impl OutputSettings {
    pub fn to_output(&self) -> Output {
        match self.kind {
            OutputKind::File => Output::file(&self.target),
            OutputKind::Tcp => Output::tcp(&self.target),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("TOPICWATCH").separator("__"))
            .build()
            .context("failed to read configuration")?;

        let settings: Settings = config
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.monitor.to_config().validate()?;

        let mut names = BTreeSet::new();
        for upstream in &self.upstreams {
            if upstream.name.is_empty() {
                bail!("upstream with endpoint {} has no name", upstream.endpoint);
            }
            if !names.insert(upstream.name.as_str()) {
                bail!("duplicate upstream name {}", upstream.name);
            }
            if upstream.every_n == 0 {
                bail!("upstream {}: every_n must be at least 1", upstream.name);
            }
            upstream.link_config()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.monitor.to_config(), MonitorConfig::default());
        assert!(settings.upstreams.is_empty());
        assert!(settings.serve.listen.is_none());
        assert_eq!(settings.serve.mode, StreamMode::Full);
    }

    #[test]
    fn full_config() {
        let settings = Settings::from_toml(
            r#"
            [monitor]
            staleness_threshold = "2.5s"
            sweep_interval = "500ms"

            [[upstreams]]
            name = "oak0"
            endpoint = "127.0.0.1:5001"
            patterns = ["imu/**", "gps"]
            prefix_topics = true
            payload = "raw"
            every_n = 5
            max_attempts = 10
            announce = ["imu"]

            [[upstreams]]
            name = "spare"
            endpoint = "127.0.0.1:0"

            [serve]
            listen = "127.0.0.1:8042"
            mode = "diff"

            [[outputs]]
            kind = "file"
            target = "topics.json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.monitor.staleness_threshold, Duration::from_millis(2_500));
        assert_eq!(settings.monitor.sweep_interval, Duration::from_millis(500));
        assert_eq!(settings.monitor.publish_heartbeat, Duration::from_secs(1));

        let oak0 = &settings.upstreams[0];
        assert_eq!(oak0.kind, UpstreamKind::Tcp);
        assert_eq!(oak0.payload, PayloadFormat::Raw);
        assert_eq!(oak0.every_n, 5);
        assert_eq!(settings.upstreams[1].every_n, 1);
        assert!(oak0.is_enabled());

        let link = oak0.link_config().unwrap();
        assert_eq!(link.patterns.len(), 2);
        assert_eq!(link.backoff.max_attempts, Some(10));
        assert_eq!(link.backoff.cap, Duration::from_secs(30));
        assert_eq!(link.connect_timeout, Duration::from_secs(3));
        assert!(link.prefix_topics);

        assert!(!settings.upstreams[1].is_enabled());
        assert_eq!(settings.serve.listen.as_deref(), Some("127.0.0.1:8042"));
        assert_eq!(settings.serve.mode, StreamMode::Diff);
        assert_eq!(settings.outputs[0].kind, OutputKind::File);
    }

    #[test]
    fn duplicate_upstream_names_are_rejected() {
        let result = Settings::from_toml(
            r#"
            [[upstreams]]
            name = "a"
            endpoint = "127.0.0.1:1"

            [[upstreams]]
            name = "a"
            endpoint = "127.0.0.1:2"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let result = Settings::from_toml(
            r#"
            [[upstreams]]
            name = "a"
            endpoint = "127.0.0.1:1"
            patterns = ["a/**/b"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn zero_every_n_is_rejected() {
        let result = Settings::from_toml(
            r#"
            [[upstreams]]
            name = "a"
            endpoint = "127.0.0.1:1"
            every_n = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn bad_duration_is_rejected() {
        assert!(Settings::from_toml("[monitor]\nsweep_interval = \"often\"").is_err());
        assert!(Settings::from_toml("[monitor]\nsweep_interval = \"0s\"").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topicwatch.toml");
        std::fs::write(&path, "[serve]\nlisten = \"127.0.0.1:9000\"\n").unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.serve.listen.as_deref(), Some("127.0.0.1:9000"));
    }
}
