//! Timing parameters for the monitor.

use std::time::Duration;

use thiserror::Error;

/// Invalid monitor configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Timing knobs of the evaluator and publisher.
///
/// Supplied once at startup; the running monitor never re-reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Silence after which a live topic is considered stale.
    pub staleness_threshold: Duration,
    /// How often the staleness evaluator sweeps the registry.
    pub sweep_interval: Duration,
    /// Minimum spacing between change-triggered publications.
    pub publish_min_interval: Duration,
    /// Publication period when nothing changes.
    pub publish_heartbeat: Duration,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // tokio intervals panic on a zero period
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("sweep_interval"));
        }
        if self.publish_heartbeat.is_zero() {
            return Err(ConfigError::ZeroDuration("publish_heartbeat"));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
            publish_min_interval: Duration::from_millis(100),
            publish_heartbeat: Duration::from_secs(1),
        }
    }
}
