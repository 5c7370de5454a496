//! Message rate estimation.

/// Weight given to the newest inter-arrival interval.
const ALPHA: f64 = 0.2;

/// Intervals are floored so bursts with identical timestamps stay finite.
const MIN_INTERVAL_MS: f64 = 1.0;

/// Exponentially-weighted moving average of inter-arrival intervals.
///
/// The estimate is expressed in messages per second and is only available
/// once two events have been observed.
#[derive(Debug, Clone, Default)]
pub struct RateEstimator {
    last_ts_ms: Option<u64>,
    mean_interval_ms: Option<f64>,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in an event observed at `ts_ms`.
    ///
    /// Callers only pass non-decreasing timestamps; an older timestamp is
    /// treated as a zero interval.
    pub fn observe(&mut self, ts_ms: u64) {
        if let Some(last) = self.last_ts_ms {
            let interval = (ts_ms.saturating_sub(last) as f64).max(MIN_INTERVAL_MS);
            self.mean_interval_ms = Some(match self.mean_interval_ms {
                Some(mean) => ALPHA * interval + (1.0 - ALPHA) * mean,
                None => interval,
            });
        }
        self.last_ts_ms = Some(ts_ms);
    }

    /// Current estimate in messages per second.
    pub fn rate(&self) -> Option<f64> {
        self.mean_interval_ms.map(|mean| 1000.0 / mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rate_until_second_event() {
        let mut rate = RateEstimator::new();
        assert_eq!(rate.rate(), None);

        rate.observe(1_000);
        assert_eq!(rate.rate(), None);

        rate.observe(1_100);
        assert_eq!(rate.rate(), Some(10.0));
    }

    #[test]
    fn steady_stream_converges_to_its_rate() {
        let mut rate = RateEstimator::new();
        for i in 0..50 {
            rate.observe(i * 50);
        }
        let estimate = rate.rate().unwrap();
        assert!((estimate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn rate_tracks_a_slowdown() {
        let mut rate = RateEstimator::new();
        let mut ts = 0;
        for _ in 0..20 {
            ts += 100;
            rate.observe(ts);
        }
        let fast = rate.rate().unwrap();

        for _ in 0..20 {
            ts += 1_000;
            rate.observe(ts);
        }
        let slow = rate.rate().unwrap();

        assert!(slow < fast);
        assert!(slow < 1.1);
    }

    #[test]
    fn identical_timestamps_stay_finite() {
        let mut rate = RateEstimator::new();
        rate.observe(500);
        rate.observe(500);
        assert_eq!(rate.rate(), Some(1000.0));
    }
}
