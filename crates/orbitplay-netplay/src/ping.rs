//! Round-trip latency tracking.
//!
//! Samples are folded into an exponentially weighted mean and variance
//! (EWMA / EWMASD) with a fixed decay factor.

use std::time::{SystemTime, UNIX_EPOCH};

/// Decay factor applied to every new sample.
pub const DEFAULT_ALPHA: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct PingMonitor {
    alpha: f64,
    mean: f64,
    variance: f64,
    samples: u64,
}

impl Default for PingMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl PingMonitor {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            mean: 0.0,
            variance: 0.0,
            samples: 0,
        }
    }

    /// Fold one round-trip sample, in milliseconds.
    pub fn update(&mut self, sample_ms: f64) {
        let diff = sample_ms - self.mean;
        let incr = self.alpha * diff;
        self.mean += incr;
        self.variance = (1.0 - self.alpha) * (self.variance + diff * incr);
        self.samples += 1;
    }

    pub fn average(&self) -> f64 {
        self.mean
    }

    pub fn stddev(&self) -> f64 {
        self.variance.sqrt()
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }
}

/// Milliseconds since the unix epoch, as carried by ping messages.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_sample_moves_a_fifth_of_the_way() {
        let mut ping = PingMonitor::default();
        ping.update(100.0);
        assert!((ping.average() - 20.0).abs() < 1e-9);
        // var = 0.8 * (0 + 100 * 20)
        assert!((ping.stddev() - 1600f64.sqrt()).abs() < 1e-9);
        assert_eq!(ping.sample_count(), 1);
    }

    #[test]
    fn empty_monitor_reads_zero() {
        let ping = PingMonitor::default();
        assert_eq!(ping.average(), 0.0);
        assert_eq!(ping.stddev(), 0.0);
    }

    proptest! {
        #[test]
        fn identical_samples_converge(v in 1.0f64..500.0) {
            let mut ping = PingMonitor::default();
            for _ in 0..100 {
                ping.update(v);
            }
            // 0.8^100 of the initial gap is left.
            prop_assert!((ping.average() - v).abs() < v * 1e-6);
            prop_assert!(ping.stddev() < v * 1e-3);
        }
    }
}
