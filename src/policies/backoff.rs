//! # Backoff policy for fetch retries.
//!
//! [`BackoffPolicy`] computes how long the poller sleeps after its `n`-th consecutive
//! fetch failure: `first × factor^n`, clamped to `max`, then jittered. The failure
//! counter resets after the next successful fetch.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use seedvisor::{BackoffPolicy, JitterPolicy};
//!
//! let retry = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(retry.delay(0), Duration::from_millis(100));
//! assert_eq!(retry.delay(3), Duration::from_millis(800));
//! assert_eq!(retry.delay(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 100ms delay (`factor = 1.0`), capped at 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay after `failures` previous consecutive failures (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to `max`, so huge failure
    /// counts are safe.
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential(jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn grows_exponentially_without_jitter() {
        let policy = exponential(JitterPolicy::None);
        let got: Vec<_> = (0..5).map(|n| policy.delay(n).as_millis()).collect();
        assert_eq!(got, vec![100, 200, 400, 800, 1600]);
    }

    #[test]
    fn first_above_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            ..exponential(JitterPolicy::None)
        };
        assert_eq!(policy.delay(0), Duration::from_secs(5));
    }

    #[test]
    fn overflowing_exponent_clamps_to_max() {
        let policy = exponential(JitterPolicy::None);
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn equal_jitter_keeps_at_least_half() {
        let policy = exponential(JitterPolicy::Equal);
        for failures in 0..12 {
            let base = (100.0 * 2.0f64.powi(failures as i32)).min(30_000.0) as u64;
            let delay = policy.delay(failures);
            assert!(delay >= Duration::from_millis(base / 2), "failures={failures}");
            assert!(delay <= Duration::from_millis(base), "failures={failures}");
        }
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let policy = exponential(JitterPolicy::Full);
        for failures in 0..12 {
            let base = (100.0 * 2.0f64.powi(failures as i32)).min(30_000.0) as u64;
            assert!(policy.delay(failures) <= Duration::from_millis(base));
        }
    }
}
