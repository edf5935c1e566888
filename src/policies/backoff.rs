//! # Restart backoff.
//!
//! [`BackoffPolicy`] computes how long a monitor waits before starting a crashed
//! service again. The delay for the `n`-th consecutive restart (0-based) is
//! `first × factor^n`, clamped to `max`, then jittered.
//!
//! The base is derived from the restart counter alone, so jitter never feeds back
//! into later delays. The monitor resets the counter once the service has stayed
//! healthy for `SupervisorConfig::healthy_reset`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use stackvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(4),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(1), Duration::from_secs(2));
//! assert_eq!(backoff.next(2), Duration::from_secs(4));
//! assert_eq!(backoff.next(3), Duration::from_secs(4)); // capped
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::descriptor::duration;
use crate::policies::jitter::JitterPolicy;

/// Exponential, capped restart backoff.
///
/// Deserializes from `{ first = "1s", max = "30s", factor = 2.0, jitter = "full" }`;
/// omitted fields take their defaults.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    #[serde(with = "duration")]
    pub first: Duration,
    /// Upper bound for any delay.
    #[serde(with = "duration")]
    pub max: Duration,
    /// Multiplicative growth per consecutive restart (`2.0` doubles).
    pub factor: f64,
    /// Randomization applied to the clamped base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `factor = 2.0`, `max = 30s`, no jitter: 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before restart number `consecutive` (0-based).
    ///
    /// Overflowing or non-finite intermediate values clamp to [`BackoffPolicy::max`].
    pub fn next(&self, consecutive: u32) -> Duration {
        let exp = consecutive.min(i32::MAX as u32) as i32;
        let nanos = (self.first.as_nanos() as f64 * self.factor.powi(exp)).round();

        let base = if !nanos.is_finite() || nanos < 0.0 || nanos > self.max.as_nanos() as f64 {
            self.max
        } else {
            Duration::from_nanos(nanos as u64)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling(first_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn default_doubles_from_one_second() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..7).map(|n| policy.next(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn first_three_restarts_strictly_increase_then_cap() {
        let policy = doubling(100, 400);
        let d: Vec<Duration> = (0..5).map(|n| policy.next(n)).collect();
        assert!(d[0] < d[1] && d[1] < d[2]);
        assert_eq!(d[2], Duration::from_millis(400));
        assert_eq!(d[3], d[2]);
        assert_eq!(d[4], d[2]);
    }

    #[test]
    fn first_above_max_is_clamped() {
        let policy = doubling(10_000, 5_000);
        assert_eq!(policy.next(0), Duration::from_millis(5_000));
    }

    #[test]
    fn huge_counter_clamps_to_max() {
        let policy = doubling(100, 10_000);
        assert_eq!(policy.next(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn constant_factor_keeps_first() {
        let policy = BackoffPolicy {
            factor: 1.0,
            ..doubling(250, 10_000)
        };
        assert!((0..10).all(|n| policy.next(n) == Duration::from_millis(250)));
    }

    #[test]
    fn equal_jitter_stays_within_half_and_full_base() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..doubling(100, 30_000)
        };
        for n in 0..12 {
            let base = (100.0 * 2.0f64.powi(n as i32)).min(30_000.0) as u64;
            let delay = policy.next(n);
            assert!(delay >= Duration::from_millis(base / 2), "restart {n}: {delay:?}");
            assert!(delay <= Duration::from_millis(base), "restart {n}: {delay:?}");
        }
    }

    #[test]
    fn decorrelated_jitter_respects_floor_and_cap() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Decorrelated,
            ..doubling(100, 30_000)
        };
        for _ in 0..100 {
            let delay = policy.next(8);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(30_000));
        }
    }
}
