//! # Jitter for restart delays.
//!
//! Spreads restarts of services that crash together (e.g. both clients losing
//! the same disk) so they do not hammer shared resources in lockstep.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Exact delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2 + uniform[0, delay/2]`.
    Equal,
    /// Uniform in `[first, min(prev * 3, max)]`; see [`JitterPolicy::apply_decorrelated`].
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`. `Decorrelated` needs more context and returns `delay` unchanged.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full if ms == 0 => Duration::ZERO,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let extra = if half == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=half)
                };
                Duration::from_millis(half + extra)
            }
        }
    }

    /// Decorrelated jitter: uniform in `[floor, min(prev * 3, max)]`.
    ///
    /// Falls back to [`JitterPolicy::apply`] for every other variant.
    pub fn apply_decorrelated(&self, floor: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let floor_ms = floor.as_millis() as u64;
        let upper = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(floor_ms);

        if floor_ms >= upper {
            return floor;
        }
        Duration::from_millis(rand::rng().random_range(floor_ms..=upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(1234);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn full_never_exceeds_delay() {
        let d = Duration::from_millis(1000);
        assert!((0..100).all(|_| JitterPolicy::Full.apply(d) <= d));
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn decorrelated_with_floor_above_cap_returns_floor() {
        let floor = Duration::from_millis(500);
        let out = JitterPolicy::Decorrelated.apply_decorrelated(
            floor,
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        assert_eq!(out, floor);
    }
}
