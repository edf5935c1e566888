//! # Probe debounce.
//!
//! ```text
//!            success                    threshold × failure
//!   Unknown ─────────► Healthy ◄──────────────────────────► Unhealthy
//!      │  failures keep            one success
//!      └─ the service Running
//! ```
//!
//! Before the first success the tracker never reports a transition: startup is
//! bounded by the dependency timeout, not by the debounce. `Unknown` probe
//! results are ignored entirely.

use super::HealthResult;

/// Debounced health of one service, as seen by the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebouncedHealth {
    /// No successful probe yet.
    Unknown,
    Healthy,
    Unhealthy,
}

/// Consecutive-failure debounce over probe results.
#[derive(Clone, Debug)]
pub struct HealthTracker {
    threshold: u32,
    state: DebouncedHealth,
    failures: u32,
}

impl HealthTracker {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            state: DebouncedHealth::Unknown,
            failures: 0,
        }
    }

    /// Feeds one probe result; returns the new state if it changed.
    pub fn observe(&mut self, result: HealthResult) -> Option<DebouncedHealth> {
        let next = match (self.state, result) {
            (_, HealthResult::Unknown) => return None,
            (_, HealthResult::Healthy) => {
                self.failures = 0;
                DebouncedHealth::Healthy
            }
            (DebouncedHealth::Unknown, HealthResult::Unhealthy) => return None,
            (_, HealthResult::Unhealthy) => {
                self.failures = self.failures.saturating_add(1);
                if self.failures >= self.threshold {
                    DebouncedHealth::Unhealthy
                } else {
                    self.state
                }
            }
        };

        if next == self.state {
            None
        } else {
            self.state = next;
            Some(next)
        }
    }

    pub fn state(&self) -> DebouncedHealth {
        self.state
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::HealthResult::{Healthy, Unhealthy, Unknown};
    use super::*;

    #[test]
    fn first_success_is_immediate() {
        let mut t = HealthTracker::new(3);
        assert_eq!(t.observe(Unhealthy), None);
        assert_eq!(t.observe(Unhealthy), None);
        assert_eq!(t.observe(Unhealthy), None);
        assert_eq!(t.state(), DebouncedHealth::Unknown);
        assert_eq!(t.observe(Healthy), Some(DebouncedHealth::Healthy));
    }

    #[test]
    fn flips_after_threshold_consecutive_failures() {
        let mut t = HealthTracker::new(3);
        t.observe(Healthy);
        assert_eq!(t.observe(Unhealthy), None);
        assert_eq!(t.observe(Unhealthy), None);
        assert_eq!(t.observe(Unhealthy), Some(DebouncedHealth::Unhealthy));
        assert_eq!(t.observe(Unhealthy), None);
        assert_eq!(t.observe(Healthy), Some(DebouncedHealth::Healthy));
    }

    #[test]
    fn success_resets_the_count() {
        let mut t = HealthTracker::new(2);
        t.observe(Healthy);
        t.observe(Unhealthy);
        t.observe(Healthy);
        assert_eq!(t.observe(Unhealthy), None);
        assert_eq!(t.failures(), 1);
    }

    #[test]
    fn unknown_neither_counts_nor_resets() {
        let mut t = HealthTracker::new(2);
        t.observe(Healthy);
        t.observe(Unhealthy);
        assert_eq!(t.observe(Unknown), None);
        assert_eq!(t.failures(), 1);
        assert_eq!(t.observe(Unhealthy), Some(DebouncedHealth::Unhealthy));
    }
}
