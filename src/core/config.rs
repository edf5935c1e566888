//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] holds every timing knob of the runtime. The descriptor's
//! `[supervisor]` table deserializes into it; durations are written as strings
//! (`"100ms"`, `"30s"`, `"5m"`) or bare seconds.
//!
//! ## Sentinel values
//! - `failure_threshold = 0` is treated as `1`.
//! - `bus_capacity = 0` is treated as `1`.
//! - `probe_interval` below `10ms` is raised to `10ms`.
//! - `unhealthy_grace = 0s` never kills a process for being unhealthy.

use std::time::Duration;

use serde::Deserialize;

use crate::descriptor::duration;
use crate::policies::BackoffPolicy;

/// Runtime configuration shared by the supervisor and every monitor.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Wait after SIGTERM before SIGKILL, per service.
    #[serde(with = "duration")]
    pub grace: Duration,

    /// How long a dependent waits for each dependency to become healthy.
    #[serde(with = "duration")]
    pub dependency_timeout: Duration,

    /// Interval between health probes of one service.
    #[serde(with = "duration")]
    pub probe_interval: Duration,

    /// Timeout of a single probe.
    #[serde(with = "duration")]
    pub probe_timeout: Duration,

    /// Consecutive failed probes that flip a healthy service to unhealthy.
    pub failure_threshold: u32,

    /// How long a service may stay unhealthy before its process is terminated
    /// and the restart policy applies.
    #[serde(with = "duration")]
    pub unhealthy_grace: Duration,

    /// Continuous healthy time after which the consecutive-restart counter resets.
    #[serde(with = "duration")]
    pub healthy_reset: Duration,

    /// Event bus ring-buffer size.
    pub bus_capacity: usize,

    /// Backoff for services that do not set one.
    pub backoff: BackoffPolicy,
}

impl SupervisorConfig {
    /// Debounce threshold, at least 1.
    #[inline]
    pub fn failure_threshold_clamped(&self) -> u32 {
        self.failure_threshold.max(1)
    }

    /// Bus capacity, at least 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Probe interval, at least 10ms.
    #[inline]
    pub fn probe_interval_clamped(&self) -> Duration {
        self.probe_interval.max(Duration::from_millis(10))
    }

    /// `None` when unhealthy processes are never killed.
    #[inline]
    pub fn unhealthy_kill_after(&self) -> Option<Duration> {
        (!self.unhealthy_grace.is_zero()).then_some(self.unhealthy_grace)
    }

    /// Upper bound for one monitor to finish after cancellation.
    ///
    /// Covers SIGTERM grace plus the SIGKILL reap.
    #[inline]
    pub fn monitor_join_timeout(&self) -> Duration {
        self.grace + Duration::from_secs(5)
    }
}

impl Default for SupervisorConfig {
    /// - `grace = 30s`
    /// - `dependency_timeout = 5m`
    /// - `probe_interval = 5s`, `probe_timeout = 2s`, `failure_threshold = 3`
    /// - `unhealthy_grace = 60s`, `healthy_reset = 60s`
    /// - `bus_capacity = 1024`
    /// - `backoff = 1s × 2 up to 30s`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            dependency_timeout: Duration::from_secs(300),
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            failure_threshold: 3,
            unhealthy_grace: Duration::from_secs(60),
            healthy_reset: Duration::from_secs(60),
            bus_capacity: 1024,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_clamped() {
        let cfg = SupervisorConfig {
            failure_threshold: 0,
            bus_capacity: 0,
            unhealthy_grace: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.failure_threshold_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.unhealthy_kill_after(), None);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.backoff.first, Duration::from_secs(1));
        assert_eq!(cfg.backoff.max, Duration::from_secs(30));
    }
}
