//! # Service state machine and read-only snapshots.
//!
//! ```text
//!  Pending ──► Starting ──► Running ──► Healthy ◄──► Unhealthy
//!     │           │  ▲         │           │            │
//!     │           │  │         └─────┬─────┴────────────┤
//!     │           │  │               ▼                  ▼
//!     │           │  └────────── Restarting          Failed
//!     │           │                  │                  │
//!     │           ▼                  ▼                  ▼
//!     └──────────────────────► Stopping ──────────► Stopped
//! ```
//!
//! `Failed` is reachable from `Starting`, `Running`, `Healthy` and `Unhealthy`.
//! Every non-terminal state may move to `Stopping` on teardown. A clean exit
//! under a non-restarting policy goes straight to `Stopped`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one managed service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Declared, not yet started.
    Pending,
    /// Process is being spawned.
    Starting,
    /// Process is alive; health not yet established.
    Running,
    /// Health check passes.
    Healthy,
    /// Health check has failed past the debounce threshold.
    Unhealthy,
    /// Waiting out the backoff delay before the next start.
    Restarting,
    /// Termination signal sent, waiting for exit.
    Stopping,
    /// Process is gone and will not be restarted.
    Stopped,
    /// Process terminated with an error and the policy forbids a restart.
    Failed,
}

impl ServiceState {
    /// Returns `true` if the state machine allows `self → next`.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        match (self, next) {
            (Pending, Starting | Stopped) => true,
            (Starting, Running | Restarting | Failed | Stopping) => true,
            (Running, Healthy | Unhealthy) => true,
            (Healthy, Unhealthy) | (Unhealthy, Healthy) => true,
            (Running | Healthy | Unhealthy, Restarting | Failed | Stopping | Stopped) => true,
            (Restarting, Starting | Stopping) => true,
            (Stopping, Stopped) => true,
            (Failed, Stopped) => true,
            _ => false,
        }
    }

    /// `Stopped` and `Failed`: the monitor has exited for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Failed)
    }

    /// A process may be alive in this state.
    pub fn has_process(self) -> bool {
        matches!(
            self,
            ServiceState::Running
                | ServiceState::Healthy
                | ServiceState::Unhealthy
                | ServiceState::Stopping
        )
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Pending => "pending",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Healthy => "healthy",
            ServiceState::Unhealthy => "unhealthy",
            ServiceState::Restarting => "restarting",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only copy of a service's runtime record.
///
/// Produced by the supervisor's state table; the live record is owned by the
/// service's monitor task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    /// Service name.
    pub name: String,
    /// Current state.
    pub state: ServiceState,
    /// Total restarts since the deployment started (monotonic).
    pub restart_count: u32,
    /// When `state` was entered.
    pub last_transition: DateTime<Utc>,
    /// Pid of the current process, if one was spawned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Exit code of the last terminated process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    /// Last failure reason (spawn error, exit status, unhealthy kill).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ServiceSnapshot {
    /// A fresh `Pending` snapshot.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServiceState::Pending,
            restart_count: 0,
            last_transition: Utc::now(),
            pid: None,
            last_exit_code: None,
            last_error: None,
        }
    }

    /// Same snapshot in another state (test and fixture helper).
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = state;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceState::*;

    #[test]
    fn restart_cycle_is_allowed() {
        assert!(Running.can_transition_to(Restarting));
        assert!(Restarting.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
    }

    #[test]
    fn failed_is_reachable_from_active_states_only() {
        for from in [Starting, Running, Healthy, Unhealthy] {
            assert!(from.can_transition_to(Failed), "{from} -> failed");
        }
        for from in [Pending, Restarting, Stopping, Stopped] {
            assert!(!from.can_transition_to(Failed), "{from} -> failed");
        }
    }

    #[test]
    fn stopped_is_final() {
        for next in [Pending, Starting, Running, Healthy, Stopping, Stopped, Failed] {
            assert!(!Stopped.can_transition_to(next));
        }
    }

    #[test]
    fn pending_cannot_skip_to_running() {
        assert!(!Pending.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Healthy));
    }
}
