//! # Restart policies for service monitors.
//!
//! [`RestartPolicy`] decides whether a service process is started again after it
//! terminates, either on its own or because the monitor killed it for staying
//! unhealthy.
//!
//! ```text
//! exit code 0 ──────► Never      → Stopped
//!                     OnFailure  → Stopped
//!                     Always     → Restarting
//!
//! exit code ≠ 0  ───► Never      → Failed
//! (or unhealthy)      OnFailure  → Restarting
//!                     Always     → Restarting
//! ```
//!
//! Restarts under `OnFailure`/`Always` never give up; the backoff is capped but
//! the loop continues until the deployment is stopped.

use serde::{Deserialize, Serialize};

/// Policy controlling whether a service is restarted after its process terminates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart: the process runs once.
    Never,
    /// Restart only after a non-zero exit or an unhealthy kill (default).
    #[default]
    OnFailure,
    /// Restart after every termination.
    Always,
}

impl RestartPolicy {
    /// Returns `true` if a process that terminated with the given outcome should be restarted.
    ///
    /// `clean` is `true` only for a voluntary exit with status 0.
    pub fn permits_restart(&self, clean: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => !clean,
            RestartPolicy::Always => true,
        }
    }

    /// Stable lowercase name as used in descriptors.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "never",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Always => "always",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_does_not_restart() {
        assert!(!RestartPolicy::Never.permits_restart(true));
        assert!(!RestartPolicy::Never.permits_restart(false));
    }

    #[test]
    fn on_failure_restarts_only_dirty_exits() {
        assert!(!RestartPolicy::OnFailure.permits_restart(true));
        assert!(RestartPolicy::OnFailure.permits_restart(false));
    }

    #[test]
    fn always_restarts() {
        assert!(RestartPolicy::Always.permits_restart(true));
        assert!(RestartPolicy::Always.permits_restart(false));
    }
}
