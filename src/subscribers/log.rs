//! # LogWriter: lifecycle events as `tracing` records.
//!
//! Transitions into `Failed`, `Unhealthy` and dependency faults log at `warn`/`error`;
//! everything else at `info` (probe-level chatter stays in the monitors at `debug`).

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that writes every event through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let dependency = e.dependency.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ServiceStarting => {
                info!(service, attempt = e.attempt, "starting");
            }
            EventKind::ServiceRunning => {
                info!(service, pid = e.pid, "running");
            }
            EventKind::ServiceHealthy => {
                info!(service, "healthy");
            }
            EventKind::ServiceUnhealthy => {
                warn!(service, failures = e.attempt, "unhealthy");
            }
            EventKind::ServiceRestarting => {
                warn!(
                    service,
                    restart = e.attempt,
                    delay_ms = e.delay_ms,
                    exit_code = e.exit_code,
                    reason,
                    "restarting"
                );
            }
            EventKind::ServiceStopping => {
                info!(service, "stopping");
            }
            EventKind::ServiceStopped => {
                info!(service, exit_code = e.exit_code, reason, "stopped");
            }
            EventKind::ServiceFailed => {
                error!(service, exit_code = e.exit_code, reason, "failed");
            }
            EventKind::DependencyWaiting => {
                info!(service, dependency, "waiting for dependency");
            }
            EventKind::DependencyTimeout => {
                error!(service, dependency, timeout_ms = e.delay_ms, "dependency timeout");
            }
            EventKind::DependencyFailed => {
                error!(service, dependency, "dependency failed");
            }
            EventKind::ShutdownRequested => {
                info!(reason, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!("all services stopped within grace");
            }
            EventKind::GraceExceeded => {
                error!(stuck = reason, "grace exceeded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
