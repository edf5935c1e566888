//! # Lifecycle events emitted by monitors and the supervisor.
//!
//! [`EventKind`] has three groups:
//! - **Service transitions**: one kind per target [`ServiceState`], published by the
//!   service's monitor (or by the supervisor for services that never got one).
//! - **Coordination**: dependency waits, timeouts and failure propagation.
//! - **Shutdown**: signal observed, teardown finished within or past the grace period.
//!
//! ## Ordering guarantees
//! Each event has a process-wide unique sequence number (`seq`) that increases
//! monotonically. The state table drops any event older than the last one it
//! applied for the same service.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stackvisor::{Event, EventKind, ServiceState};
//!
//! let ev = Event::new(EventKind::ServiceRestarting)
//!     .with_service("beacon")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(4))
//!     .with_reason("exit status 1");
//!
//! assert_eq!(ev.kind.target_state(), Some(ServiceState::Restarting));
//! assert_eq!(ev.service.as_deref(), Some("beacon"));
//! assert_eq!(ev.delay_ms, Some(4000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::services::ServiceState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Service transitions ===
    /// Process is being spawned.
    ///
    /// Sets: `service`, `attempt` (1-based start count).
    ServiceStarting,

    /// Process spawned.
    ///
    /// Sets: `service`, `pid`, `attempt`.
    ServiceRunning,

    /// Health check passes (first success, or recovery from unhealthy).
    ///
    /// Sets: `service`.
    ServiceHealthy,

    /// Health check failed past the debounce threshold.
    ///
    /// Sets: `service`, `attempt` (consecutive failures).
    ServiceUnhealthy,

    /// Process ended (or was killed) and a restart is scheduled.
    ///
    /// Sets: `service`, `attempt` (restart number), `delay_ms`, `exit_code`, `reason`.
    ServiceRestarting,

    /// Termination requested.
    ///
    /// Sets: `service`.
    ServiceStopping,

    /// Process gone for good (clean exit or teardown).
    ///
    /// Sets: `service`, optional `exit_code`.
    ServiceStopped,

    /// Process ended with an error and the policy forbids a restart, or spawn failed.
    ///
    /// Sets: `service`, `reason`, optional `exit_code`.
    ServiceFailed,

    // === Coordination ===
    /// A service is waiting for a dependency to become healthy.
    ///
    /// Sets: `service`, `dependency`.
    DependencyWaiting,

    /// A dependency did not become healthy in time.
    ///
    /// Sets: `service`, `dependency`, `delay_ms` (the timeout).
    DependencyTimeout,

    /// A dependency failed; dependents waiting for it cannot start.
    ///
    /// Sets: `service` (the dependent), `dependency` (the failed service).
    DependencyFailed,

    // === Shutdown ===
    /// Shutdown requested (OS signal or explicit stop).
    ShutdownRequested,

    /// Every monitor finished within the grace period.
    AllStoppedWithin,

    /// Some monitors did not finish in time.
    ///
    /// Sets: `reason` (comma-separated stuck services).
    GraceExceeded,
}

impl EventKind {
    /// Service state this event moves its service into, if it is a transition.
    pub fn target_state(self) -> Option<ServiceState> {
        match self {
            EventKind::ServiceStarting => Some(ServiceState::Starting),
            EventKind::ServiceRunning => Some(ServiceState::Running),
            EventKind::ServiceHealthy => Some(ServiceState::Healthy),
            EventKind::ServiceUnhealthy => Some(ServiceState::Unhealthy),
            EventKind::ServiceRestarting => Some(ServiceState::Restarting),
            EventKind::ServiceStopping => Some(ServiceState::Stopping),
            EventKind::ServiceStopped => Some(ServiceState::Stopped),
            EventKind::ServiceFailed => Some(ServiceState::Failed),
            _ => None,
        }
    }

    /// Transition kind for a target state (`Pending` has none).
    pub fn for_state(state: ServiceState) -> Option<Self> {
        match state {
            ServiceState::Pending => None,
            ServiceState::Starting => Some(EventKind::ServiceStarting),
            ServiceState::Running => Some(EventKind::ServiceRunning),
            ServiceState::Healthy => Some(EventKind::ServiceHealthy),
            ServiceState::Unhealthy => Some(EventKind::ServiceUnhealthy),
            ServiceState::Restarting => Some(EventKind::ServiceRestarting),
            ServiceState::Stopping => Some(EventKind::ServiceStopping),
            ServiceState::Stopped => Some(EventKind::ServiceStopped),
            ServiceState::Failed => Some(EventKind::ServiceFailed),
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Service the event is about.
    pub service: Option<Arc<str>>,
    /// Dependency involved (coordination events).
    pub dependency: Option<Arc<str>>,
    /// Start, restart or failure count, depending on the kind.
    pub attempt: Option<u32>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Exit code of the process that just ended.
    pub exit_code: Option<i32>,
    /// Pid of the spawned process.
    pub pid: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            dependency: None,
            attempt: None,
            delay_ms: None,
            exit_code: None,
            pid: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    #[inline]
    pub fn with_dependency(mut self, dependency: impl Into<Arc<str>>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Delay as a [`Duration`], if set.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }

    /// Shorthand for a service transition event.
    pub fn transition(service: &str, state: ServiceState) -> Option<Self> {
        EventKind::for_state(state).map(|k| Event::new(k).with_service(service))
    }
}
