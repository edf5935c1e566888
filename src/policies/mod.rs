//! Restart and backoff policies.
//!
//! ## Contents
//! - [`RestartPolicy`] whether a terminated service is started again (never / on-failure / always)
//! - [`BackoffPolicy`] how long to wait before the next start (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization of that wait
//!
//! ## Wiring
//! ```text
//! ServiceSpec { restart: RestartPolicy, backoff: BackoffPolicy, .. }
//!      └─► core::monitor::ServiceMonitor uses:
//!           - restart.permits_restart(clean) to choose Restarting vs Stopped/Failed
//!           - backoff.next(consecutive_restarts) for the Restarting delay
//! ```

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
