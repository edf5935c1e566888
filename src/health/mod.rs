//! # Health probing and aggregation.
//!
//! - [`Prober`] runs one check of a [`HealthCheckSpec`](crate::HealthCheckSpec) with its own timeout
//! - [`HealthTracker`] debounces probe results per service
//! - [`aggregate`] folds service snapshots into a [`DeploymentHealth`]
//!
//! Probing is driven by each service's monitor on `probe_interval`; the tracker
//! decides when the monitor publishes `ServiceHealthy` / `ServiceUnhealthy`.

mod aggregate;
mod debounce;
mod probe;

pub use aggregate::{DeploymentHealth, aggregate};
pub use debounce::{DebouncedHealth, HealthTracker};
pub use probe::Prober;

/// Outcome of a single probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthResult {
    Healthy,
    Unhealthy,
    /// The probe itself could not run; neither success nor failure.
    Unknown,
}
