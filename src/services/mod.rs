//! # Service definitions.
//!
//! - [`ServiceSpec`] static description of one service (command, deps, health, policies, mounts)
//! - [`HealthCheckSpec`] tagged health-check contract (`http` / `port` / `command` / `none`)
//! - [`ServiceState`] lifecycle state machine, [`ServiceSnapshot`] read-only runtime record
//! - [`LaunchContext`] placeholder expansion for arguments and environment

mod health_check;
mod launch;
mod spec;
mod state;

pub use health_check::HealthCheckSpec;
pub use launch::LaunchContext;
pub use spec::{CommandLine, Mount, MountMode, ServiceSpec, ServiceSpecBuilder};
pub use state::{ServiceSnapshot, ServiceState};
