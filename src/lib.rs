//! # stackvisor
//!
//! **Stackvisor** supervises the processes of an Ethereum node stack: an
//! execution client, a consensus client and their helpers, sharing one JWT
//! secret and started in dependency order.
//!
//! It provisions the secret, resolves the dependency graph, starts each
//! service once its dependencies are healthy, probes and restarts services
//! per policy, reports aggregated readiness and tears everything down in
//! reverse order.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   stackvisor.toml ──► Descriptor ──► DependencyGraph ──► Deployment (+ Secret)
//!                                                              │
//! ┌────────────────────────────────────────────────────────────▼──────┐
//! │  Supervisor                                                       │
//! │  - start(): wait deps Healthy ─► launch monitor (in start order)  │
//! │  - stop():  cancel monitors (in shutdown order)                   │
//! │  - StateTable (snapshots, watch channel)                          │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//!  │ ServiceMon.  │  │ ServiceMon.  │  │ ServiceMon.  │        │
//!  │ (execution)  │  │ (beacon)     │  │ (validator)  │        │
//!  │ spawn/probe/ │  │ spawn/probe/ │  │ spawn/probe/ │        │
//!  │ restart/stop │  │ restart/stop │  │ restart/stop │        │
//!  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘        │
//!         ▼                 ▼                 ▼                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                              listener
//!                          ┌───────┴────────┐
//!                          ▼                ▼
//!                     StateTable      SubscriberSet ──► LogWriter, ...
//!                          │
//!                          ├──► status.json
//!                          └──► GET /health, GET /status
//! ```
//!
//! ### Service lifecycle
//! ```text
//! Pending ─► Starting ─► Running ─► Healthy ◄─► Unhealthy
//!                ▲          │          │            │
//!                └─ Restarting ◄───────┴────────────┤   (RestartPolicy permits)
//!                                                   ▼
//!                                      Stopped / Failed (policy forbids)
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Secret**        | Generate or load the shared 32-byte hex secret.           | [`ensure_secret`], [`Secret`]               |
//! | **Graph**         | Validate dependencies, derive start and shutdown order.   | [`DependencyGraph`]                         |
//! | **Services**      | Command, mounts, env, health check and policies.          | [`ServiceSpec`], [`HealthCheckSpec`]        |
//! | **Policies**      | Restart and backoff strategies.                           | [`RestartPolicy`], [`BackoffPolicy`]        |
//! | **Supervision**   | Ordered start, probing, restarts, ordered stop.           | [`Supervisor`], [`SupervisorConfig`]        |
//! | **Health**        | Debounced probes and deployment-level aggregation.        | [`DeploymentHealth`], [`aggregate`]         |
//! | **Subscriber API**| Hook into lifecycle events.                               | [`Subscribe`], [`LogWriter`]                |
//! | **Status**        | `status.json` and the `/health` endpoint.                 | [`StatusReport`]                            |
//! | **Errors**        | Typed errors with exit-code mapping.                      | [`Error`], [`RuntimeError`], [`GraphError`] |
//!
//! ## Example
//! ```rust
//! use stackvisor::{DependencyGraph, GraphError, HealthCheckSpec, RestartPolicy, ServiceSpec};
//!
//! let svc = |name: &str| {
//!     ServiceSpec::builder(name)
//!         .command("/usr/local/bin/node", ["--chain", "{network}"])
//!         .health_check(HealthCheckSpec::port(8551))
//!         .restart(RestartPolicy::Always)
//! };
//!
//! let graph = DependencyGraph::build([
//!     svc("beacon").depends_on("execution").build(),
//!     svc("execution").build(),
//! ])?;
//! assert_eq!(graph.start_order().collect::<Vec<_>>(), ["execution", "beacon"]);
//! assert_eq!(graph.shutdown_order().collect::<Vec<_>>(), ["beacon", "execution"]);
//! # Ok::<(), GraphError>(())
//! ```

mod core;
mod deployment;
mod error;
mod events;
mod graph;
mod health;
mod policies;
mod secret;
mod services;
mod subscribers;

pub mod descriptor;
pub mod status;

// ---- Public re-exports ----

pub use crate::core::{StateTable, Supervisor, SupervisorBuilder, SupervisorConfig, wait_for_shutdown_signal};
pub use deployment::{Deployment, Network};
pub use descriptor::Descriptor;
pub use error::{
    DescriptorError, EXIT_CONFIG_FAULT, EXIT_RUNTIME_FAULT, Error, GraphError, ProcessError,
    RuntimeError, SecretError,
};
pub use events::{Bus, Event, EventKind};
pub use graph::DependencyGraph;
pub use health::{DebouncedHealth, DeploymentHealth, HealthResult, HealthTracker, Prober, aggregate};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use secret::{SECRET_LEN, Secret, decode_secret, ensure_secret, remove_secret};
pub use services::{
    CommandLine, HealthCheckSpec, LaunchContext, Mount, MountMode, ServiceSnapshot, ServiceSpec,
    ServiceSpecBuilder, ServiceState,
};
pub use status::StatusReport;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
