//! Runtime core: orchestration and lifecycle.
//!
//! The public API of this module is [`Supervisor`] (built through
//! [`SupervisorBuilder`] from a [`SupervisorConfig`]) and the read-only
//! [`StateTable`] it maintains.
//!
//! Internal modules:
//! - [`supervisor`]: ordered start, dependency waits, ordered stop;
//! - [`monitor`]: one task per service (spawn, probe, restart, stop);
//! - [`process`]: child process spawn and termination;
//! - [`state_table`]: per-service snapshots applied from bus events;
//! - [`shutdown`]: OS termination signals.

mod builder;
mod config;
mod monitor;
mod process;
mod shutdown;
mod state_table;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use shutdown::wait_for_shutdown_signal;
pub use state_table::StateTable;
pub use supervisor::Supervisor;
