//! # Status reporting.
//!
//! - [`StatusReport`]: aggregated health plus per-service snapshots
//! - [`write_report`] / [`read_report`] / [`spawn_status_writer`]: `status.json` in the runtime directory
//! - [`http`]: optional `/health` and `/status` endpoint (axum)

mod file;
pub mod http;
mod report;

pub use file::{read_report, spawn_status_writer, write_report};
pub use report::StatusReport;
