//! Subcommand implementations.
//!
//! Each command returns the process exit code on success; errors are mapped to
//! exit codes by `main` through [`stackvisor::Error::exit_code`].

pub mod check;
pub mod down;
pub mod pid;
pub mod status;
pub mod up;
