//! Implementation of the `stackvisor status` command.

use std::io;
use std::path::Path;
use std::process::ExitCode;

use stackvisor::status::read_report;
use stackvisor::{DeploymentHealth, Descriptor, EXIT_RUNTIME_FAULT, Error, RuntimeError};

use super::pid;

/// Prints the last status report; exits `1` when it is missing or the deployment is unhealthy.
pub fn run(config: &Path, json: bool) -> Result<ExitCode, Error> {
    let descriptor = Descriptor::load(config)?;
    let path = descriptor.status_file();

    let report = match read_report(&path) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("no status available at {}: {e}", path.display());
            return Ok(ExitCode::from(EXIT_RUNTIME_FAULT));
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| RuntimeError::Io {
            context: "encode status".to_owned(),
            source: io::Error::other(e),
        })?;
        println!("{out}");
    } else {
        print!("{}", report.render_table());
        let running = pid::read(&descriptor.pid_file())?.is_some_and(pid::is_alive);
        if !running {
            println!("(supervisor is not running; report may be stale)");
        }
    }

    if report.health == DeploymentHealth::Unhealthy {
        Ok(ExitCode::from(EXIT_RUNTIME_FAULT))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
