//! Implementation of the `stackvisor down` command.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use stackvisor::{Descriptor, Error, RuntimeError, remove_secret};
use tokio::time::{self, Instant};
use tracing::info;

use super::pid;

/// Slack on top of the supervisor's grace before giving up on the deployment.
const DOWN_SLACK: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Sends SIGTERM to the running supervisor and waits for it to exit.
pub async fn run(config: &Path, purge_secret: bool) -> Result<ExitCode, Error> {
    let descriptor = Descriptor::load(config)?;
    let pid_file = descriptor.pid_file();

    match pid::read(&pid_file)? {
        None => info!(deployment = %descriptor.name, "deployment is not running"),
        Some(pid) if !pid::is_alive(pid) => {
            info!(pid, "removing stale pid file");
            pid::remove(&pid_file);
        }
        Some(pid) => {
            let limit = descriptor.supervisor.grace + DOWN_SLACK;
            info!(pid, deployment = %descriptor.name, "stopping deployment");
            pid::terminate(pid)?;

            let deadline = Instant::now() + limit;
            while pid::is_alive(pid) {
                if Instant::now() >= deadline {
                    return Err(RuntimeError::GraceExceeded {
                        grace: limit,
                        stuck: vec![descriptor.name.clone()],
                    }
                    .into());
                }
                time::sleep(POLL_INTERVAL).await;
            }
            info!(deployment = %descriptor.name, "deployment stopped");
        }
    }

    if purge_secret {
        remove_secret(&descriptor.secret_path)?;
    }
    Ok(ExitCode::SUCCESS)
}
