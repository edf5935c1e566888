//! # Child process plumbing for one service.
//!
//! - [`prepare_mounts`]: `rw` host directories are created, `ro` ones must exist.
//! - [`spawn`]: expands templates and starts the program with stdin closed and
//!   stdout/stderr inherited.
//! - [`terminate`]: SIGTERM, wait up to the grace period, then SIGKILL.
//!
//! Besides the declared `env`, every service receives `STACKVISOR_SERVICE`
//! and, when it requires the secret, `STACKVISOR_JWT_SECRET` (the secret path).

use std::fs;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::services::{LaunchContext, MountMode, ServiceSpec};

pub(crate) const ENV_SERVICE: &str = "STACKVISOR_SERVICE";
pub(crate) const ENV_SECRET: &str = "STACKVISOR_JWT_SECRET";

/// Makes every mount of `spec` usable on the host.
pub(crate) fn prepare_mounts(spec: &ServiceSpec) -> Result<(), ProcessError> {
    for mount in spec.mounts() {
        match mount.mode {
            MountMode::Rw => fs::create_dir_all(&mount.host).map_err(|e| ProcessError::Mount {
                host: mount.host.clone(),
                reason: e.to_string(),
            })?,
            MountMode::Ro if !mount.host.exists() => {
                return Err(ProcessError::Mount {
                    host: mount.host.clone(),
                    reason: "read-only host path does not exist".to_owned(),
                });
            }
            MountMode::Ro => {}
        }
    }
    Ok(())
}

/// Builds the command for `spec` with every template expanded.
pub(crate) fn command(spec: &ServiceSpec, ctx: &LaunchContext) -> Result<Command, ProcessError> {
    let program = ctx.expand(spec, &spec.command().program)?;
    let args = ctx.expand_args(spec)?;

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .env(ENV_SERVICE, spec.name());

    for (key, value) in spec.env() {
        cmd.env(key, ctx.expand(spec, value)?);
    }
    if spec.requires_secret() {
        if let Some(path) = &ctx.secret_path {
            cmd.env(ENV_SECRET, path);
        }
    }
    if let Some(dir) = spec.working_dir() {
        cmd.current_dir(dir);
    }
    Ok(cmd)
}

/// Prepares mounts and starts the service process.
pub(crate) fn spawn(spec: &ServiceSpec, ctx: &LaunchContext) -> Result<Child, ProcessError> {
    prepare_mounts(spec)?;
    let mut cmd = command(spec, ctx)?;
    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.command().program.clone(),
        source,
    })?;
    debug!(service = spec.name(), pid = child.id(), "spawned");
    Ok(child)
}

/// Stops `child`: SIGTERM, up to `grace` for it to exit, then SIGKILL.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) -> Result<ExitStatus, ProcessError> {
    if let Some(status) = child.try_wait().map_err(ProcessError::Wait)? {
        return Ok(status);
    }

    if let Some(pid) = child.id() {
        if let Err(e) = send_sigterm(pid) {
            warn!(pid, error = %e, "graceful termination failed, killing");
        }
    }

    match time::timeout(grace, child.wait()).await {
        Ok(res) => res.map_err(ProcessError::Wait),
        Err(_elapsed) => {
            warn!(pid = child.id(), grace_ms = grace.as_millis() as u64, "did not exit within grace, killing");
            child.kill().await.map_err(ProcessError::Wait)?;
            child.wait().await.map_err(ProcessError::Wait)
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ProcessError::Signal {
        pid,
        reason: "pid out of range".to_owned(),
    })?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ProcessError::Signal {
            pid,
            reason: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn send_sigterm(pid: u32) -> Result<(), ProcessError> {
    Err(ProcessError::Signal {
        pid,
        reason: "graceful termination is not supported on this platform".to_owned(),
    })
}

/// Exit code plus a human-readable description (`exit status 3`, `signal 9`).
pub(crate) fn describe_exit(status: &ExitStatus) -> (Option<i32>, String) {
    if let Some(code) = status.code() {
        return (Some(code), format!("exit status {code}"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return (None, format!("killed by signal {sig}"));
        }
    }
    (None, status.to_string())
}
