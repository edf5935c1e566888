//! Pid file of a running `stackvisor up`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use stackvisor::RuntimeError;
use tracing::{debug, warn};

fn io_error(context: String, source: io::Error) -> RuntimeError {
    RuntimeError::Io { context, source }
}

/// Pid file owned by this process; removed on drop.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current pid to `path`, refusing if a live process already owns it.
    pub fn create(path: PathBuf) -> Result<Self, RuntimeError> {
        if let Some(pid) = read(&path)? {
            if is_alive(pid) {
                return Err(io_error(
                    format!("pid file {}", path.display()),
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("deployment already running as pid {pid}"),
                    ),
                ));
            }
            debug!(pid, "replacing stale pid file");
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| io_error(format!("create runtime dir {}", dir.display()), e))?;
        }
        fs::write(&path, format!("{}\n", std::process::id()))
            .map_err(|e| io_error(format!("write pid file {}", path.display()), e))?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        remove(&self.path);
    }
}

/// Removes the pid file at `path`; failures other than a missing file are logged.
pub fn remove(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove pid file"),
    }
}

/// Pid recorded in `path`, `None` if the file does not exist.
pub fn read(path: &Path) -> Result<Option<u32>, RuntimeError> {
    match fs::read_to_string(path) {
        Ok(raw) => raw.trim().parse::<u32>().map(Some).map_err(|e| {
            io_error(
                format!("pid file {}", path.display()),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(format!("read pid file {}", path.display()), e)),
    }
}

#[cfg(unix)]
fn to_pid(pid: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(pid).ok().map(nix::unistd::Pid::from_raw)
}

/// True if a process with `pid` exists.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    match to_pid(pid) {
        Some(pid) => matches!(kill(pid, None), Ok(()) | Err(Errno::EPERM)),
        None => false,
    }
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

/// Sends SIGTERM to `pid`.
#[cfg(unix)]
pub fn terminate(pid: u32) -> Result<(), RuntimeError> {
    use nix::sys::signal::{Signal, kill};

    let target = to_pid(pid).ok_or_else(|| {
        io_error(
            format!("signal pid {pid}"),
            io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"),
        )
    })?;
    kill(target, Signal::SIGTERM)
        .map_err(|e| io_error(format!("signal pid {pid}"), io::Error::from(e)))
}

#[cfg(not(unix))]
pub fn terminate(pid: u32) -> Result<(), RuntimeError> {
    Err(io_error(
        format!("signal pid {pid}"),
        io::Error::new(io::ErrorKind::Unsupported, "signals are not supported on this platform"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pid_file_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run/stackvisor.pid");
        assert_eq!(read(&path).unwrap(), None);

        let file = PidFile::create(path.clone()).unwrap();
        assert_eq!(read(&path).unwrap(), Some(std::process::id()));
        assert!(PidFile::create(path.clone()).is_err());

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn stale_pid_file_is_removed_and_missing_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stackvisor.pid");
        fs::write(&path, "999999\n").unwrap();

        remove(&path);
        assert!(!path.exists());
        remove(&path);
    }

    #[cfg(unix)]
    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }
}
