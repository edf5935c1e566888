//! `status.json` in the runtime directory.
//!
//! The file is rewritten after every state change (coalesced through the
//! supervisor's watch channel) via a temporary file and a rename, so readers
//! never observe a partial report.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::Supervisor;

use super::StatusReport;

/// Writes `report` to `path` atomically.
pub fn write_report(path: &Path, report: &StatusReport) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec_pretty(report).map_err(io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

/// Reads a report written by [`write_report`].
pub fn read_report(path: &Path) -> io::Result<StatusReport> {
    let raw = fs::read(path)?;
    serde_json::from_slice(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Keeps `path` in sync with the supervisor until `token` is cancelled,
/// then writes one final report.
pub fn spawn_status_writer(
    sup: Arc<Supervisor>,
    path: PathBuf,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changed = sup.watch();
        loop {
            persist(&sup, &path).await;
            select! {
                _ = token.cancelled() => break,
                res = changed.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        persist(&sup, &path).await;
    })
}

async fn persist(sup: &Supervisor, path: &Path) {
    let report = sup.report().await;
    match write_report(path, &report) {
        Ok(()) => debug!(path = %path.display(), health = %report.health, "status written"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to write status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{Deployment, Network};
    use crate::graph::DependencyGraph;
    use crate::services::{ServiceSnapshot, ServiceSpec};
    use tempfile::TempDir;

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run/status.json");
        let graph = DependencyGraph::build([ServiceSpec::builder("execution")
            .command("reth", Vec::<String>::new())
            .build()])
        .unwrap();
        let report = StatusReport::new(
            &Deployment::new("eth-node", Network::Mainnet, graph),
            vec![ServiceSnapshot::pending("execution")],
        );

        write_report(&path, &report).unwrap();
        assert_eq!(read_report(&path).unwrap(), report);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn garbage_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        fs::write(&path, "not json").unwrap();
        let err = read_report(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
