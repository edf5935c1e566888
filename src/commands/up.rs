//! Implementation of the `stackvisor up` command.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use stackvisor::status::{http, spawn_status_writer};
use stackvisor::{Deployment, Descriptor, Error, LogWriter, Supervisor, ensure_secret};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::pid::PidFile;

/// Brings the deployment up and supervises it until a termination signal.
///
/// Every configuration fault (descriptor, graph, malformed secret) is reported
/// before any process is spawned.
pub async fn run(config: &Path) -> Result<ExitCode, Error> {
    let descriptor = Descriptor::load(config)?;
    let graph = descriptor.graph()?;
    let secret = ensure_secret(&descriptor.secret_path)?;
    let deployment =
        Deployment::new(descriptor.name.clone(), descriptor.network, graph).with_secret(secret);

    let _pid_file = PidFile::create(descriptor.pid_file())?;

    let sup = Supervisor::builder(descriptor.supervisor.clone())
        .with_subscribers(vec![Arc::new(LogWriter::new())])
        .build(deployment);

    let aux = CancellationToken::new();
    let writer = spawn_status_writer(Arc::clone(&sup), descriptor.status_file(), aux.clone());
    let server = descriptor.status_addr.map(|addr| {
        info!(address = %addr, "serving status endpoint");
        tokio::spawn(http::serve(addr, Arc::clone(&sup), aux.clone()))
    });

    let result = sup.run().await;

    aux.cancel();
    if let Err(e) = writer.await {
        warn!(error = %e, "status writer ended abnormally");
    }
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "status endpoint failed"),
            Err(e) => warn!(error = %e, "status endpoint ended abnormally"),
        }
    }

    result?;
    info!(deployment = %descriptor.name, "deployment down");
    Ok(ExitCode::SUCCESS)
}
