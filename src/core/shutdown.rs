//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives one of:
//! - `SIGINT` (Ctrl-C), `SIGTERM` (`stackvisor down`, systemd), `SIGQUIT` on Unix;
//! - Ctrl-C elsewhere.
//!
//! It returns the signal name for logging.

/// Waits for a termination signal; `Err` if the handlers cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for Ctrl-C; `Err` if the handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
