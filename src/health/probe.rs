//! # One-shot health probes.
//!
//! [`Prober::probe`] runs a single check for a [`HealthCheckSpec`], bounded by
//! its own timeout and by cancellation.
//!
//! | Check     | Healthy when                       | Unknown when            |
//! |-----------|------------------------------------|-------------------------|
//! | `http`    | `GET` answers `expected_status`    | never                   |
//! | `port`    | TCP connect succeeds               | never                   |
//! | `command` | program exits with status 0        | program cannot spawn    |
//! | `none`    | always                             | never                   |
//!
//! Everything else (refused connection, timeout, other status, non-zero exit)
//! is `Unhealthy`. `https://` endpoints are verified with rustls against the
//! bundled web PKI roots; a self-signed endpoint probes `Unhealthy`.

use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, trace};

use crate::services::HealthCheckSpec;

use super::HealthResult;

/// Runs probes; holds the shared HTTP client.
#[derive(Clone, Debug)]
pub struct Prober {
    http: reqwest::Client,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Runs one probe bounded by `timeout`.
    pub async fn probe(&self, check: &HealthCheckSpec, timeout: Duration) -> HealthResult {
        let result = match check {
            HealthCheckSpec::Http {
                endpoint,
                expected_status,
            } => self.http(endpoint, *expected_status, timeout).await,
            HealthCheckSpec::Port { host, port } => tcp(host, *port, timeout).await,
            HealthCheckSpec::Command { program, args } => command(program, args, timeout).await,
            HealthCheckSpec::None => HealthResult::Healthy,
        };
        trace!(check = %check, ?result, "probe finished");
        result
    }

    async fn http(&self, endpoint: &str, expected: u16, timeout: Duration) -> HealthResult {
        match self.http.get(endpoint).timeout(timeout).send().await {
            Ok(resp) if resp.status().as_u16() == expected => HealthResult::Healthy,
            Ok(resp) => {
                debug!(endpoint, status = resp.status().as_u16(), expected, "unexpected status");
                HealthResult::Unhealthy
            }
            Err(e) => {
                debug!(endpoint, error = %e, "http probe failed");
                HealthResult::Unhealthy
            }
        }
    }
}

async fn tcp(host: &str, port: u16, timeout: Duration) -> HealthResult {
    match time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => HealthResult::Healthy,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "tcp probe failed");
            HealthResult::Unhealthy
        }
        Err(_elapsed) => HealthResult::Unhealthy,
    }
}

async fn command(program: &str, args: &[String], timeout: Duration) -> HealthResult {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(c) => c,
        Err(e) => {
            debug!(program, error = %e, "probe command could not start");
            return HealthResult::Unknown;
        }
    };

    match time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => HealthResult::Healthy,
        Ok(Ok(status)) => {
            debug!(program, code = status.code(), "probe command failed");
            HealthResult::Unhealthy
        }
        Ok(Err(e)) => {
            debug!(program, error = %e, "probe command wait failed");
            HealthResult::Unknown
        }
        Err(_elapsed) => {
            let _ = child.kill().await;
            HealthResult::Unhealthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const T: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn port_probe_follows_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = Prober::new();

        assert_eq!(prober.probe(&HealthCheckSpec::port(port), T).await, HealthResult::Healthy);
        drop(listener);
        assert_eq!(prober.probe(&HealthCheckSpec::port(port), T).await, HealthResult::Unhealthy);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_probe_maps_exit_status() {
        let prober = Prober::new();
        let ok = HealthCheckSpec::command("/bin/sh", ["-c", "exit 0"]);
        let bad = HealthCheckSpec::command("/bin/sh", ["-c", "exit 3"]);
        let slow = HealthCheckSpec::command("/bin/sh", ["-c", "sleep 5"]);
        let missing = HealthCheckSpec::command("/nonexistent/probe", Vec::<String>::new());

        assert_eq!(prober.probe(&ok, T).await, HealthResult::Healthy);
        assert_eq!(prober.probe(&bad, T).await, HealthResult::Unhealthy);
        assert_eq!(
            prober.probe(&slow, Duration::from_millis(100)).await,
            HealthResult::Unhealthy
        );
        assert_eq!(prober.probe(&missing, T).await, HealthResult::Unknown);
    }

    #[tokio::test]
    async fn http_probe_against_unreachable_endpoint_is_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let check = HealthCheckSpec::http(format!("http://127.0.0.1:{port}/health"));
        assert_eq!(Prober::new().probe(&check, T).await, HealthResult::Unhealthy);
    }

    async fn serve_statuses() -> String {
        use axum::Router;
        use axum::http::StatusCode;
        use axum::routing::get;

        let app = Router::new()
            .route("/ok", get(|| async { StatusCode::OK }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await });
        base
    }

    #[tokio::test]
    async fn http_probe_compares_status_with_expected() {
        let base = serve_statuses().await;
        let prober = Prober::new();
        let check = |path: &str, expected_status: u16| HealthCheckSpec::Http {
            endpoint: format!("{base}{path}"),
            expected_status,
        };

        assert_eq!(prober.probe(&check("/ok", 200), T).await, HealthResult::Healthy);
        assert_eq!(prober.probe(&check("/broken", 200), T).await, HealthResult::Unhealthy);
        assert_eq!(prober.probe(&check("/broken", 500), T).await, HealthResult::Healthy);
        assert_eq!(prober.probe(&check("/ok", 503), T).await, HealthResult::Unhealthy);
    }

    #[tokio::test]
    async fn https_probe_against_plain_http_listener_is_unhealthy() {
        let base = serve_statuses().await;
        let check = HealthCheckSpec::http(format!("{}/ok", base.replacen("http://", "https://", 1)));
        assert_eq!(Prober::new().probe(&check, T).await, HealthResult::Unhealthy);
    }

    #[tokio::test]
    async fn none_is_always_healthy() {
        assert_eq!(
            Prober::new().probe(&HealthCheckSpec::None, T).await,
            HealthResult::Healthy
        );
    }
}
