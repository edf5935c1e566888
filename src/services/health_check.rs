//! Health-check contract attached to each service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How readiness of a service is established.
///
/// Timing (interval, per-probe timeout, debounce) is owned by the supervisor
/// configuration; the variants only describe *what* to probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthCheckSpec {
    /// `GET endpoint` must answer with `expected_status`.
    Http {
        /// Full URL, e.g. `http://127.0.0.1:8545`.
        endpoint: String,
        /// Status code that counts as healthy.
        #[serde(default = "default_expected_status")]
        expected_status: u16,
    },
    /// A TCP connection to `host:port` must succeed.
    Port {
        /// Host to connect to.
        #[serde(default = "default_host")]
        host: String,
        /// TCP port.
        port: u16,
    },
    /// The program must exit with status zero.
    Command {
        /// Executable.
        program: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
    },
    /// No probe: the service counts as healthy once its process is running.
    None,
}

fn default_expected_status() -> u16 {
    200
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

impl HealthCheckSpec {
    /// TCP port probe against localhost.
    pub fn port(port: u16) -> Self {
        HealthCheckSpec::Port {
            host: default_host(),
            port,
        }
    }

    /// HTTP probe expecting `200`.
    pub fn http(endpoint: impl Into<String>) -> Self {
        HealthCheckSpec::Http {
            endpoint: endpoint.into(),
            expected_status: default_expected_status(),
        }
    }

    /// Command probe.
    pub fn command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HealthCheckSpec::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for HealthCheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCheckSpec::Http {
                endpoint,
                expected_status,
            } => write!(f, "http {endpoint} -> {expected_status}"),
            HealthCheckSpec::Port { host, port } => write!(f, "tcp {host}:{port}"),
            HealthCheckSpec::Command { program, args } => {
                write!(f, "exec {program}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                Ok(())
            }
            HealthCheckSpec::None => f.write_str("none"),
        }
    }
}
