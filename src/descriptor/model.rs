//! Raw descriptor sections as they appear in TOML, and their validation into
//! domain types.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::SupervisorConfig;
use crate::deployment::Network;
use crate::error::DescriptorError;
use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::services::{HealthCheckSpec, LaunchContext, Mount, MountMode, ServiceSpec};

/// Whole descriptor file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDescriptor {
    pub deployment: DeploymentSection,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    pub services: Vec<ServiceEntry>,
}

/// `[deployment]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DeploymentSection {
    pub name: String,
    #[serde(default)]
    pub network: Network,
    #[serde(default = "default_secret_path")]
    pub secret_path: PathBuf,
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
    #[serde(default)]
    pub status_addr: Option<SocketAddr>,
}

fn default_secret_path() -> PathBuf {
    PathBuf::from("jwt.hex")
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from(".stackvisor")
}

/// One `[[services]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServiceEntry {
    pub name: String,
    pub command: Vec<String>,
    pub depends_on: Vec<String>,
    pub restart: RestartPolicy,
    pub health_check: HealthCheckSpec,
    #[serde(default)]
    pub backoff: Option<BackoffPolicy>,
    #[serde(default)]
    pub mounts: Vec<MountEntry>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub requires_secret: bool,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MountEntry {
    pub host: PathBuf,
    pub container: String,
    #[serde(default)]
    pub mode: MountMode,
}

impl ServiceEntry {
    /// Turns the entry into a [`ServiceSpec`], resolving relative paths against
    /// `base` and checking every template against `ctx`.
    pub(crate) fn into_spec(
        self,
        base: &Path,
        default_backoff: BackoffPolicy,
        ctx: &LaunchContext,
    ) -> Result<ServiceSpec, DescriptorError> {
        let name = self.name.trim().to_owned();
        let invalid = |reason: String| DescriptorError::Invalid {
            service: if name.is_empty() { "<unnamed>".to_owned() } else { name.clone() },
            reason,
        };

        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(invalid(format!("invalid service name '{}'", self.name)));
        }

        let mut command = self.command.into_iter();
        let program = match command.next() {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(invalid("command is empty".to_owned())),
        };

        check_health_check(&self.health_check).map_err(invalid)?;

        let mut builder = ServiceSpec::builder(&name)
            .command(program, command)
            .health_check(self.health_check)
            .restart(self.restart)
            .backoff(self.backoff.unwrap_or(default_backoff))
            .requires_secret(self.requires_secret);

        for dep in self.depends_on {
            builder = builder.depends_on(dep);
        }

        let mut containers = HashSet::new();
        for m in self.mounts {
            if m.container.is_empty() {
                return Err(invalid("mount container path is empty".to_owned()));
            }
            if !containers.insert(m.container.clone()) {
                return Err(invalid(format!("mount '{}' declared twice", m.container)));
            }
            let host = resolve(base, m.host);
            if m.mode == MountMode::Ro && !host.exists() {
                return Err(invalid(format!(
                    "read-only mount host path {} does not exist",
                    host.display()
                )));
            }
            builder = builder.mount(Mount {
                host,
                container: m.container,
                mode: m.mode,
            });
        }

        for (key, value) in self.env {
            builder = builder.env(key, value);
        }
        if let Some(dir) = self.working_dir {
            builder = builder.working_dir(resolve(base, dir));
        }

        let spec = builder.build();

        ctx.expand(&spec, &spec.command().program)
            .and_then(|_| ctx.expand_args(&spec))
            .map_err(|e| invalid(e.to_string()))?;
        for value in spec.env().values() {
            ctx.expand(&spec, value).map_err(|e| invalid(e.to_string()))?;
        }

        Ok(spec)
    }
}

fn check_health_check(check: &HealthCheckSpec) -> Result<(), String> {
    match check {
        HealthCheckSpec::Http { endpoint, .. } => reqwest::Url::parse(endpoint)
            .map(|_| ())
            .map_err(|e| format!("health check endpoint '{endpoint}': {e}")),
        HealthCheckSpec::Port { port: 0, .. } => Err("health check port must not be 0".to_owned()),
        HealthCheckSpec::Command { program, .. } if program.trim().is_empty() => {
            Err("health check command is empty".to_owned())
        }
        _ => Ok(()),
    }
}

/// Joins `path` onto `base` unless it is already absolute.
pub(crate) fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() { path } else { base.join(path) }
}
