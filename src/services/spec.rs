//! # Static description of one managed service.
//!
//! A [`ServiceSpec`] is created once from the deployment descriptor (or with
//! [`ServiceSpec::builder`] in code) and never changes for the lifetime of the
//! deployment. The dependency graph and every monitor share it through `Arc`.
//!
//! ## Example
//! ```rust
//! use stackvisor::{HealthCheckSpec, Mount, RestartPolicy, ServiceSpec};
//!
//! let beacon = ServiceSpec::builder("beacon")
//!     .command("lighthouse", ["bn", "--network", "{network}", "--execution-jwt", "{secret}"])
//!     .depends_on("execution")
//!     .health_check(HealthCheckSpec::http("http://127.0.0.1:5052/eth/v1/node/health"))
//!     .restart(RestartPolicy::Always)
//!     .mount(Mount::read_write("data/lighthouse", "/data"))
//!     .requires_secret(true)
//!     .build();
//!
//! assert_eq!(beacon.name(), "beacon");
//! assert_eq!(beacon.depends_on(), ["execution".to_string()]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::services::health_check::HealthCheckSpec;

/// Executable plus arguments. Arguments may contain placeholders, see
/// [`crate::services::LaunchContext`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    /// Program to execute (looked up on `PATH` when not a path).
    pub program: String,
    /// Argument templates.
    pub args: Vec<String>,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Access mode of a mount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    /// Host path must already exist.
    Ro,
    /// Host directory is created if missing.
    #[default]
    Rw,
}

/// Host path exposed to a service under a logical container path.
///
/// Services run as plain processes, so the container path is a name that
/// `{mount:<container>}` placeholders resolve to the host path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mount {
    /// Path on the host.
    pub host: PathBuf,
    /// Logical path inside the service, e.g. `/data`.
    pub container: String,
    /// Access mode.
    pub mode: MountMode,
}

impl Mount {
    /// Read-only mount.
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: MountMode::Ro,
        }
    }

    /// Read-write mount.
    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: MountMode::Rw,
        }
    }
}

/// Static specification of one service.
#[derive(Clone, Debug)]
pub struct ServiceSpec {
    name: String,
    command: CommandLine,
    depends_on: Vec<String>,
    health_check: HealthCheckSpec,
    restart: RestartPolicy,
    backoff: BackoffPolicy,
    mounts: Vec<Mount>,
    env: BTreeMap<String, String>,
    requires_secret: bool,
    working_dir: Option<PathBuf>,
}

impl ServiceSpec {
    /// Starts a builder for a service called `name`.
    pub fn builder(name: impl Into<String>) -> ServiceSpecBuilder {
        ServiceSpecBuilder::new(name)
    }

    /// Unique service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program and argument templates.
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Direct dependencies, in declaration order, without duplicates.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Health-check contract.
    pub fn health_check(&self) -> &HealthCheckSpec {
        &self.health_check
    }

    /// Restart policy.
    pub fn restart(&self) -> RestartPolicy {
        self.restart
    }

    /// Restart backoff.
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Mounts, in declaration order.
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Environment templates.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Whether the shared secret is handed to this service.
    pub fn requires_secret(&self) -> bool {
        self.requires_secret
    }

    /// Working directory of the process, if set.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Finds the mount declared for `container`.
    pub fn mount_for(&self, container: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.container == container)
    }
}

/// Fluent builder for [`ServiceSpec`].
#[derive(Clone, Debug)]
pub struct ServiceSpecBuilder {
    spec: ServiceSpec,
}

impl ServiceSpecBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            spec: ServiceSpec {
                name: name.into(),
                command: CommandLine {
                    program: String::new(),
                    args: Vec::new(),
                },
                depends_on: Vec::new(),
                health_check: HealthCheckSpec::None,
                restart: RestartPolicy::default(),
                backoff: BackoffPolicy::default(),
                mounts: Vec::new(),
                env: BTreeMap::new(),
                requires_secret: false,
                working_dir: None,
            },
        }
    }

    pub fn command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.command = CommandLine {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Adds one dependency; repeated names are ignored.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.spec.depends_on.contains(&name) {
            self.spec.depends_on.push(name);
        }
        self
    }

    pub fn health_check(mut self, check: HealthCheckSpec) -> Self {
        self.spec.health_check = check;
        self
    }

    pub fn restart(mut self, restart: RestartPolicy) -> Self {
        self.spec.restart = restart;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.spec.backoff = backoff;
        self
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.spec.mounts.push(mount);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.env.insert(key.into(), value.into());
        self
    }

    pub fn requires_secret(mut self, yes: bool) -> Self {
        self.spec.requires_secret = yes;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.working_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> ServiceSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_dependencies_collapse() {
        let spec = ServiceSpec::builder("metrics")
            .command("exporter", Vec::<String>::new())
            .depends_on("execution")
            .depends_on("beacon")
            .depends_on("execution")
            .build();
        assert_eq!(spec.depends_on(), ["execution", "beacon"]);
    }

    #[test]
    fn mount_lookup_by_container_path() {
        let spec = ServiceSpec::builder("execution")
            .command("reth", ["node"])
            .mount(Mount::read_write("/srv/reth", "/data"))
            .mount(Mount::read_only("/etc/reth", "/config"))
            .build();
        assert_eq!(
            spec.mount_for("/config").map(|m| m.mode),
            Some(MountMode::Ro)
        );
        assert!(spec.mount_for("/missing").is_none());
        assert_eq!(spec.command().to_string(), "reth node");
    }
}
