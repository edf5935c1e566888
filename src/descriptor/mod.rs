//! # Deployment descriptor.
//!
//! A TOML file (default `stackvisor.toml`) with a `[deployment]` table, an
//! optional `[supervisor]` table and one `[[services]]` entry per service.
//! Every scalar in `[deployment]` and `[supervisor]` can be overridden with a
//! `STACKVISOR_`-prefixed environment variable, `__` separating levels:
//!
//! ```text
//! STACKVISOR_DEPLOYMENT__NETWORK=sepolia
//! STACKVISOR_SUPERVISOR__DEPENDENCY_TIMEOUT=10m
//! ```
//!
//! Relative paths (`secret_path`, `runtime_dir`, mount hosts, `working_dir`)
//! resolve against the descriptor's directory. Every service is validated
//! before anything is spawned: unknown placeholders, undeclared mounts,
//! `{secret}` without `requires_secret`, empty commands and missing read-only
//! mount paths are all [`DescriptorError::Invalid`].
//!
//! ## Example
//! ```rust
//! use std::path::Path;
//! use stackvisor::descriptor::Descriptor;
//!
//! let d = Descriptor::parse(r#"
//!     [deployment]
//!     name = "devnet"
//!     network = "holesky"
//!
//!     [[services]]
//!     name = "execution"
//!     command = ["reth", "node", "--chain", "{network}"]
//!     depends_on = []
//!     restart = "always"
//!     health_check = { kind = "port", port = 8551 }
//! "#, Path::new("/srv/devnet")).unwrap();
//!
//! assert_eq!(d.name, "devnet");
//! assert_eq!(d.secret_path, Path::new("/srv/devnet/jwt.hex"));
//! ```

pub mod duration;
mod model;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};

use crate::core::SupervisorConfig;
use crate::deployment::Network;
use crate::error::{DescriptorError, GraphError};
use crate::graph::DependencyGraph;
use crate::services::{LaunchContext, ServiceSpec};

use model::{RawDescriptor, resolve};

/// Default descriptor file name.
pub const DEFAULT_DESCRIPTOR: &str = "stackvisor.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "STACKVISOR_";

/// Status file name inside the runtime directory.
pub const STATUS_FILE: &str = "status.json";

/// Pid file name inside the runtime directory.
pub const PID_FILE: &str = "stackvisor.pid";

/// Loaded and validated deployment descriptor.
#[derive(Clone, Debug)]
pub struct Descriptor {
    /// Deployment name.
    pub name: String,
    /// Network substituted for `{network}`.
    pub network: Network,
    /// Absolute or descriptor-relative-resolved secret file path.
    pub secret_path: PathBuf,
    /// Directory for the pid and status files.
    pub runtime_dir: PathBuf,
    /// Address of the HTTP status endpoint, if enabled.
    pub status_addr: Option<SocketAddr>,
    /// Runtime timings.
    pub supervisor: SupervisorConfig,
    /// Services in declaration order.
    pub services: Vec<ServiceSpec>,
}

impl Descriptor {
    /// Loads `path`, merged with `STACKVISOR_*` environment overrides.
    ///
    /// # Errors
    /// [`DescriptorError::FileNotFound`], [`DescriptorError::Figment`] for syntax
    /// and type errors, [`DescriptorError::Invalid`] for semantic errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DescriptorError::FileNotFound(path.to_path_buf()));
        }

        let figment = Figment::new().merge(Toml::file(path)).merge(
            Env::prefixed(ENV_PREFIX).split("__").filter(|key| {
                let key = key.as_str().to_ascii_lowercase();
                key.starts_with("deployment.") || key.starts_with("supervisor.")
            }),
        );

        Self::from_figment(figment, base_dir(path))
    }

    /// Parses descriptor text without environment overrides.
    pub fn parse(content: &str, base: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        Self::from_figment(
            Figment::new().merge(Toml::string(content)),
            base.as_ref().to_path_buf(),
        )
    }

    fn from_figment(figment: Figment, base: PathBuf) -> Result<Self, DescriptorError> {
        let raw: RawDescriptor = figment.extract()?;

        let name = raw.deployment.name.trim().to_owned();
        if name.is_empty() {
            return Err(DescriptorError::Invalid {
                service: "deployment".to_owned(),
                reason: "deployment name is empty".to_owned(),
            });
        }

        let secret_path = resolve(&base, raw.deployment.secret_path);
        let ctx = LaunchContext {
            network: raw.deployment.network,
            secret_path: Some(secret_path.clone()),
        };

        let backoff = raw.supervisor.backoff;
        let services = raw
            .services
            .into_iter()
            .map(|entry| entry.into_spec(&base, backoff, &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            network: raw.deployment.network,
            secret_path,
            runtime_dir: resolve(&base, raw.deployment.runtime_dir),
            status_addr: raw.deployment.status_addr,
            supervisor: raw.supervisor,
            services,
        })
    }

    /// Builds the dependency graph over the declared services.
    pub fn graph(&self) -> Result<DependencyGraph, GraphError> {
        DependencyGraph::build(self.services.iter().cloned())
    }

    /// True if any service receives the shared secret.
    pub fn needs_secret(&self) -> bool {
        self.services.iter().any(ServiceSpec::requires_secret)
    }

    /// `<runtime_dir>/status.json`
    pub fn status_file(&self) -> PathBuf {
        self.runtime_dir.join(STATUS_FILE)
    }

    /// `<runtime_dir>/stackvisor.pid`
    pub fn pid_file(&self) -> PathBuf {
        self.runtime_dir.join(PID_FILE)
    }
}

fn base_dir(path: &Path) -> PathBuf {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::path::absolute(parent).unwrap_or_else(|_| parent.to_path_buf())
}
