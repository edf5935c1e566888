//! # Deployment: the unit the supervisor drives.
//!
//! A [`Deployment`] bundles the resolved [`DependencyGraph`], the explicit
//! [`Network`] selection and the provisioned [`Secret`]. It is immutable once
//! built and shared read-only with every monitor.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::secret::Secret;
use crate::services::LaunchContext;

/// Ethereum network the stack runs against.
///
/// Substituted into commands through the `{network}` placeholder, so switching
/// networks is a descriptor field (or `STACKVISOR_DEPLOYMENT__NETWORK`) rather
/// than an edit of every command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Sepolia,
    Holesky,
    Hoodi,
}

impl Network {
    /// Lowercase name as understood by the execution and consensus clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Holesky => "holesky",
            Network::Hoodi => "hoodi",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "sepolia" => Ok(Network::Sepolia),
            "holesky" => Ok(Network::Holesky),
            "hoodi" => Ok(Network::Hoodi),
            other => Err(format!("unknown network '{other}'")),
        }
    }
}

/// Everything the supervisor needs to run one stack.
#[derive(Clone, Debug)]
pub struct Deployment {
    name: String,
    network: Network,
    graph: Arc<DependencyGraph>,
    secret: Option<Secret>,
}

impl Deployment {
    /// Creates a deployment without a secret.
    pub fn new(name: impl Into<String>, network: Network, graph: DependencyGraph) -> Self {
        Self {
            name: name.into(),
            network,
            graph: Arc::new(graph),
            secret: None,
        }
    }

    /// Attaches the provisioned secret.
    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Shared handle to the dependency graph.
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    pub fn secret(&self) -> Option<&Secret> {
        self.secret.as_ref()
    }

    /// Template context handed to monitors.
    pub fn launch_context(&self) -> LaunchContext {
        LaunchContext {
            network: self.network,
            secret_path: self.secret.as_ref().map(|s| s.path().to_path_buf()),
        }
    }
}
