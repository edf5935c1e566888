use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deployment::{Deployment, Network};
use crate::health::{DeploymentHealth, aggregate};
use crate::services::{ServiceSnapshot, ServiceState};

/// Point-in-time view of a deployment, as written to `status.json` and served at `/status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub deployment: String,
    pub network: Network,
    pub health: DeploymentHealth,
    pub generated_at: DateTime<Utc>,
    /// Snapshots in start order.
    pub services: Vec<ServiceSnapshot>,
}

impl StatusReport {
    /// Builds a report and aggregates deployment health from `services`.
    pub fn new(deployment: &Deployment, services: Vec<ServiceSnapshot>) -> Self {
        let health = aggregate(&services, deployment.graph());
        Self {
            deployment: deployment.name().to_owned(),
            network: deployment.network(),
            health,
            generated_at: Utc::now(),
            services,
        }
    }

    /// Service name → state, as returned by `/health`.
    pub fn service_states(&self) -> BTreeMap<&str, ServiceState> {
        self.services
            .iter()
            .map(|s| (s.name.as_str(), s.state))
            .collect()
    }

    /// Human-readable table for `stackvisor status`.
    pub fn render_table(&self) -> String {
        let width = self
            .services
            .iter()
            .map(|s| s.name.len())
            .chain(std::iter::once("SERVICE".len()))
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} ({}) is {} as of {}",
            self.deployment,
            self.network,
            self.health,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "{:<width$}  {:<10}  {:>8}  {:>8}  LAST ERROR",
            "SERVICE", "STATE", "RESTARTS", "PID"
        );
        for s in &self.services {
            let pid = s.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_owned());
            let _ = writeln!(
                out,
                "{:<width$}  {:<10}  {:>8}  {:>8}  {}",
                s.name,
                s.state.as_str(),
                s.restart_count,
                pid,
                s.last_error.as_deref().unwrap_or("-"),
            );
        }
        out
    }
}
