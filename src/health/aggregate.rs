//! Deployment-level readiness from per-service snapshots.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::services::{ServiceSnapshot, ServiceState};

/// Combined readiness of the whole deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentHealth {
    /// Every service is healthy.
    Healthy,
    /// Something is wrong, but nothing blocks a pending start.
    Degraded,
    /// An unhealthy or failed service is a dependency of a service still waiting to start.
    Unhealthy,
    /// No faults; some services have not reached healthy yet.
    Starting,
}

impl DeploymentHealth {
    /// `Healthy` and `Degraded` count as ready for readiness endpoints.
    pub fn is_ready(self) -> bool {
        matches!(self, DeploymentHealth::Healthy | DeploymentHealth::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentHealth::Healthy => "healthy",
            DeploymentHealth::Degraded => "degraded",
            DeploymentHealth::Unhealthy => "unhealthy",
            DeploymentHealth::Starting => "starting",
        }
    }
}

impl fmt::Display for DeploymentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_faulty(state: ServiceState) -> bool {
    matches!(state, ServiceState::Unhealthy | ServiceState::Failed)
}

fn is_waiting_to_start(state: ServiceState) -> bool {
    matches!(
        state,
        ServiceState::Pending | ServiceState::Starting | ServiceState::Restarting
    )
}

/// Combines snapshots into one [`DeploymentHealth`].
///
/// Rules, first match wins:
/// 1. every service `Healthy` → `Healthy`;
/// 2. a faulty (`Unhealthy`/`Failed`) service is a direct dependency of a
///    service in `Pending`/`Starting`/`Restarting` → `Unhealthy`;
/// 3. no faulty service and some service in `Pending`/`Starting`/`Running` → `Starting`;
/// 4. otherwise → `Degraded`.
///
/// Services missing from `snapshots` count as `Pending`.
pub fn aggregate(snapshots: &[ServiceSnapshot], graph: &DependencyGraph) -> DeploymentHealth {
    let states: HashMap<&str, ServiceState> = snapshots
        .iter()
        .map(|s| (s.name.as_str(), s.state))
        .collect();
    let state_of = |name: &str| states.get(name).copied().unwrap_or(ServiceState::Pending);

    let names: Vec<&str> = graph.start_order().collect();

    if names.iter().all(|n| state_of(n) == ServiceState::Healthy) {
        return DeploymentHealth::Healthy;
    }

    let blocked = names.iter().any(|n| {
        is_waiting_to_start(state_of(n))
            && graph.dependencies(n).iter().any(|d| is_faulty(state_of(d)))
    });
    if blocked {
        return DeploymentHealth::Unhealthy;
    }

    let any_faulty = names.iter().any(|n| is_faulty(state_of(n)));
    let any_coming_up = names.iter().any(|n| {
        matches!(
            state_of(n),
            ServiceState::Pending | ServiceState::Starting | ServiceState::Running
        )
    });
    if !any_faulty && any_coming_up {
        return DeploymentHealth::Starting;
    }

    DeploymentHealth::Degraded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceSpec;

    fn graph() -> DependencyGraph {
        let svc = |name: &str, deps: &[&str]| {
            deps.iter()
                .fold(ServiceSpec::builder(name).command("true", Vec::<String>::new()), |b, d| {
                    b.depends_on(*d)
                })
                .build()
        };
        DependencyGraph::build([
            svc("execution", &[]),
            svc("beacon", &["execution"]),
            svc("metrics", &[]),
        ])
        .unwrap()
    }

    fn snaps(states: [ServiceState; 3]) -> Vec<ServiceSnapshot> {
        ["execution", "beacon", "metrics"]
            .into_iter()
            .zip(states)
            .map(|(n, s)| ServiceSnapshot::pending(n).with_state(s))
            .collect()
    }

    use ServiceState::*;

    #[test]
    fn all_healthy_is_healthy() {
        assert_eq!(aggregate(&snaps([Healthy, Healthy, Healthy]), &graph()), DeploymentHealth::Healthy);
    }

    #[test]
    fn unhealthy_non_dependency_is_degraded() {
        assert_eq!(
            aggregate(&snaps([Healthy, Healthy, Unhealthy]), &graph()),
            DeploymentHealth::Degraded
        );
    }

    #[test]
    fn failed_dependency_blocking_a_start_is_unhealthy() {
        assert_eq!(
            aggregate(&snaps([Failed, Pending, Healthy]), &graph()),
            DeploymentHealth::Unhealthy
        );
        assert_eq!(
            aggregate(&snaps([Unhealthy, Restarting, Healthy]), &graph()),
            DeploymentHealth::Unhealthy
        );
    }

    #[test]
    fn unhealthy_dependency_of_a_running_service_is_degraded() {
        assert_eq!(
            aggregate(&snaps([Unhealthy, Healthy, Healthy]), &graph()),
            DeploymentHealth::Degraded
        );
    }

    #[test]
    fn startup_without_faults_is_starting() {
        assert_eq!(
            aggregate(&snaps([Healthy, Running, Pending]), &graph()),
            DeploymentHealth::Starting
        );
        assert_eq!(aggregate(&[], &graph()), DeploymentHealth::Starting);
    }

    #[test]
    fn readiness_mapping() {
        assert!(DeploymentHealth::Degraded.is_ready());
        assert!(!DeploymentHealth::Starting.is_ready());
        assert_eq!(serde_json::to_string(&DeploymentHealth::Unhealthy).unwrap(), "\"unhealthy\"");
    }
}
