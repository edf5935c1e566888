//! # ServiceMonitor: owns one service's process for its whole life.
//!
//! One monitor task per service. It spawns the process, probes it, restarts it
//! according to the service's [`RestartPolicy`](crate::RestartPolicy) and stops it
//! when its token is cancelled. Every state change is published to the bus; the
//! monitor never touches the supervisor's state table.
//!
//! ```text
//! loop {
//!   ├─► publish ServiceStarting (attempt = starts)
//!   ├─► process::spawn()
//!   │     ├─ Err on first start → ServiceFailed, reply Err, return
//!   │     └─ Ok → ServiceRunning(pid), reply Ok(pid) once
//!   ├─► supervise()
//!   │     select! {
//!   │       cancelled   → Stopping → terminate → Stopped, return
//!   │       child.wait  → exit outcome
//!   │       probe tick  → HealthTracker → Healthy / Unhealthy
//!   │                     unhealthy past unhealthy_grace → terminate → exit outcome
//!   │     }
//!   ├─► RestartPolicy::permits_restart(clean)?
//!   │     ├─ no, clean → ServiceStopped
//!   │     └─ no, dirty → ServiceFailed + DependencyFailed for each dependent
//!   └─► publish ServiceRestarting(delay) → sleep(delay) (cancellable)
//! }
//! ```
//!
//! ## Rules
//! - The consecutive-failure counter feeds [`BackoffPolicy::next`](crate::BackoffPolicy::next)
//!   and resets once the service has stayed healthy for `healthy_reset`.
//! - A process killed for being unhealthy never counts as a clean exit.
//! - The spawn result of the first start is reported exactly once through the
//!   reply channel; the supervisor waits on it before moving to the next service.

use std::process::ExitStatus;
use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::SupervisorConfig;
use crate::core::process;
use crate::descriptor::duration;
use crate::error::ProcessError;
use crate::events::{Bus, Event, EventKind};
use crate::graph::DependencyGraph;
use crate::health::{DebouncedHealth, HealthTracker, Prober};
use crate::services::{LaunchContext, ServiceSpec};

/// Reply for the first spawn: the pid on success.
pub(crate) type SpawnReply = oneshot::Sender<Result<Option<u32>, ProcessError>>;

/// How one process run ended.
struct Exit {
    clean: bool,
    code: Option<i32>,
    reason: String,
}

impl Exit {
    fn from_status(status: &ExitStatus) -> Self {
        let (code, reason) = process::describe_exit(status);
        Self {
            clean: status.success(),
            code,
            reason,
        }
    }

    fn dirty(reason: impl Into<String>) -> Self {
        Self {
            clean: false,
            code: None,
            reason: reason.into(),
        }
    }
}

/// Drives one service through its lifecycle.
pub(crate) struct ServiceMonitor {
    spec: Arc<ServiceSpec>,
    graph: Arc<DependencyGraph>,
    ctx: LaunchContext,
    cfg: Arc<SupervisorConfig>,
    bus: Bus,
    prober: Prober,
}

impl ServiceMonitor {
    pub(crate) fn new(
        spec: Arc<ServiceSpec>,
        graph: Arc<DependencyGraph>,
        ctx: LaunchContext,
        cfg: Arc<SupervisorConfig>,
        bus: Bus,
        prober: Prober,
    ) -> Self {
        Self {
            spec,
            graph,
            ctx,
            cfg,
            bus,
            prober,
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(self.spec.name())
    }

    /// Runs until the service reaches `Stopped` or `Failed`.
    pub(crate) async fn run(self, token: CancellationToken, reply: SpawnReply) {
        let mut reply = Some(reply);
        let mut starts: u32 = 0;
        let mut consecutive: u32 = 0;

        if token.is_cancelled() {
            self.bus
                .publish(self.event(EventKind::ServiceStopped).with_reason("cancelled before start"));
            return;
        }

        loop {
            starts = starts.saturating_add(1);
            self.bus
                .publish(self.event(EventKind::ServiceStarting).with_attempt(starts));

            let exit = match process::spawn(&self.spec, &self.ctx) {
                Ok(child) => {
                    let pid = child.id();
                    self.bus
                        .publish(self.event(EventKind::ServiceRunning).with_pid(pid));
                    if let Some(tx) = reply.take() {
                        let _ = tx.send(Ok(pid));
                    }
                    match self.supervise(child, &token, &mut consecutive).await {
                        Some(exit) => exit,
                        None => return,
                    }
                }
                Err(e) => {
                    if let Some(tx) = reply.take() {
                        self.fail(None, e.to_string());
                        let _ = tx.send(Err(e));
                        return;
                    }
                    warn!(service = self.spec.name(), error = %e, "respawn failed");
                    Exit::dirty(e.to_string())
                }
            };

            if !self.spec.restart().permits_restart(exit.clean) {
                if exit.clean {
                    self.bus.publish(
                        self.event(EventKind::ServiceStopped)
                            .with_exit_code(exit.code)
                            .with_reason(exit.reason),
                    );
                } else {
                    self.fail(exit.code, exit.reason);
                }
                return;
            }

            let delay = self.spec.backoff().next(consecutive);
            consecutive = consecutive.saturating_add(1);
            self.bus.publish(
                self.event(EventKind::ServiceRestarting)
                    .with_attempt(consecutive)
                    .with_delay(delay)
                    .with_exit_code(exit.code)
                    .with_reason(exit.reason),
            );

            select! {
                biased;
                _ = token.cancelled() => {
                    self.bus.publish(self.event(EventKind::ServiceStopping));
                    self.bus.publish(self.event(EventKind::ServiceStopped).with_reason("cancelled during backoff"));
                    return;
                }
                _ = time::sleep(delay) => {}
            }
        }
    }

    /// Publishes `ServiceFailed` and tells every direct dependent.
    fn fail(&self, code: Option<i32>, reason: String) {
        let name = self.spec.name();
        self.bus.publish(
            self.event(EventKind::ServiceFailed)
                .with_exit_code(code)
                .with_reason(reason),
        );
        for dependent in self.graph.dependents(name) {
            self.bus.publish(
                Event::new(EventKind::DependencyFailed)
                    .with_service(dependent)
                    .with_dependency(name),
            );
        }
    }

    /// Watches a running process. `None` means it was stopped by cancellation.
    async fn supervise(
        &self,
        mut child: Child,
        token: &CancellationToken,
        consecutive: &mut u32,
    ) -> Option<Exit> {
        let name = self.spec.name();
        let mut tracker = HealthTracker::new(self.cfg.failure_threshold_clamped());
        let mut ticker = time::interval(self.cfg.probe_interval_clamped());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let kill_after = self.cfg.unhealthy_kill_after();

        let mut healthy_since: Option<Instant> = None;
        let mut unhealthy_since: Option<Instant> = None;

        loop {
            select! {
                biased;
                _ = token.cancelled() => {
                    self.stop(&mut child).await;
                    return None;
                }
                status = child.wait() => {
                    return Some(match status {
                        Ok(status) => Exit::from_status(&status),
                        Err(e) => Exit::dirty(format!("wait: {e}")),
                    });
                }
                _ = ticker.tick() => {}
            }

            let probe = self
                .prober
                .probe(self.spec.health_check(), self.cfg.probe_timeout);
            let result = select! {
                biased;
                _ = token.cancelled() => None,
                r = probe => Some(r),
            };
            let Some(result) = result else { continue };

            match tracker.observe(result) {
                Some(DebouncedHealth::Healthy) => {
                    healthy_since = Some(Instant::now());
                    unhealthy_since = None;
                    self.bus.publish(self.event(EventKind::ServiceHealthy));
                }
                Some(DebouncedHealth::Unhealthy) => {
                    healthy_since = None;
                    unhealthy_since = Some(Instant::now());
                    self.bus.publish(
                        self.event(EventKind::ServiceUnhealthy)
                            .with_attempt(tracker.failures())
                            .with_reason(format!(
                                "{} consecutive probe failures",
                                tracker.failures()
                            )),
                    );
                }
                _ => {}
            }

            if *consecutive > 0
                && healthy_since.is_some_and(|t| t.elapsed() >= self.cfg.healthy_reset)
            {
                debug!(service = name, failures = *consecutive, "healthy long enough, backoff reset");
                *consecutive = 0;
            }

            if let (Some(limit), Some(since)) = (kill_after, unhealthy_since) {
                if since.elapsed() >= limit {
                    warn!(service = name, unhealthy_for = %duration::format(limit), "unhealthy too long, killing");
                    let code = match process::terminate(&mut child, self.cfg.grace).await {
                        Ok(status) => process::describe_exit(&status).0,
                        Err(e) => {
                            warn!(service = name, error = %e, "terminate failed");
                            None
                        }
                    };
                    return Some(Exit {
                        clean: false,
                        code,
                        reason: format!("unhealthy for {}", duration::format(limit)),
                    });
                }
            }
        }
    }

    /// `Stopping` → terminate → `Stopped`.
    async fn stop(&self, child: &mut Child) {
        let name = self.spec.name();
        self.bus
            .publish(self.event(EventKind::ServiceStopping).with_pid(child.id()));
        match process::terminate(child, self.cfg.grace).await {
            Ok(status) => {
                let (code, reason) = process::describe_exit(&status);
                debug!(service = name, %reason, "stopped");
                self.bus.publish(
                    self.event(EventKind::ServiceStopped)
                        .with_exit_code(code)
                        .with_reason(reason),
                );
            }
            Err(e) => {
                warn!(service = name, error = %e, "terminate failed");
                self.bus
                    .publish(self.event(EventKind::ServiceStopped).with_reason(e.to_string()));
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::deployment::Network;
    use crate::policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
    use crate::services::HealthCheckSpec;
    use crate::services::ServiceState;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn cfg() -> Arc<SupervisorConfig> {
        Arc::new(SupervisorConfig {
            grace: Duration::from_secs(2),
            probe_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(500),
            failure_threshold: 1,
            ..SupervisorConfig::default()
        })
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(10),
            max: Duration::from_millis(40),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    fn monitor(spec: ServiceSpec) -> (ServiceMonitor, broadcast::Receiver<Event>) {
        monitor_with(spec, cfg())
    }

    fn monitor_with(
        spec: ServiceSpec,
        cfg: Arc<SupervisorConfig>,
    ) -> (ServiceMonitor, broadcast::Receiver<Event>) {
        let graph = Arc::new(DependencyGraph::build([spec]).unwrap());
        let spec = graph.specs_in_start_order().next().unwrap().clone();
        let bus = Bus::new(256);
        let rx = bus.subscribe();
        let ctx = LaunchContext {
            network: Network::Holesky,
            secret_path: None,
        };
        (
            ServiceMonitor::new(spec, graph, ctx, cfg, bus, Prober::new()),
            rx,
        )
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn states(events: &[Event]) -> Vec<ServiceState> {
        events.iter().filter_map(|e| e.kind.target_state()).collect()
    }

    #[tokio::test]
    async fn clean_exit_under_never_stops() {
        let (m, mut rx) = monitor(
            ServiceSpec::builder("oneshot")
                .command("/bin/sh", ["-c", "exit 0"])
                .restart(RestartPolicy::Never)
                .build(),
        );
        let (tx, reply) = oneshot::channel();
        m.run(CancellationToken::new(), tx).await;

        assert!(reply.await.unwrap().is_ok());
        let evs = drain(&mut rx);
        assert_eq!(
            states(&evs).last().copied(),
            Some(ServiceState::Stopped)
        );
    }

    #[tokio::test]
    async fn failing_process_under_never_fails() {
        let (m, mut rx) = monitor(
            ServiceSpec::builder("broken")
                .command("/bin/sh", ["-c", "exit 3"])
                .restart(RestartPolicy::Never)
                .build(),
        );
        let (tx, _reply) = oneshot::channel();
        m.run(CancellationToken::new(), tx).await;

        let evs = drain(&mut rx);
        let failed = evs
            .iter()
            .find(|e| e.kind == EventKind::ServiceFailed)
            .unwrap();
        assert_eq!(failed.exit_code, Some(3));
        assert_eq!(failed.reason.as_deref(), Some("exit status 3"));
    }

    #[tokio::test]
    async fn first_spawn_error_is_reported_and_fatal() {
        let (m, mut rx) = monitor(
            ServiceSpec::builder("ghost")
                .command("/nonexistent/ghost", Vec::<String>::new())
                .restart(RestartPolicy::Always)
                .build(),
        );
        let (tx, reply) = oneshot::channel();
        m.run(CancellationToken::new(), tx).await;

        assert!(matches!(reply.await.unwrap(), Err(ProcessError::Spawn { .. })));
        assert_eq!(
            states(&drain(&mut rx)),
            [ServiceState::Starting, ServiceState::Failed]
        );
    }

    #[tokio::test]
    async fn on_failure_restarts_with_growing_delay() {
        let (m, mut rx) = monitor(
            ServiceSpec::builder("flaky")
                .command("/bin/sh", ["-c", "exit 1"])
                .restart(RestartPolicy::OnFailure)
                .backoff(fast_backoff())
                .build(),
        );
        let token = CancellationToken::new();
        let (tx, _reply) = oneshot::channel();
        let handle = tokio::spawn(m.run(token.clone(), tx));
        time::sleep(Duration::from_millis(400)).await;
        token.cancel();
        handle.await.unwrap();

        let delays: Vec<_> = drain(&mut rx)
            .iter()
            .filter(|e| e.kind == EventKind::ServiceRestarting)
            .filter_map(|e| e.delay())
            .collect();
        assert!(delays.len() >= 3, "{delays:?}");
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(delays[1], Duration::from_millis(20));
        assert_eq!(delays[2], Duration::from_millis(40));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(40)));
    }

    #[tokio::test]
    async fn healthy_service_is_stopped_on_cancel() {
        let (m, mut rx) = monitor(
            ServiceSpec::builder("sleeper")
                .command("/bin/sh", ["-c", "sleep 30"])
                .health_check(HealthCheckSpec::None)
                .restart(RestartPolicy::Always)
                .build(),
        );
        let token = CancellationToken::new();
        let (tx, reply) = oneshot::channel();
        let handle = tokio::spawn(m.run(token.clone(), tx));
        assert!(reply.await.unwrap().unwrap().is_some());
        time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(
            states(&drain(&mut rx)),
            [
                ServiceState::Starting,
                ServiceState::Running,
                ServiceState::Healthy,
                ServiceState::Stopping,
                ServiceState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn failing_probe_marks_unhealthy() {
        let (m, mut rx) = monitor(
            ServiceSpec::builder("sick")
                .command("/bin/sh", ["-c", "sleep 30"])
                .health_check(HealthCheckSpec::command(
                    "/bin/sh",
                    ["-c", "test -e /nonexistent/ready"],
                ))
                .restart(RestartPolicy::Always)
                .build(),
        );
        let token = CancellationToken::new();
        let (tx, _reply) = oneshot::channel();
        let handle = tokio::spawn(m.run(token.clone(), tx));
        time::sleep(Duration::from_millis(200)).await;
        token.cancel();
        handle.await.unwrap();

        let seen = states(&drain(&mut rx));
        assert!(!seen.contains(&ServiceState::Healthy));
        assert_eq!(seen.last().copied(), Some(ServiceState::Stopped));
    }

    #[tokio::test]
    async fn sustained_unhealthy_is_killed_and_restarted() {
        let dir = tempfile::TempDir::new().unwrap();
        let ready = dir.path().join("ready");
        let script = format!(
            "touch {p}; sleep 0.2; rm -f {p}; exec sleep 30",
            p = ready.display()
        );
        let (m, mut rx) = monitor_with(
            ServiceSpec::builder("stuck")
                .command("/bin/sh", ["-c".to_owned(), script])
                .health_check(HealthCheckSpec::command(
                    "/bin/sh",
                    ["-c".to_owned(), format!("test -f {}", ready.display())],
                ))
                .restart(RestartPolicy::OnFailure)
                .backoff(fast_backoff())
                .build(),
            Arc::new(SupervisorConfig {
                unhealthy_grace: Duration::from_millis(100),
                ..(*cfg()).clone()
            }),
        );
        let token = CancellationToken::new();
        let (tx, _reply) = oneshot::channel();
        let handle = tokio::spawn(m.run(token.clone(), tx));
        time::sleep(Duration::from_millis(800)).await;
        token.cancel();
        handle.await.unwrap();

        let evs = drain(&mut rx);
        let seen = states(&evs);
        let unhealthy = seen.iter().position(|s| *s == ServiceState::Unhealthy).unwrap();
        assert_eq!(seen[unhealthy - 1], ServiceState::Healthy);
        assert_eq!(seen[unhealthy + 1], ServiceState::Restarting);

        let restart = evs
            .iter()
            .find(|e| e.kind == EventKind::ServiceRestarting)
            .unwrap();
        assert_eq!(restart.reason.as_deref(), Some("unhealthy for 100ms"));
        assert_eq!(restart.delay(), Some(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn backoff_resets_after_sustained_healthy_period() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("ran-once");
        let script = format!(
            "if [ -f {p} ]; then sleep 0.3; exit 1; else touch {p}; exit 1; fi",
            p = marker.display()
        );
        let (m, mut rx) = monitor_with(
            ServiceSpec::builder("steady")
                .command("/bin/sh", ["-c".to_owned(), script])
                .health_check(HealthCheckSpec::None)
                .restart(RestartPolicy::OnFailure)
                .backoff(fast_backoff())
                .build(),
            Arc::new(SupervisorConfig {
                healthy_reset: Duration::from_millis(100),
                ..(*cfg()).clone()
            }),
        );
        let token = CancellationToken::new();
        let (tx, _reply) = oneshot::channel();
        let handle = tokio::spawn(m.run(token.clone(), tx));
        time::sleep(Duration::from_millis(1000)).await;
        token.cancel();
        handle.await.unwrap();

        let delays: Vec<_> = drain(&mut rx)
            .iter()
            .filter(|e| e.kind == EventKind::ServiceRestarting)
            .filter_map(|e| e.delay())
            .collect();
        assert!(delays.len() >= 3, "{delays:?}");
        assert!(
            delays.iter().all(|d| *d == Duration::from_millis(10)),
            "{delays:?}"
        );
    }
}
