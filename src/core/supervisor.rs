//! # Supervisor: brings a deployment up in dependency order and tears it down in reverse.
//!
//! The [`Supervisor`] owns the event bus, the [`StateTable`], one
//! [`ServiceMonitor`] per started service and the deployment-level
//! [`CancellationToken`].
//!
//! ## Architecture
//! ```text
//! start():
//!   for spec in graph.specs_in_start_order():
//!       start_service(spec):
//!           loop until every dep is Healthy at once
//!                               ── watch(StateTable) / dependency_timeout / runtime_token
//!           try_launch(spec)    ── re-check deps under the monitors lock,
//!                                  tokio::spawn(ServiceMonitor::run(own token))
//!           await_spawn         ── first spawn reply
//!   on error: stop(), return error
//!
//! Event flow:
//!   monitors ── publish(Event) ──► Bus ──► listener ──► StateTable::apply()
//!                                                 └──► SubscriberSet::emit()
//!
//! stop():
//!   publish ShutdownRequested, cancel runtime_token
//!   for name in graph.shutdown_order():
//!       cancel monitor token, join (bounded by grace + slack)
//!   Pending services → Stopped
//!   publish AllStoppedWithin | GraceExceeded
//! ```
//!
//! ## Rules
//! - A service is launched only while every direct dependency is `Healthy`.
//! - Monitor tokens are independent: cancelling the deployment stops startup,
//!   while each monitor is cancelled individually in shutdown order.
//! - `stop()` is idempotent; the second call returns `Ok(())` immediately.
//!
//! ## Example
//! ```no_run
//! use stackvisor::{
//!     DependencyGraph, Deployment, HealthCheckSpec, LogWriter, Network,
//!     RestartPolicy, ServiceSpec, Supervisor, SupervisorConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let graph = DependencyGraph::build([
//!         ServiceSpec::builder("execution")
//!             .command("reth", ["node", "--chain", "{network}"])
//!             .health_check(HealthCheckSpec::port(8551))
//!             .restart(RestartPolicy::Always)
//!             .build(),
//!         ServiceSpec::builder("beacon")
//!             .command("lighthouse", ["bn", "--network", "{network}"])
//!             .depends_on("execution")
//!             .health_check(HealthCheckSpec::http("http://127.0.0.1:5052/eth/v1/node/health"))
//!             .restart(RestartPolicy::Always)
//!             .build(),
//!     ])?;
//!     let deployment = Deployment::new("eth-node", Network::Holesky, graph);
//!
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_subscribers(vec![Arc::new(LogWriter::new())])
//!         .build(deployment);
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::SupervisorConfig;
use crate::core::monitor::ServiceMonitor;
use crate::core::shutdown;
use crate::core::state_table::StateTable;
use crate::deployment::Deployment;
use crate::error::{ProcessError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::health::Prober;
use crate::services::{ServiceSnapshot, ServiceSpec, ServiceState};
use crate::status::StatusReport;
use crate::subscribers::SubscriberSet;

use super::builder::SupervisorBuilder;

type SpawnRx = oneshot::Receiver<Result<Option<u32>, ProcessError>>;

/// Upper bound for the state table to settle after every monitor has been joined.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

struct MonitorHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

struct Listener {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Drives one [`Deployment`]: ordered start, supervision, ordered stop.
pub struct Supervisor {
    cfg: Arc<SupervisorConfig>,
    deployment: Deployment,
    bus: Bus,
    table: Arc<StateTable>,
    prober: Prober,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
    runtime_token: CancellationToken,
    listener: Mutex<Option<Listener>>,
    stopped: Mutex<bool>,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    /// Wires the listener; must be called inside a Tokio runtime.
    pub(super) fn new_internal(
        cfg: SupervisorConfig,
        deployment: Deployment,
        bus: Bus,
        subs: SubscriberSet,
    ) -> Self {
        let names: Vec<String> = deployment
            .graph()
            .start_order()
            .map(str::to_owned)
            .collect();
        let table = Arc::new(StateTable::new(names));
        let listener = spawn_listener(bus.subscribe(), Arc::clone(&table), subs);

        Self {
            cfg: Arc::new(cfg),
            deployment,
            bus,
            table,
            prober: Prober::new(),
            monitors: Mutex::new(HashMap::new()),
            runtime_token: CancellationToken::new(),
            listener: Mutex::new(Some(listener)),
            stopped: Mutex::new(false),
        }
    }

    /// Starts every service in dependency order.
    ///
    /// Each service is launched once all of its direct dependencies are
    /// `Healthy`. On any error, whatever was started is torn down in reverse
    /// order before the error is returned.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let result = self.start_all().await;
        if let Err(e) = &result {
            warn!(error = %e, label = e.as_label(), "startup aborted, tearing down");
            if let Err(stop_err) = self.stop().await {
                warn!(error = %stop_err, "teardown after failed startup was incomplete");
            }
        }
        result
    }

    async fn start_all(&self) -> Result<(), RuntimeError> {
        let graph = Arc::clone(self.deployment.graph());
        info!(
            deployment = self.deployment.name(),
            network = %self.deployment.network(),
            services = graph.len(),
            "starting deployment"
        );
        for spec in graph.specs_in_start_order() {
            self.start_service(spec).await?;
        }
        Ok(())
    }

    /// Launches `spec` once all of its direct dependencies are `Healthy` at the
    /// same time, bounded by one `dependency_timeout` for the whole wait.
    async fn start_service(&self, spec: &Arc<ServiceSpec>) -> Result<(), RuntimeError> {
        let service = spec.name();
        let mut changed = self.table.subscribe();
        let deadline = time::sleep(self.cfg.dependency_timeout);
        tokio::pin!(deadline);
        let mut announced: HashSet<String> = HashSet::new();

        loop {
            match self.unready_dependency(spec).await? {
                None => {
                    if let Some(rx) = self.try_launch(spec).await? {
                        return self.await_spawn(service, rx).await;
                    }
                }
                Some(dependency) => {
                    if announced.insert(dependency.clone()) {
                        self.bus.publish(
                            Event::new(EventKind::DependencyWaiting)
                                .with_service(service)
                                .with_dependency(dependency.as_str()),
                        );
                    }
                }
            }

            select! {
                biased;
                _ = self.runtime_token.cancelled() => return Err(RuntimeError::Cancelled),
                _ = &mut deadline => {
                    let dependency = self
                        .unready_dependency(spec)
                        .await?
                        .unwrap_or_default();
                    self.bus.publish(
                        Event::new(EventKind::DependencyTimeout)
                            .with_service(service)
                            .with_dependency(dependency.as_str())
                            .with_delay(self.cfg.dependency_timeout),
                    );
                    return Err(RuntimeError::DependencyTimeout {
                        service: service.to_owned(),
                        dependency,
                        timeout: self.cfg.dependency_timeout,
                    });
                }
                res = changed.changed() => {
                    if res.is_err() {
                        return Err(RuntimeError::Cancelled);
                    }
                }
            }
        }
    }

    /// First direct dependency of `spec` that is not `Healthy`, `None` if all are.
    ///
    /// A dependency that is terminal (or unknown) aborts the wait.
    async fn unready_dependency(&self, spec: &ServiceSpec) -> Result<Option<String>, RuntimeError> {
        let mut unready = None;
        for dependency in spec.depends_on() {
            match self.table.state(dependency).await {
                Some(ServiceState::Healthy) => {}
                Some(state) if !state.is_terminal() => {
                    if unready.is_none() {
                        unready = Some(dependency.clone());
                    }
                }
                _ => {
                    return Err(RuntimeError::DependencyFailed {
                        service: spec.name().to_owned(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        if unready.is_none() && !spec.depends_on().is_empty() {
            debug!(service = spec.name(), "dependencies healthy");
        }
        Ok(unready)
    }

    /// Spawns the monitor for `spec` if its dependencies are still all healthy.
    ///
    /// The check is repeated under the monitors lock; `None` means a dependency
    /// changed state in between and the caller should keep waiting.
    async fn try_launch(&self, spec: &Arc<ServiceSpec>) -> Result<Option<SpawnRx>, RuntimeError> {
        let mut monitors = self.monitors.lock().await;
        if self.runtime_token.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        if let Some(dependency) = self.unready_dependency(spec).await? {
            debug!(service = spec.name(), dependency = %dependency, "dependency changed before launch");
            return Ok(None);
        }

        let (tx, rx) = oneshot::channel();
        let monitor = ServiceMonitor::new(
            Arc::clone(spec),
            Arc::clone(self.deployment.graph()),
            self.deployment.launch_context(),
            Arc::clone(&self.cfg),
            self.bus.clone(),
            self.prober.clone(),
        );
        let token = CancellationToken::new();
        let join = tokio::spawn(monitor.run(token.clone(), tx));
        monitors.insert(spec.name().to_owned(), MonitorHandle { token, join });
        Ok(Some(rx))
    }

    /// Waits for the first spawn result of a launched monitor.
    async fn await_spawn(&self, service: &str, rx: SpawnRx) -> Result<(), RuntimeError> {
        match rx.await {
            Ok(Ok(pid)) => {
                debug!(service, pid, "launched");
                Ok(())
            }
            Ok(Err(e)) => Err(RuntimeError::SpawnFailed {
                service: service.to_owned(),
                reason: e.to_string(),
            }),
            Err(_closed) => Err(RuntimeError::Cancelled),
        }
    }

    /// Stops every started service in reverse start order.
    ///
    /// Best effort: a monitor that does not finish within `grace` plus a small
    /// slack is aborted (its process is killed on drop) and reported in
    /// [`RuntimeError::GraceExceeded`]; the remaining services are still stopped.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        let mut stopped = self.stopped.lock().await;
        if *stopped {
            return Ok(());
        }
        *stopped = true;

        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.runtime_token.cancel();

        let mut handles = std::mem::take(&mut *self.monitors.lock().await);
        let join_timeout = self.cfg.monitor_join_timeout();
        let mut stuck = Vec::new();

        for name in self.deployment.graph().shutdown_order() {
            let Some(MonitorHandle { token, mut join }) = handles.remove(name) else {
                continue;
            };
            token.cancel();
            match time::timeout(join_timeout, &mut join).await {
                Ok(Ok(())) => debug!(service = name, "monitor finished"),
                Ok(Err(e)) => warn!(service = name, error = %e, "monitor task ended abnormally"),
                Err(_elapsed) => {
                    warn!(service = name, "monitor did not finish in time, aborting");
                    join.abort();
                    self.bus.publish(
                        Event::new(EventKind::ServiceStopped)
                            .with_service(name)
                            .with_reason("monitor aborted"),
                    );
                    stuck.push(name.to_owned());
                }
            }
        }

        for snap in self.table.snapshots().await {
            if snap.state == ServiceState::Pending {
                self.bus.publish(
                    Event::new(EventKind::ServiceStopped)
                        .with_service(snap.name.as_str())
                        .with_reason("never started"),
                );
            }
        }
        self.wait_settled().await;

        let result = if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus.publish(
                Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")),
            );
            Err(RuntimeError::GraceExceeded {
                grace: self.cfg.grace,
                stuck,
            })
        };

        self.close_listener().await;
        result
    }

    /// Waits briefly until every service reached a terminal state.
    async fn wait_settled(&self) {
        let settled = time::timeout(SETTLE_TIMEOUT, self.wait_all_terminal()).await;
        if settled.is_err() {
            let active = self.table.active().await;
            warn!(active = ?active, "state table did not settle");
        }
    }

    async fn wait_all_terminal(&self) {
        let mut changed = self.table.subscribe();
        while !self.table.all_terminal().await {
            if changed.changed().await.is_err() {
                return;
            }
        }
    }

    /// Lets the listener drain the bus and the subscribers finish their queues.
    async fn close_listener(&self) {
        let Some(listener) = self.listener.lock().await.take() else {
            return;
        };
        listener.token.cancel();
        if let Err(e) = listener.join.await {
            warn!(error = %e, "event listener ended abnormally");
        }
    }

    /// Starts the deployment and keeps it running until `shutdown` resolves,
    /// the deployment token is cancelled, or every service has exited.
    ///
    /// Returns [`RuntimeError::ServiceFailed`] when a service ended `Failed`.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let start = self.start();
        tokio::pin!(start);
        let started = select! {
            res = &mut start => res,
            _ = &mut shutdown => {
                info!("shutdown requested during startup");
                self.runtime_token.cancel();
                start.await
            }
        };
        match started {
            Ok(()) => {}
            Err(RuntimeError::Cancelled) => return Ok(()),
            Err(e) => return Err(e),
        }
        info!(deployment = self.deployment.name(), "deployment started");

        select! {
            _ = &mut shutdown => info!("shutdown requested"),
            _ = self.runtime_token.cancelled() => info!("deployment cancelled"),
            _ = self.wait_all_terminal() => info!("every service has exited"),
        }

        let failed: Vec<String> = self
            .table
            .snapshots()
            .await
            .into_iter()
            .filter(|s| s.state == ServiceState::Failed)
            .map(|s| s.name)
            .collect();

        self.stop().await?;
        match failed.into_iter().next() {
            Some(service) => Err(RuntimeError::ServiceFailed { service }),
            None => Ok(()),
        }
    }

    /// [`run_until`](Self::run_until) an OS termination signal.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.run_until(async {
            match shutdown::wait_for_shutdown_signal().await {
                Ok(signal) => info!(signal, "received termination signal"),
                Err(e) => {
                    warn!(error = %e, "signal handlers unavailable, waiting for cancellation");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Deployment-level token: cancelling it aborts startup and ends [`run`](Self::run).
    pub fn cancel_token(&self) -> CancellationToken {
        self.runtime_token.clone()
    }

    /// Raw event stream (events published after this call).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Notified after every applied state transition.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.table.subscribe()
    }

    /// All service snapshots in start order.
    pub async fn snapshots(&self) -> Vec<ServiceSnapshot> {
        self.table.snapshots().await
    }

    pub async fn snapshot(&self, name: &str) -> Option<ServiceSnapshot> {
        self.table.snapshot(name).await
    }

    /// Current status report with aggregated health.
    pub async fn report(&self) -> StatusReport {
        StatusReport::new(&self.deployment, self.table.snapshots().await)
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }
}

/// Applies bus events to the table, then fans them out to subscribers.
fn spawn_listener(
    mut rx: broadcast::Receiver<Event>,
    table: Arc<StateTable>,
    subs: SubscriberSet,
) -> Listener {
    let token = CancellationToken::new();
    let stop = token.clone();

    let join = tokio::spawn(async move {
        loop {
            select! {
                biased;
                res = rx.recv() => match res {
                    Ok(ev) => {
                        table.apply(&ev).await;
                        subs.emit(&ev);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => {
                                table.apply(&ev).await;
                                subs.emit(&ev);
                            }
                            Err(TryRecvError::Lagged(skipped)) => {
                                warn!(skipped, "event listener lagged");
                            }
                            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                        }
                    }
                    break;
                }
            }
        }
        subs.shutdown().await;
    });

    Listener { token, join }
}
