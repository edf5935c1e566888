//! # Service state table with sequence-based ordering.
//!
//! Holds the supervisor's read-only view of every service. Monitors never touch
//! it directly: their transition events arrive through the bus listener and are
//! applied here.
//!
//! ```text
//! monitor ──► Bus ──► listener ──► StateTable::apply() ──► watch::Sender (bump)
//!                                         │
//!                                         ▼
//!                          HashMap<name, {last_seq, ServiceSnapshot}>
//! ```
//!
//! ## Rules
//! - Events with `seq <= last_seq` for the same service are rejected (stale).
//! - Transitions not allowed by [`ServiceState::can_transition_to`] are logged and rejected.
//! - Unknown services and coordination events do not change any snapshot.
//! - Every applied transition bumps the watch channel.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};
use tracing::warn;

use crate::events::Event;
use crate::services::{ServiceSnapshot, ServiceState};

struct Entry {
    last_seq: Option<u64>,
    snapshot: ServiceSnapshot,
}

/// Per-service snapshots, updated from bus events.
pub struct StateTable {
    order: Vec<String>,
    state: RwLock<HashMap<String, Entry>>,
    changed: watch::Sender<u64>,
}

impl StateTable {
    /// Creates a table with every service `Pending`; `names` fixes report order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = names.into_iter().map(Into::into).collect();
        let state = order
            .iter()
            .map(|n| {
                (
                    n.clone(),
                    Entry {
                        last_seq: None,
                        snapshot: ServiceSnapshot::pending(n.clone()),
                    },
                )
            })
            .collect();
        let (changed, _rx) = watch::channel(0);
        Self {
            order,
            state: RwLock::new(state),
            changed,
        }
    }

    /// Applies a transition event; returns the new snapshot if it changed anything.
    ///
    /// ```text
    /// apply(ServiceRunning,  seq=10)  → running, last_seq=10
    /// apply(ServiceStarting, seq=9)   → rejected (stale)
    /// apply(ServiceHealthy,  seq=11)  → healthy
    /// apply(ServiceStarting, seq=12)  → rejected (healthy → starting is illegal)
    /// ```
    pub async fn apply(&self, ev: &Event) -> Option<ServiceSnapshot> {
        let name = ev.service.as_deref()?;
        let target = ev.kind.target_state()?;

        let mut state = self.state.write().await;
        let entry = state.get_mut(name)?;

        if entry.last_seq.is_some_and(|last| ev.seq <= last) {
            return None;
        }
        entry.last_seq = Some(ev.seq);

        let snap = &mut entry.snapshot;
        if !snap.state.can_transition_to(target) {
            warn!(service = name, from = %snap.state, to = %target, seq = ev.seq, "illegal transition rejected");
            return None;
        }

        snap.state = target;
        snap.last_transition = DateTime::<Utc>::from(ev.at);
        if target == ServiceState::Running {
            snap.pid = ev.pid;
        } else if !target.has_process() {
            snap.pid = None;
        }
        if target == ServiceState::Restarting {
            snap.restart_count = snap.restart_count.saturating_add(1);
        }
        if ev.exit_code.is_some() {
            snap.last_exit_code = ev.exit_code;
        }
        if matches!(target, ServiceState::Restarting | ServiceState::Failed) {
            if let Some(reason) = &ev.reason {
                snap.last_error = Some(reason.to_string());
            }
        }

        let updated = snap.clone();
        drop(state);
        self.changed.send_modify(|v| *v = v.wrapping_add(1));
        Some(updated)
    }

    /// Receiver that is notified after every applied transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    pub async fn state(&self, name: &str) -> Option<ServiceState> {
        self.state.read().await.get(name).map(|e| e.snapshot.state)
    }

    pub async fn snapshot(&self, name: &str) -> Option<ServiceSnapshot> {
        self.state
            .read()
            .await
            .get(name)
            .map(|e| e.snapshot.clone())
    }

    /// All snapshots in start order.
    pub async fn snapshots(&self) -> Vec<ServiceSnapshot> {
        let state = self.state.read().await;
        self.order
            .iter()
            .filter_map(|n| state.get(n).map(|e| e.snapshot.clone()))
            .collect()
    }

    /// Names of services not yet `Stopped`/`Failed`, in start order.
    pub async fn active(&self) -> Vec<String> {
        let state = self.state.read().await;
        self.order
            .iter()
            .filter(|n| state.get(*n).is_some_and(|e| !e.snapshot.state.is_terminal()))
            .cloned()
            .collect()
    }

    /// True once every service is `Stopped` or `Failed`.
    pub async fn all_terminal(&self) -> bool {
        self.state
            .read()
            .await
            .values()
            .all(|e| e.snapshot.state.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn ev(kind: EventKind, service: &str) -> Event {
        Event::new(kind).with_service(service)
    }

    #[tokio::test]
    async fn applies_legal_transitions_in_order() {
        let table = StateTable::new(["execution", "beacon"]);
        let mut rx = table.subscribe();

        table.apply(&ev(EventKind::ServiceStarting, "execution")).await.unwrap();
        let snap = table
            .apply(&ev(EventKind::ServiceRunning, "execution").with_pid(Some(42)))
            .await
            .unwrap();
        assert_eq!(snap.state, ServiceState::Running);
        assert_eq!(snap.pid, Some(42));
        assert!(rx.has_changed().unwrap());

        let names: Vec<_> = table.snapshots().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["execution", "beacon"]);
        assert_eq!(table.active().await, ["execution", "beacon"]);
    }

    #[tokio::test]
    async fn rejects_stale_events() {
        let table = StateTable::new(["a"]);
        let starting = ev(EventKind::ServiceStarting, "a");
        let running = ev(EventKind::ServiceRunning, "a");
        let stale_stop = Event {
            seq: starting.seq,
            ..ev(EventKind::ServiceStopped, "a")
        };

        table.apply(&starting).await.unwrap();
        table.apply(&running).await.unwrap();
        assert!(table.apply(&stale_stop).await.is_none());
        assert_eq!(table.state("a").await, Some(ServiceState::Running));
    }

    #[tokio::test]
    async fn rejects_illegal_transitions() {
        let table = StateTable::new(["a"]);
        assert!(table.apply(&ev(EventKind::ServiceHealthy, "a")).await.is_none());
        assert_eq!(table.state("a").await, Some(ServiceState::Pending));
    }

    #[tokio::test]
    async fn restart_bookkeeping() {
        let table = StateTable::new(["a"]);
        for kind in [EventKind::ServiceStarting, EventKind::ServiceRunning] {
            table.apply(&ev(kind, "a")).await;
        }
        let snap = table
            .apply(
                &ev(EventKind::ServiceRestarting, "a")
                    .with_exit_code(Some(1))
                    .with_reason("exit status 1"),
            )
            .await
            .unwrap();
        assert_eq!(snap.restart_count, 1);
        assert_eq!(snap.last_exit_code, Some(1));
        assert_eq!(snap.last_error.as_deref(), Some("exit status 1"));
        assert_eq!(snap.pid, None);
    }

    #[tokio::test]
    async fn pid_is_kept_while_a_process_exists() {
        let table = StateTable::new(["a"]);
        table.apply(&ev(EventKind::ServiceStarting, "a")).await;
        table.apply(&ev(EventKind::ServiceRunning, "a").with_pid(Some(7))).await;
        for kind in [
            EventKind::ServiceHealthy,
            EventKind::ServiceUnhealthy,
            EventKind::ServiceStopping,
        ] {
            let snap = table.apply(&ev(kind, "a")).await.unwrap();
            assert_eq!(snap.pid, Some(7), "{kind:?}");
        }
        let snap = table.apply(&ev(EventKind::ServiceStopped, "a")).await.unwrap();
        assert_eq!(snap.pid, None);
    }

    #[tokio::test]
    async fn ignores_unknown_services_and_coordination_events() {
        let table = StateTable::new(["a"]);
        assert!(table.apply(&ev(EventKind::ServiceStarting, "zzz")).await.is_none());
        assert!(table.apply(&ev(EventKind::DependencyWaiting, "a")).await.is_none());
        assert!(!table.all_terminal().await);
    }
}
