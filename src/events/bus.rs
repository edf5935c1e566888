//! # Event bus for service lifecycle events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]: monitors and the supervisor publish,
//! the supervisor's listener applies events to the state table and fans them
//! out to subscribers.
//!
//! ```text
//!   monitor(execution) ──┐
//!   monitor(beacon)    ──┼──► Bus ──► listener ──► StateTable ──► watch (waiters, status file)
//!   supervisor         ──┘                   └──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - Capacity is shared by all receivers; a receiver that falls behind gets
//!   `RecvError::Lagged(n)` and skips the `n` oldest events.
//! - Events sent while nobody is subscribed are lost, so the listener subscribes
//!   before any monitor is spawned.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every active receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::AllStoppedWithin));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::AllStoppedWithin);
    }
}
