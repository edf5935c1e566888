//! Runtime events: types and broadcast bus.
//!
//! - [`EventKind`], [`Event`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! Publishers are the service monitors and the supervisor. The single bus
//! consumer is the supervisor's listener, which updates the state table and
//! forwards every event to the [`SubscriberSet`](crate::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
