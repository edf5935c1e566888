//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for reacting to lifecycle events
//! (logging, status export, alerting).
//!
//! Each subscriber gets its own worker task and bounded queue inside the
//! [`SubscriberSet`](crate::SubscriberSet):
//! - a slow subscriber only fills its own queue;
//! - on overflow the event is dropped for that subscriber only (logged at `warn`);
//! - events are handled sequentially (FIFO) per subscriber;
//! - panics are caught and logged at `error`.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use stackvisor::{Event, EventKind, Subscribe};
//!
//! struct Pager;
//!
//! #[async_trait]
//! impl Subscribe for Pager {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ServiceFailed {
//!             // page the operator
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "pager" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber.
///
/// Use async I/O and handle errors internally.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes one event, called from the subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity, clamped to at least 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
