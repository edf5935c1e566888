//! # Event subscribers.
//!
//! ```text
//!   Bus ──► supervisor listener ──► StateTable
//!                        │
//!                        └──► SubscriberSet ──► LogWriter
//!                                         └──► custom (alerts, exporters, tests)
//! ```
//!
//! Implement [`Subscribe`] and pass it to
//! [`SupervisorBuilder::with_subscribers`](crate::SupervisorBuilder::with_subscribers).

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
