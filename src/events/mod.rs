//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to observability events emitted by the dispatcher, the
//! delegate executor, the update sources and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Dispatcher`, `TokioExecutor`, `Poller`, the feed driver and
//!   `OrderingBuffer` stage, `Runtime` (shutdown).
//! - **Consumers**: the runtime's subscriber listener (fans out to `SubscriberSet`).
//!
//! Runtime events are distinct from the conversational updates the runtime dispatches.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
