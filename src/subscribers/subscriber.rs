//! # Event subscriber trait.
//!
//! Provides [`Subscribe`] an extension point for plugging custom observers of runtime
//! events (delegate spawns, fetch failures, ordering decisions) into the runtime.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently of the dispatch path)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use seedvisor::{Event, EventKind, Subscribe};
//!
//! struct SpawnCounter;
//!
//! #[async_trait]
//! impl Subscribe for SpawnCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::DelegateSpawned) {
//!             // bump a metric, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "spawn-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of runtime events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to at least 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
