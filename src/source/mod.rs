//! # Update sources.
//!
//! Where updates come from, and in which order they reach the dispatcher:
//! - [`Poller`] pulls batches from a [`Transport`] (batch order);
//! - [`Feed`] receives pushed updates one by one (arrival order, or sequence order
//!   through the [`OrderingBuffer`]);
//! - [`Scheduler`] injects timed updates when they become due.
//!
//! The poller or feed is the runtime's sequential driver and publishes its
//! [`SourceState`] through a `tokio::sync::watch` channel. The timer driver runs
//! alongside it on the same task.

mod feed;
mod ordering;
mod poller;
mod scheduler;
mod transport;

pub(crate) use feed::{FeedDriver, channel as feed_channel};
pub(crate) use scheduler::{TimerDriver, channel as scheduler_channel};

pub use feed::Feed;
pub use ordering::{Admission, OrderingBuffer, SkippedGap};
pub use poller::Poller;
pub use scheduler::{Scheduled, Scheduler};
pub use transport::{SourceState, Transport};
