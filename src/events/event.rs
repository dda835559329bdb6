//! # Runtime events emitted by the dispatcher, the executor and the sources.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Delegation events**: delegate spawn/reuse and delegate outcomes
//! - **Dispatch events**: handler failures in direct/routed mode
//! - **Source events**: fetch failures, retries, ordering-buffer decisions, timers, stop
//! - **Subscriber events**: overflow and panics of observers
//!
//! The [`Event`] struct carries metadata such as the pattern index, the seed, the
//! delegate id and the update sequence number.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use seedvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::DelegateSpawned)
//!     .with_pattern(0)
//!     .with_seed("42")
//!     .with_update(7);
//!
//! assert_eq!(ev.kind, EventKind::DelegateSpawned);
//! assert_eq!(ev.seed.as_deref(), Some("42"));
//! assert_eq!(ev.update_seq, Some(7));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Delegation events ===
    /// A new delegate was created and started for a seed.
    ///
    /// Sets: `pattern`, `seed`, `delegate`, `update_seq`.
    DelegateSpawned,

    /// A live delegate already owns the seed; nothing was spawned.
    ///
    /// Sets: `pattern`, `seed`, `delegate`, `update_seq`.
    DelegateReused,

    /// A delegate's work completed successfully.
    ///
    /// Sets: `delegate`, `reason` (delegate label).
    DelegateFinished,

    /// A delegate's work returned an error, or the delegate could not be started.
    ///
    /// Sets: `delegate`, `reason`; a start failure also sets `pattern`, `seed`,
    /// `update_seq`.
    DelegateFailed,

    /// A delegate's work panicked.
    ///
    /// Sets: `delegate`, `reason` (panic info).
    DelegatePanicked,

    // === Dispatch events ===
    /// A direct or routed handler failed or panicked for an update.
    ///
    /// Sets: `update_seq`, `reason`.
    HandlerFailed,

    // === Source events ===
    /// A fetch attempt failed.
    ///
    /// Sets: `attempt`, `reason`, `update_seq` (cursor).
    FetchFailed,

    /// The next fetch was scheduled after a failure.
    ///
    /// Sets: `attempt`, `delay_ms`.
    RetryScheduled,

    /// An early update was placed in the ordering buffer.
    ///
    /// Sets: `update_seq`.
    UpdateBuffered,

    /// A stale or duplicate update was dropped by the ordering buffer.
    ///
    /// Sets: `update_seq`.
    UpdateDiscarded,

    /// The ordering buffer gave up on a missing sequence range.
    ///
    /// Sets: `update_seq` (first released sequence), `reason`.
    GapSkipped,

    /// A scheduled update became due and was dispatched.
    ///
    /// Sets: `update_seq`, `reason` (timer id).
    TimerFired,

    /// The update source stopped.
    SourceStopped,

    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (subscriber + panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (subscriber + cause).
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Index of the delegation pattern in the seeder chain.
    pub pattern: Option<u32>,
    /// Rendered seed key.
    pub seed: Option<Arc<str>>,
    /// Process-unique delegate id.
    pub delegate: Option<u64>,
    /// Sequence number of the update involved.
    pub update_seq: Option<u64>,
    /// Retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Fetch attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Human-readable reason (errors, labels, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pattern: None,
            seed: None,
            delegate: None,
            update_seq: None,
            delay_ms: None,
            attempt: None,
            reason: None,
        }
    }

    /// Attaches a pattern index.
    #[inline]
    pub fn with_pattern(mut self, pattern: usize) -> Self {
        self.pattern = Some(pattern.min(u32::MAX as usize) as u32);
        self
    }

    /// Attaches a rendered seed.
    #[inline]
    pub fn with_seed(mut self, seed: impl Into<Arc<str>>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Attaches a delegate id.
    #[inline]
    pub fn with_delegate(mut self, id: u64) -> Self {
        self.delegate = Some(id);
        self
    }

    /// Attaches an update sequence number.
    #[inline]
    pub fn with_update(mut self, seq: u64) -> Self {
        self.update_seq = Some(seq);
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, cause: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} cause={cause}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    /// True for events that report on subscribers themselves (overflow or panic).
    #[inline]
    pub fn is_subscriber_report(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }

    /// Retry delay as a `Duration`, if set.
    #[inline]
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::SourceStopped);
        let b = Event::new(EventKind::SourceStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_is_stored_in_millis() {
        let ev = Event::new(EventKind::RetryScheduled).with_delay(Duration::from_millis(1500));
        assert_eq!(ev.delay_ms, Some(1500));
        assert_eq!(ev.delay(), Some(Duration::from_millis(1500)));
    }
}
