//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the dispatch runtime.
//!
//! ## Sentinel values
//! - `timeout = 0s` → no long-poll hold and no per-fetch deadline
//! - `max_hold = 0s` → the ordering buffer holds early updates forever
//! - `interval = 0s` → poll again immediately after a dispatched batch

use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Where updates come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Pull batches from a [`Transport`](crate::Transport) in a loop.
    #[default]
    Poll,
    /// Receive updates one by one through a [`Feed`](crate::Feed).
    Push,
}

/// Whether a push feed restores sequence order before dispatch.
///
/// Has no effect on polling sources, which dispatch in batch order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderingMode {
    /// Dispatch pushed updates strictly by sequence number.
    Enabled,
    /// Dispatch pushed updates in arrival order.
    #[default]
    Disabled,
}

/// Global configuration for the dispatch runtime.
///
/// ## Field semantics
/// - `interval`: delay between poll cycles (`0s` = none)
/// - `timeout`: long-poll hold passed to the transport (`0s` = none)
/// - `fetch_grace`: slack past `timeout` before a fetch is abandoned
/// - `source`: polling or push-fed source
/// - `ordering`: reorder pushed updates by sequence number
/// - `max_hold`: how long the ordering buffer waits for a missing sequence (`0s` = forever)
/// - `retry`: delay policy after a transient fetch failure
/// - `unavailable_delay`: delay after the remote side reports itself unavailable
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Delay between successful poll cycles.
    pub interval: Duration,

    /// How long the remote side may hold an empty long-poll open.
    ///
    /// - `Duration::ZERO` = no hold; the fetch may block as long as the transport likes
    /// - `> 0` = passed to [`Transport::fetch`](crate::Transport::fetch); the fetch is
    ///   abandoned as [`TransportError::Timeout`](crate::TransportError::Timeout) once
    ///   `timeout + fetch_grace` passes
    pub timeout: Duration,

    /// Network slack added to `timeout` for the client-side fetch deadline.
    pub fetch_grace: Duration,

    /// Source variant the runtime drives.
    pub source: SourceKind,

    /// Ordering of pushed updates.
    pub ordering: OrderingMode,

    /// Maximum time an early update is held waiting for a smaller sequence number.
    ///
    /// When it elapses, the gap is skipped and late arrivals below it are discarded.
    pub max_hold: Duration,

    /// Retry delay policy for transient fetch failures.
    pub retry: BackoffPolicy,

    /// Delay used instead of `retry` when the transport reports the remote as unavailable.
    pub unavailable_delay: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the long-poll hold as an `Option`.
    ///
    /// - `None` → no hold, no deadline
    /// - `Some(d)` → the remote side may hold the fetch for `d`
    #[inline]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the client-side fetch deadline: the long-poll hold plus `fetch_grace`.
    #[inline]
    pub fn fetch_deadline(&self) -> Option<Duration> {
        self.fetch_timeout()
            .map(|hold| hold.saturating_add(self.fetch_grace))
    }

    /// Returns the ordering hold limit as an `Option`.
    ///
    /// - `None` → gaps stall the buffer until filled
    /// - `Some(d)` → gaps are skipped after `d`
    #[inline]
    pub fn hold_limit(&self) -> Option<Duration> {
        if self.max_hold == Duration::ZERO {
            None
        } else {
            Some(self.max_hold)
        }
    }

    /// True if pushed updates must be reordered.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.source == SourceKind::Push && self.ordering == OrderingMode::Enabled
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `interval = 100ms`
    /// - `timeout = 20s` (long-poll hold), `fetch_grace = 5s`
    /// - `source = Poll`, `ordering = Disabled`
    /// - `max_hold = 0s` (hold forever)
    /// - `retry = 100ms × 2^n`, capped at 30s, equal jitter
    /// - `unavailable_delay = 30s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(20),
            fetch_grace: Duration::from_secs(5),
            source: SourceKind::default(),
            ordering: OrderingMode::default(),
            max_hold: Duration::ZERO,
            retry: BackoffPolicy {
                first: Duration::from_millis(100),
                max: Duration::from_secs(30),
                factor: 2.0,
                jitter: JitterPolicy::Equal,
            },
            unavailable_delay: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}
