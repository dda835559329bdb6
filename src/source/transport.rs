//! # Transport seam and source state.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// # Batch fetcher used by the polling source.
///
/// `after` is the sequence number of the last dispatched update (`None` before the
/// first one); the transport must return only updates with a greater sequence number,
/// in ascending order. `timeout` is the long-poll deadline the remote side may hold
/// the request open for.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use seedvisor::{Transport, TransportError, Update};
///
/// struct Tick(u64);
/// impl Update for Tick {
///     fn seq(&self) -> u64 { self.0 }
/// }
///
/// struct Clock;
///
/// #[async_trait]
/// impl Transport<Tick> for Clock {
///     async fn fetch(&self, after: Option<u64>, _timeout: Option<Duration>)
///         -> Result<Vec<Tick>, TransportError>
///     {
///         let next = after.map_or(1, |s| s + 1);
///         Ok(vec![Tick(next)])
///     }
/// }
/// ```
#[async_trait]
pub trait Transport<U>: Send + Sync + 'static {
    /// Fetches the next batch of updates after `after`.
    async fn fetch(&self, after: Option<u64>, timeout: Option<Duration>) -> Result<Vec<U>, TransportError>;
}

/// Observable state of an update source.
///
/// ```text
/// Idle ──► Fetching ──► Dispatching ──► Idle ...
///   └──────────┴─────────────┴──► Stopped (terminal)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceState {
    /// Between cycles (or waiting for pushed updates).
    #[default]
    Idle,
    /// Waiting on the transport.
    Fetching,
    /// Handing updates to the dispatcher.
    Dispatching,
    /// Stopped; no further updates are dispatched.
    Stopped,
}

impl SourceState {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceState::Idle => "idle",
            SourceState::Fetching => "fetching",
            SourceState::Dispatching => "dispatching",
            SourceState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
