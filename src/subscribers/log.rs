//! # LogWriter: runtime events as `tracing` records
//!
//! A subscriber that renders every [`Event`] through the `tracing` macros, so it shows
//! up in whatever `tracing-subscriber` the application installs.
//!
//! ## Levels
//! - `debug`: delegate spawn/reuse/finish, buffered updates
//! - `info`: source stopped, shutdown requested, skipped gaps
//! - `warn`: fetch failures, retries, discarded updates, subscriber overflow
//! - `error`: delegate/handler/subscriber failures and panics

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::DelegateSpawned => tracing::debug!(
                pattern = ?e.pattern, seed = ?e.seed, delegate = ?e.delegate, update = ?e.update_seq,
                "delegate spawned"
            ),
            EventKind::DelegateReused => tracing::debug!(
                pattern = ?e.pattern, seed = ?e.seed, delegate = ?e.delegate, update = ?e.update_seq,
                "delegate reused"
            ),
            EventKind::DelegateFinished => {
                tracing::debug!(delegate = ?e.delegate, label = reason, "delegate finished")
            }
            EventKind::DelegateFailed => {
                tracing::error!(delegate = ?e.delegate, err = reason, "delegate failed")
            }
            EventKind::DelegatePanicked => {
                tracing::error!(delegate = ?e.delegate, info = reason, "delegate panicked")
            }
            EventKind::HandlerFailed => {
                tracing::error!(update = ?e.update_seq, err = reason, "handler failed")
            }
            EventKind::FetchFailed => tracing::warn!(
                attempt = ?e.attempt, cursor = ?e.update_seq, err = reason,
                "fetch failed"
            ),
            EventKind::RetryScheduled => tracing::warn!(
                attempt = ?e.attempt, delay = ?e.delay(),
                "retry scheduled"
            ),
            EventKind::UpdateBuffered => {
                tracing::debug!(update = ?e.update_seq, "update buffered")
            }
            EventKind::UpdateDiscarded => {
                tracing::warn!(update = ?e.update_seq, "stale update discarded")
            }
            EventKind::GapSkipped => {
                tracing::info!(resume = ?e.update_seq, gap = reason, "sequence gap skipped")
            }
            EventKind::TimerFired => {
                tracing::debug!(update = ?e.update_seq, timer = reason, "timer fired")
            }
            EventKind::SourceStopped => tracing::info!("source stopped"),
            EventKind::ShutdownRequested => tracing::info!("shutdown requested"),
            EventKind::SubscriberOverflow => tracing::warn!(detail = reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => tracing::error!(detail = reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
