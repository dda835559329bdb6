//! # Poller: the pull-based update source.
//!
//! Drives the loop `Idle → Fetching → Dispatching → Idle` until cancelled.
//!
//! ```text
//! loop {
//!   ├─► Fetching: transport.fetch(after = cursor, timeout)   (cancellable,
//!   │                                  abandoned after timeout + fetch_grace)
//!   │       ├─ Ok(batch) ──► Dispatching: for u in batch (in order)
//!   │       │                  ├─ u.seq <= cursor → skip (redelivered)
//!   │       │                  ├─ dispatcher.dispatch(u)?  (config error → stop, return it)
//!   │       │                  └─ cursor = u.seq
//!   │       │                Idle: sleep(interval)         (cancellable)
//!   │       └─ Err(e) ─────► publish FetchFailed{ attempt }
//!   │                        delay = e.is_unavailable() ? unavailable_delay : retry.delay(n)
//!   │                        publish RetryScheduled{ attempt, delay }
//!   │                        Idle: sleep(delay)            (cancellable, cursor unchanged)
//!   └─ cancelled anywhere ─► Stopped
//! }
//! ```
//!
//! The cursor advances per dispatched update, so a batch interrupted by cancellation or
//! a configuration error is fetched again from the first undispatched update.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::dispatch::Dispatcher;
use crate::error::{ConfigurationError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::source::transport::{SourceState, Transport};
use crate::update::Update;

/// Pull-based update source over a [`Transport`].
pub struct Poller<U> {
    transport: Arc<dyn Transport<U>>,
    interval: Duration,
    timeout: Option<Duration>,
    deadline: Option<Duration>,
    retry: BackoffPolicy,
    unavailable_delay: Duration,
    bus: Bus,
    state: watch::Sender<SourceState>,
    cursor: Option<u64>,
}

impl<U: Update> Poller<U> {
    /// Creates a poller with the polling settings of `cfg`.
    pub fn new(
        transport: Arc<dyn Transport<U>>,
        cfg: &Config,
        bus: Bus,
        state: watch::Sender<SourceState>,
    ) -> Self {
        Self {
            transport,
            interval: cfg.interval,
            timeout: cfg.fetch_timeout(),
            deadline: cfg.fetch_deadline(),
            retry: cfg.retry,
            unavailable_delay: cfg.unavailable_delay,
            bus,
            state,
            cursor: None,
        }
    }

    /// Sequence number of the last dispatched update.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Polls until `token` is cancelled.
    ///
    /// Transport errors are retried forever; a configuration error raised while
    /// dispatching stops the poller and is returned.
    pub async fn run(
        &mut self,
        dispatcher: &Dispatcher<U>,
        token: &CancellationToken,
    ) -> Result<(), ConfigurationError> {
        let res = self.drive(dispatcher, token).await;
        self.state.send_replace(SourceState::Stopped);
        self.bus.publish(self.with_cursor(Event::new(EventKind::SourceStopped)));
        tracing::info!(cursor = ?self.cursor, "poller stopped");
        res
    }

    async fn drive(
        &mut self,
        dispatcher: &Dispatcher<U>,
        token: &CancellationToken,
    ) -> Result<(), ConfigurationError> {
        let mut failures: u32 = 0;

        loop {
            self.state.send_replace(SourceState::Fetching);
            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                res = self.fetch() => res,
            };

            let delay = match fetched {
                Ok(batch) => {
                    failures = 0;
                    self.state.send_replace(SourceState::Dispatching);
                    for update in batch {
                        if token.is_cancelled() {
                            return Ok(());
                        }
                        let seq = update.seq();
                        if self.cursor.is_some_and(|c| seq <= c) {
                            continue;
                        }
                        dispatcher.dispatch(Arc::new(update)).await?;
                        self.cursor = Some(seq);
                    }
                    self.interval
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    self.retry_delay(&err, failures)
                }
            };

            self.state.send_replace(SourceState::Idle);
            if !pause(delay, token).await {
                return Ok(());
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<U>, TransportError> {
        let call = self.transport.fetch(self.cursor, self.timeout);
        match self.deadline {
            None => call.await,
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .unwrap_or(Err(TransportError::Timeout { timeout: deadline })),
        }
    }

    fn retry_delay(&self, err: &TransportError, attempt: u32) -> Duration {
        tracing::warn!(attempt, cursor = ?self.cursor, err = %err, "fetch failed");
        self.bus.publish(self.with_cursor(
            Event::new(EventKind::FetchFailed)
                .with_attempt(attempt)
                .with_reason(err.to_string()),
        ));

        let delay = if err.is_unavailable() {
            self.unavailable_delay
        } else {
            self.retry.delay(attempt.saturating_sub(1))
        };
        self.bus.publish(
            Event::new(EventKind::RetryScheduled)
                .with_attempt(attempt)
                .with_delay(delay),
        );
        delay
    }

    fn with_cursor(&self, ev: Event) -> Event {
        match self.cursor {
            Some(seq) => ev.with_update(seq),
            None => ev,
        }
    }
}

/// Sleeps for `delay`; returns `false` if cancelled first.
async fn pause(delay: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
