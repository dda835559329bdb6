//! # Push feed and its driver.
//!
//! [`Feed::feed`] is the synchronous entry point a web handler calls once per received
//! update. It only enqueues; the runtime's single feed driver drains the queue, passes
//! updates through the [`OrderingBuffer`] when ordering is enabled, and dispatches.
//!
//! ```text
//! webhook ─► Feed::feed(u) ─► [unbounded queue] ─► FeedDriver::run
//!                                                    ├─ unordered → dispatch(u)
//!                                                    └─ ordered   → OrderingBuffer::push(u)
//!                                                                   ├─ Released(..) → dispatch each
//!                                                                   ├─ Held         → UpdateBuffered
//!                                                                   └─ Discarded    → UpdateDiscarded
//!                                                  (hold deadline) → OrderingBuffer::expire → GapSkipped
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::error::{ConfigurationError, FeedError};
use crate::events::{Bus, Event, EventKind};
use crate::source::ordering::{Admission, OrderingBuffer};
use crate::source::transport::SourceState;
use crate::update::Update;

/// Cloneable, non-blocking entry point of a push-fed runtime.
pub struct Feed<U> {
    tx: mpsc::UnboundedSender<U>,
}

impl<U> Clone for Feed<U> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<U: Update> Feed<U> {
    /// Hands one externally received update to the runtime.
    ///
    /// Never blocks. Fails with [`FeedError::Closed`] once the runtime has stopped.
    pub fn feed(&self, update: U) -> Result<(), FeedError> {
        self.tx.send(update).map_err(|_| FeedError::Closed)
    }

    /// True once the feed driver has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates a connected feed and driver.
pub(crate) fn channel<U: Update>(
    buffer: Option<OrderingBuffer<U>>,
    bus: Bus,
    state: watch::Sender<SourceState>,
) -> (Feed<U>, FeedDriver<U>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Feed { tx },
        FeedDriver {
            rx,
            buffer,
            bus,
            state,
        },
    )
}

/// Single sequential consumer of a [`Feed`].
pub(crate) struct FeedDriver<U> {
    rx: mpsc::UnboundedReceiver<U>,
    buffer: Option<OrderingBuffer<U>>,
    bus: Bus,
    state: watch::Sender<SourceState>,
}

impl<U: Update> FeedDriver<U> {
    /// Drains the feed until `token` is cancelled or every [`Feed`] is dropped.
    ///
    /// A configuration error stops the driver and is returned.
    pub(crate) async fn run(
        &mut self,
        dispatcher: &Dispatcher<U>,
        token: &CancellationToken,
    ) -> Result<(), ConfigurationError> {
        let res = self.drive(dispatcher, token).await;
        self.rx.close();
        self.state.send_replace(SourceState::Stopped);
        self.bus.publish(Event::new(EventKind::SourceStopped));
        tracing::info!(held = self.buffer.as_ref().map_or(0, |b| b.held()), "feed stopped");
        res
    }

    async fn drive(
        &mut self,
        dispatcher: &Dispatcher<U>,
        token: &CancellationToken,
    ) -> Result<(), ConfigurationError> {
        loop {
            let deadline = self.buffer.as_ref().and_then(OrderingBuffer::next_deadline);
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                _ = sleep_until(deadline) => self.skip_gap(dispatcher).await?,
                next = self.rx.recv() => match next {
                    Some(update) => self.admit(update, dispatcher).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    async fn admit(&mut self, update: U, dispatcher: &Dispatcher<U>) -> Result<(), ConfigurationError> {
        let Some(buffer) = self.buffer.as_mut() else {
            return self.dispatch(vec![update], dispatcher).await;
        };
        match buffer.push(update, Instant::now()) {
            Admission::Released(batch) => self.dispatch(batch, dispatcher).await,
            Admission::Held(seq) => {
                tracing::debug!(update = seq, expected = ?buffer.expected(), "update held");
                self.bus
                    .publish(Event::new(EventKind::UpdateBuffered).with_update(seq));
                Ok(())
            }
            Admission::Discarded(seq) => {
                tracing::debug!(update = seq, expected = ?buffer.expected(), "update discarded");
                self.bus
                    .publish(Event::new(EventKind::UpdateDiscarded).with_update(seq));
                Ok(())
            }
        }
    }

    async fn skip_gap(&mut self, dispatcher: &Dispatcher<U>) -> Result<(), ConfigurationError> {
        let Some(gap) = self.buffer.as_mut().and_then(|b| b.expire(Instant::now())) else {
            return Ok(());
        };
        tracing::info!(from = gap.from, resume = gap.resume, "skipping sequence gap");
        self.bus.publish(
            Event::new(EventKind::GapSkipped)
                .with_update(gap.resume)
                .with_reason(format!("{}..{}", gap.from, gap.resume)),
        );
        self.dispatch(gap.released, dispatcher).await
    }

    async fn dispatch(&self, batch: Vec<U>, dispatcher: &Dispatcher<U>) -> Result<(), ConfigurationError> {
        self.state.send_replace(SourceState::Dispatching);
        for update in batch {
            dispatcher.dispatch(Arc::new(update)).await?;
        }
        self.state.send_replace(SourceState::Idle);
        Ok(())
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::{Listener, TokioExecutor};
    use crate::dispatch::{HandlerFn, HandlerRef, Mode};
    use crate::error::HandlerError;
    use std::time::Duration;

    #[derive(Debug)]
    struct Msg(u64);

    impl Update for Msg {
        fn seq(&self) -> u64 {
            self.0
        }
    }

    /// Dispatcher with a no-op handler and a listener hearing dispatch order.
    fn recording() -> (Dispatcher<Msg>, Listener<Msg>, Bus) {
        let bus = Bus::new(64);
        let handler: HandlerRef<Msg> = HandlerFn::arc(|_m: Arc<Msg>| async { Ok::<_, HandlerError>(()) });
        let exec = Arc::new(TokioExecutor::new(bus.clone()));
        let dispatcher = Dispatcher::new(Mode::Direct(handler), exec, bus.clone());
        let mut heard = dispatcher.microphone().listener();
        heard.capture(|_m: &Msg| true);
        (dispatcher, heard, bus)
    }

    async fn collect(heard: &mut Listener<Msg>, n: usize) -> Vec<u64> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match heard.wait().await {
                Ok(m) => out.push(m.0),
                Err(_) => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn unordered_feed_keeps_arrival_order() {
        let (dispatcher, mut seen, bus) = recording();
        let (state, _) = watch::channel(SourceState::Idle);
        let (feed, mut driver) = channel::<Msg>(None, bus, state);
        let token = CancellationToken::new();

        for s in [3, 1, 2] {
            feed.feed(Msg(s)).unwrap();
        }
        let stop = token.clone();
        let run = tokio::spawn(async move {
            let res = driver.run(&dispatcher, &token).await;
            (res, driver)
        });

        assert_eq!(collect(&mut seen, 3).await, vec![3, 1, 2]);
        stop.cancel();
        let (res, _) = run.await.unwrap();
        res.unwrap();
        assert_eq!(feed.feed(Msg(4)), Err(FeedError::Closed));
    }

    #[tokio::test]
    async fn ordered_feed_dispatches_in_sequence() {
        let (dispatcher, mut seen, bus) = recording();
        let mut events = bus.subscribe();
        let (state, _) = watch::channel(SourceState::Idle);
        let (feed, mut driver) = channel(Some(OrderingBuffer::starting_at(1, None)), bus, state);
        let token = CancellationToken::new();

        for s in [3, 1, 2, 4, 1] {
            feed.feed(Msg(s)).unwrap();
        }
        drop(feed);
        driver.run(&dispatcher, &token).await.unwrap();

        assert_eq!(collect(&mut seen, 4).await, vec![1, 2, 3, 4]);
        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert!(kinds.contains(&EventKind::UpdateBuffered));
        assert!(kinds.contains(&EventKind::UpdateDiscarded));
        assert_eq!(kinds.last(), Some(&EventKind::SourceStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_gap_is_skipped_after_hold_limit() {
        let (dispatcher, mut seen, bus) = recording();
        let mut events = bus.subscribe();
        let (state, _) = watch::channel(SourceState::Idle);
        let buffer = OrderingBuffer::new(Some(Duration::from_secs(3)));
        let (feed, mut driver) = channel(Some(buffer), bus, state);
        let token = CancellationToken::new();

        let stop = token.clone();
        let run = tokio::spawn(async move { driver.run(&dispatcher, &token).await });

        feed.feed(Msg(1)).unwrap();
        feed.feed(Msg(3)).unwrap();
        feed.feed(Msg(4)).unwrap();
        assert_eq!(collect(&mut seen, 1).await, vec![1]);

        // 2 never arrives; after the hold limit 3 and 4 are released
        assert_eq!(collect(&mut seen, 2).await, vec![3, 4]);
        feed.feed(Msg(2)).unwrap();
        feed.feed(Msg(5)).unwrap();
        assert_eq!(collect(&mut seen, 1).await, vec![5]);

        stop.cancel();
        run.await.unwrap().unwrap();

        let gap = std::iter::from_fn(|| events.try_recv().ok())
            .find(|e| e.kind == EventKind::GapSkipped)
            .unwrap();
        assert_eq!(gap.update_seq, Some(3));
        assert_eq!(gap.reason.as_deref(), Some("2..3"));
    }
}
