//! # Runtime: owns one update source, one dispatcher, and the event bus.
//!
//! A [`Runtime`] is assembled by [`RuntimeBuilder`](crate::RuntimeBuilder) and driven by
//! [`Runtime::run`] (explicit cancellation) or [`Runtime::run_until_signal`] (OS signals).
//!
//! ## High-level architecture
//! ```text
//! Poll:  Transport ──fetch──► Poller ─────────┐
//! Push:  Feed::feed ──queue──► FeedDriver ─────┤ (OrderingBuffer when ordered)
//!                                              ▼
//!                                         Dispatcher
//!                       ┌──────────────────────┼─────────────────────────┐
//!                       ▼                      ▼                         ▼
//!                 Direct handler       RoutingTable[flavor]       SeederChain → DelegateRegistry
//!                 (tracked task)          (tracked task)                   └─► Executor
//!
//! Timers: Scheduler::event_at ──► TimerDriver ──due──► Dispatcher (runs next to the source)
//!
//! Event flow:
//!   Dispatcher / Executor / Source ── publish(Event) ──► Bus ──► subscriber listener
//!                                                                 └─► SubscriberSet::emit
//!
//! Shutdown path (run_until_signal):
//!   shutdown::wait_for_shutdown_signal()
//!             └─► Bus.publish(ShutdownRequested)
//!             └─► token.cancel() → source and timers stop → SourceStopped
//! ```
//!
//! The source is single-use: a second call to `run` returns immediately. The timer driver
//! lives exactly as long as the source.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use seedvisor::{Config, HandlerFn, OrderingMode, Runtime, SourceKind, Update};
//!
//! struct Msg(u64);
//! impl Update for Msg {
//!     fn seq(&self) -> u64 { self.0 }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config {
//!         source: SourceKind::Push,
//!         ordering: OrderingMode::Enabled,
//!         ..Config::default()
//!     };
//!     let rt = Runtime::builder(cfg)
//!         .handler(HandlerFn::new(|m: Arc<Msg>| async move {
//!             println!("update {}", m.0);
//!             Ok::<_, seedvisor::HandlerError>(())
//!         }))
//!         .build()?;
//!
//!     let feed = rt.feed()?;
//!     feed.feed(Msg(1))?;
//!     drop(feed);
//!
//!     let token = CancellationToken::new();
//!     token.cancel();
//!     rt.run(token).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::builder::RuntimeBuilder;
use super::config::Config;
use super::shutdown;
use crate::delegation::executor::drain;
use crate::delegation::{DelegateRegistry, Listener, TokioExecutor};
use crate::dispatch::Dispatcher;
use crate::error::{ConfigurationError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::source::{Feed, FeedDriver, Poller, Scheduler, SourceState};
use crate::update::Update;

/// The source a runtime drives; taken out on the first `run`.
pub(crate) enum Source<U: Update> {
    Poll(Poller<U>),
    Push(FeedDriver<U>),
}

impl<U: Update> Source<U> {
    async fn run(
        &mut self,
        dispatcher: &Dispatcher<U>,
        token: &CancellationToken,
    ) -> Result<(), ConfigurationError> {
        match self {
            Source::Poll(poller) => poller.run(dispatcher, token).await,
            Source::Push(driver) => driver.run(dispatcher, token).await,
        }
    }
}

/// One update stream, one dispatch mode, one delegate registry.
pub struct Runtime<U: Update> {
    cfg: Config,
    bus: Bus,
    dispatcher: Dispatcher<U>,
    source: Mutex<Option<Source<U>>>,
    feed: Option<Feed<U>>,
    state: watch::Receiver<SourceState>,
    executor: Option<TokioExecutor>,
    _listener: Option<DropGuard>,
}

impl<U: Update> Runtime<U> {
    /// Starts building a runtime with `cfg`.
    pub fn builder(cfg: Config) -> RuntimeBuilder<U> {
        RuntimeBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        dispatcher: Dispatcher<U>,
        source: Source<U>,
        feed: Option<Feed<U>>,
        state: watch::Receiver<SourceState>,
        executor: Option<TokioExecutor>,
        listener: Option<DropGuard>,
    ) -> Self {
        Self {
            cfg,
            bus,
            dispatcher,
            source: Mutex::new(Some(source)),
            feed,
            state,
            executor,
            _listener: listener,
        }
    }

    /// Drives the source and the timer driver until `token` is cancelled.
    ///
    /// A push-fed runtime also stops once every [`Feed`] handle (including the runtime's
    /// own) is gone. Returns the configuration error that stopped the source or the
    /// timers, if any. Running delegates and handler calls are not cancelled; see
    /// [`Runtime::wait_delegates`].
    pub async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        let source = self.source.lock().take();
        let Some(mut source) = source else {
            tracing::warn!("runtime source already consumed");
            return Ok(());
        };
        let timers = self.dispatcher.take_timers();
        tracing::info!(mode = self.dispatcher.mode().as_str(), source = ?self.cfg.source, "runtime started");

        let stop = token.child_token();
        let drive_source = async {
            let res = source.run(&self.dispatcher, &stop).await;
            stop.cancel();
            res
        };
        let drive_timers = async {
            let Some(mut timers) = timers else {
                return Ok(());
            };
            let res = timers.run(&self.dispatcher, &stop).await;
            stop.cancel();
            res
        };

        match tokio::join!(drive_source, drive_timers) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), _) | (_, Err(err)) => {
                tracing::error!(error = %err, label = err.as_label(), "runtime stopped by configuration error");
                Err(err.into())
            }
        }
    }

    /// Runs until SIGINT/SIGTERM/SIGQUIT (Ctrl-C on Windows) or until the source stops.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        let run = self.run(token.clone());
        tokio::pin!(run);

        tokio::select! {
            res = &mut run => return res,
            sig = shutdown::wait_for_shutdown_signal() => {
                let sig = sig?;
                tracing::info!(signal = %sig, "shutdown requested");
                self.bus.publish(
                    Event::new(EventKind::ShutdownRequested).with_reason(sig.to_string()),
                );
                token.cancel();
            }
        }
        run.await
    }

    /// Push entry point of this runtime.
    ///
    /// Fails with [`ConfigurationError::FeedUnavailable`] for a polling runtime.
    pub fn feed(&self) -> Result<Feed<U>, ConfigurationError> {
        self.feed.clone().ok_or(ConfigurationError::FeedUnavailable)
    }

    /// Watches the source state.
    pub fn state(&self) -> watch::Receiver<SourceState> {
        self.state.clone()
    }

    /// Event bus of this runtime.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Delegates this runtime has started, keyed by pattern and seed.
    pub fn registry(&self) -> &Arc<DelegateRegistry> {
        self.dispatcher.registry()
    }

    /// Scheduler for timed updates; they are dispatched while the runtime runs.
    pub fn scheduler(&self) -> Scheduler<U> {
        self.dispatcher.scheduler().clone()
    }

    /// Opens a listener hearing every update dispatched from now on.
    pub fn listener(&self) -> Listener<U> {
        self.dispatcher.microphone().listener()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Waits up to `grace` for running delegates and handler calls to finish.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] when some are still running. A runtime
    /// built with a custom executor only waits for its handler calls.
    pub async fn wait_delegates(&self, grace: Duration) -> Result<(), RuntimeError> {
        match &self.executor {
            Some(executor) => executor.drain(grace).await,
            None => {
                tracing::debug!("custom executor; waiting for handler calls only");
                drain(self.dispatcher.handlers(), grace).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SourceKind;
    use crate::delegation::{DelegationPattern, SeedContext, call, per_key};
    use crate::dispatch::HandlerFn;
    use crate::error::{DelegateError, HandlerError, ListenError};
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct Msg {
        seq: u64,
        chat: i64,
        text: &'static str,
    }

    impl Update for Msg {
        fn seq(&self) -> u64 {
            self.seq
        }
    }

    fn msg(seq: u64, chat: i64, text: &'static str) -> Msg {
        Msg { seq, chat, text }
    }

    fn push() -> Config {
        Config {
            source: SourceKind::Push,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn conversation_delegate_hears_follow_ups() {
        let (tx, mut replies) = mpsc::unbounded_channel::<(i64, String)>();
        let pattern = DelegationPattern::new(
            per_key(|m: &Msg| Some(m.chat)),
            call(move |ctx: SeedContext<Msg>| {
                let tx = tx.clone();
                let mut listener = ctx.listener();
                let chat = ctx.update.chat;
                listener.capture(move |m: &Msg| m.chat == chat);
                async move {
                    let name = listener
                        .wait()
                        .await
                        .map_err(|e| DelegateError::failed(e.to_string()))?;
                    let _ = tx.send((chat, format!("hello, {}", name.text)));
                    Ok::<_, DelegateError>(())
                }
            }),
        );
        let rt = Runtime::builder(push()).delegate(pattern).build().unwrap();
        let feed = rt.feed().unwrap();

        feed.feed(msg(1, 10, "/start")).unwrap();
        feed.feed(msg(2, 20, "/start")).unwrap();
        feed.feed(msg(3, 10, "alice")).unwrap();
        feed.feed(msg(4, 20, "bob")).unwrap();

        let token = CancellationToken::new();
        let stop = token.clone();
        let run = async {
            rt.run(token).await.unwrap();
        };
        let check = async {
            let mut got = vec![replies.recv().await.unwrap(), replies.recv().await.unwrap()];
            got.sort();
            assert_eq!(
                got,
                vec![(10, "hello, alice".to_string()), (20, "hello, bob".to_string())]
            );
            stop.cancel();
        };
        tokio::join!(run, check);

        assert_eq!(rt.registry().len(), 2);
        rt.wait_delegates(Duration::from_secs(1)).await.unwrap();
        assert_eq!(rt.registry().live(), 0);
        assert_eq!(*rt.state().borrow(), SourceState::Stopped);
    }

    #[tokio::test]
    async fn feed_is_unavailable_when_polling() {
        struct Never;

        #[async_trait]
        impl crate::source::Transport<Msg> for Never {
            async fn fetch(
                &self,
                _after: Option<u64>,
                _timeout: Option<Duration>,
            ) -> Result<Vec<Msg>, crate::error::TransportError> {
                std::future::pending().await
            }
        }

        let rt = Runtime::builder(Config::default())
            .handler(HandlerFn::new(|_m: Arc<Msg>| async { Ok::<_, HandlerError>(()) }))
            .with_transport(Never)
            .build()
            .unwrap();
        assert!(matches!(rt.feed(), Err(ConfigurationError::FeedUnavailable)));
    }

    #[tokio::test]
    async fn second_run_returns_immediately() {
        let rt = Runtime::builder(push())
            .handler(HandlerFn::new(|_m: Arc<Msg>| async { Ok::<_, HandlerError>(()) }))
            .build()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        rt.run(token.clone()).await.unwrap();
        rt.run(token).await.unwrap();
        assert!(rt.feed().unwrap().is_closed());
    }

    #[tokio::test]
    async fn subscribers_receive_runtime_events() {
        struct Collect(mpsc::UnboundedSender<EventKind>);

        #[async_trait]
        impl Subscribe for Collect {
            async fn on_event(&self, event: &Event) {
                let _ = self.0.send(event.kind);
            }

            fn name(&self) -> &'static str {
                "collect"
            }
        }

        let (tx, mut kinds) = mpsc::unbounded_channel();
        let rt = Runtime::builder(push())
            .handler(HandlerFn::new(|_m: Arc<Msg>| async {
                Err::<(), _>(HandlerError::new("nope"))
            }))
            .with_subscribers(vec![Arc::new(Collect(tx))])
            .build()
            .unwrap();

        let feed = rt.feed().unwrap();
        feed.feed(msg(1, 1, "hi")).unwrap();
        drop(feed);
        let token = CancellationToken::new();
        let stop = token.clone();

        let run = async {
            rt.run(token).await.unwrap();
        };
        let check = async {
            assert_eq!(kinds.recv().await, Some(EventKind::HandlerFailed));
            stop.cancel();
            assert_eq!(kinds.recv().await, Some(EventKind::SourceStopped));
        };
        tokio::join!(run, check);
    }

    #[tokio::test(start_paused = true)]
    async fn delegate_times_out_through_the_scheduler() {
        let (tx, mut outcomes) = mpsc::unbounded_channel::<(i64, &'static str)>();
        let pattern = DelegationPattern::new(
            per_key(|m: &Msg| Some(m.chat)),
            call(move |ctx: SeedContext<Msg>| {
                let tx = tx.clone();
                let mut listener = ctx.listener();
                let chat = ctx.update.chat;
                listener.capture(move |m: &Msg| m.chat == chat);
                let scheduler = ctx.scheduler;
                async move {
                    let timer = scheduler
                        .event_later(Duration::from_secs(30), msg(0, chat, "timeout"))
                        .map_err(|e| DelegateError::failed(e.to_string()))?;
                    let heard = listener
                        .wait()
                        .await
                        .map_err(|e| DelegateError::failed(e.to_string()))?;
                    scheduler.cancel(&timer);
                    let _ = tx.send((chat, heard.text));
                    Ok::<_, DelegateError>(())
                }
            }),
        );
        let rt = Runtime::builder(push()).delegate(pattern).build().unwrap();
        let mut events = rt.bus().subscribe();
        let feed = rt.feed().unwrap();
        let start = tokio::time::Instant::now();

        feed.feed(msg(1, 10, "/start")).unwrap();
        feed.feed(msg(2, 20, "/start")).unwrap();
        feed.feed(msg(3, 20, "bob")).unwrap();

        let token = CancellationToken::new();
        let stop = token.clone();
        let run = async {
            rt.run(token).await.unwrap();
        };
        let check = async {
            assert_eq!(outcomes.recv().await, Some((20, "bob")));
            assert_eq!(outcomes.recv().await, Some((10, "timeout")));
            assert!(start.elapsed() >= Duration::from_secs(30));
            stop.cancel();
        };
        tokio::join!(run, check);

        let fired = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.kind == EventKind::TimerFired)
            .count();
        assert_eq!(fired, 1);
        rt.wait_delegates(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wait_delegates_reports_stragglers() {
        let pattern = DelegationPattern::new(
            per_key(|m: &Msg| Some(m.chat)),
            call(|ctx: SeedContext<Msg>| {
                let mut listener = ctx.listener();
                listener.capture(|_m: &Msg| false);
                async move {
                    match listener.wait().await {
                        Err(ListenError::Closed) => Ok(()),
                        other => Err(DelegateError::failed(format!("{other:?}"))),
                    }
                }
            }),
        );
        let rt = Runtime::builder(push()).delegate(pattern).build().unwrap();
        let feed = rt.feed().unwrap();
        feed.feed(msg(1, 7, "stay")).unwrap();

        let token = CancellationToken::new();
        let stop = token.clone();
        let run = async {
            rt.run(token).await.unwrap();
        };
        let check = async {
            while rt.registry().is_empty() {
                tokio::task::yield_now().await;
            }
            stop.cancel();
        };
        tokio::join!(run, check);

        let err = rt.wait_delegates(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, RuntimeError::GraceExceeded { running: 1, .. }));
    }
}
