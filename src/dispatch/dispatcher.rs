//! # Dispatcher: one update in, handlers called or delegates resolved.
//!
//! The dispatcher runs on the single sequential driver of a runtime (poll loop or feed
//! driver) and on the timer driver. It is configured in exactly one [`Mode`]:
//!
//! ```text
//! dispatch(update)
//!   ├─► Microphone::send(update)                  (live listeners first)
//!   └─► match mode
//!         ├─ Direct(handler)      → spawn handler.handle(update)        (tracked)
//!         ├─ Routed(classify, t)  → spawn t[classify(update)].handle()  (unrouted → ConfigurationError)
//!         └─ Delegation(chain)    → for (i, pattern) in chain:
//!                                     seed = pattern.seed(update)
//!                                     registry.resolve(i, seed, || factory(ctx))
//! ```
//!
//! ## Rules
//! - Handlers run on tasks of the handler [`TaskTracker`], so a slow or stuck handler
//!   never holds up the driver. Their errors and panics are published as
//!   `HandlerFailed`; completion order across updates is not guaranteed.
//! - A delegate that refuses to start is published as `DelegateFailed` and dispatch
//!   goes on with the next pattern.
//! - Only configuration errors (an unrouted flavor) abort the dispatch and are returned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::task::TaskTracker;

use crate::delegation::{
    DelegateHandle, DelegateRegistry, Executor, Microphone, Resolution, SeedContext, SeederChain,
};
use crate::dispatch::flavor::Classify;
use crate::dispatch::handler::HandlerRef;
use crate::dispatch::routing::RoutingTable;
use crate::error::ConfigurationError;
use crate::events::{Bus, Event, EventKind};
use crate::panic::panic_message;
use crate::source::{Scheduler, TimerDriver, scheduler_channel};
use crate::update::Update;

/// Dispatch mode; the modes are mutually exclusive.
pub enum Mode<U: Update> {
    /// One handler for every update.
    Direct(HandlerRef<U>),
    /// Classifier plus flavor-keyed handlers.
    Routed {
        /// Update → flavor.
        classify: Arc<dyn Classify<U>>,
        /// Flavor → handler.
        table: RoutingTable<U>,
    },
    /// Seeder chain over the delegate registry.
    Delegation(SeederChain<U>),
}

impl<U: Update> Mode<U> {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Direct(_) => "direct",
            Mode::Routed { .. } => "routed",
            Mode::Delegation(_) => "delegation",
        }
    }
}

/// Per-runtime dispatcher.
pub struct Dispatcher<U: Update> {
    mode: Mode<U>,
    registry: Arc<DelegateRegistry>,
    executor: Arc<dyn Executor>,
    microphone: Microphone<U>,
    handlers: TaskTracker,
    scheduler: Scheduler<U>,
    timers: Mutex<Option<TimerDriver<U>>>,
    bus: Bus,
}

impl<U: Update> Dispatcher<U> {
    /// Creates a dispatcher with a fresh registry, microphone, handler tracker and
    /// scheduler.
    pub fn new(mode: Mode<U>, executor: Arc<dyn Executor>, bus: Bus) -> Self {
        let (scheduler, timers) = scheduler_channel(bus.clone());
        Self {
            mode,
            registry: Arc::new(DelegateRegistry::new()),
            executor,
            microphone: Microphone::new(),
            handlers: TaskTracker::new(),
            scheduler,
            timers: Mutex::new(Some(timers)),
            bus,
        }
    }

    /// Spawns handler calls on `tracker` (e.g. the one the delegates run on).
    pub fn with_tracker(mut self, tracker: TaskTracker) -> Self {
        self.handlers = tracker;
        self
    }

    /// The registry backing delegation mode.
    pub fn registry(&self) -> &Arc<DelegateRegistry> {
        &self.registry
    }

    /// The microphone updates are broadcast on.
    pub fn microphone(&self) -> &Microphone<U> {
        &self.microphone
    }

    /// The configured mode.
    pub fn mode(&self) -> &Mode<U> {
        &self.mode
    }

    /// Tracker of in-flight handler calls.
    pub fn handlers(&self) -> &TaskTracker {
        &self.handlers
    }

    /// Scheduler feeding timed updates back into this dispatcher.
    pub fn scheduler(&self) -> &Scheduler<U> {
        &self.scheduler
    }

    /// Takes the timer driver; `None` once taken.
    pub(crate) fn take_timers(&self) -> Option<TimerDriver<U>> {
        self.timers.lock().take()
    }

    /// Dispatches one update.
    ///
    /// Returns the resolutions in seeder-chain order (empty outside delegation mode).
    /// Handler calls are spawned, not awaited.
    pub async fn dispatch(&self, update: Arc<U>) -> Result<Vec<Resolution>, ConfigurationError> {
        self.microphone.send(&update);

        match &self.mode {
            Mode::Direct(handler) => {
                self.call(handler, update);
                Ok(Vec::new())
            }
            Mode::Routed { classify, table } => {
                let flavor = classify.classify(&update);
                let handler = table
                    .get(flavor)
                    .ok_or(ConfigurationError::UnhandledFlavor(flavor))?;
                self.call(handler, update);
                Ok(Vec::new())
            }
            Mode::Delegation(chain) => Ok(self.delegate(chain, &update)),
        }
    }

    fn call(&self, handler: &HandlerRef<U>, update: Arc<U>) {
        let handler = Arc::clone(handler);
        let bus = self.bus.clone();
        self.handlers.spawn(async move {
            let seq = update.seq();
            let reason = match AssertUnwindSafe(handler.handle(update)).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("handler panicked: {}", panic_message(payload.as_ref())),
            };
            tracing::warn!(update = seq, %reason, "handler failed");
            bus.publish(
                Event::new(EventKind::HandlerFailed)
                    .with_update(seq)
                    .with_reason(reason),
            );
        });
    }

    fn delegate(&self, chain: &SeederChain<U>, update: &Arc<U>) -> Vec<Resolution> {
        let seq = update.seq();
        let mut out = Vec::with_capacity(chain.len());

        for (idx, pattern) in chain.iter() {
            let seed = pattern.seed(update);
            let res = self.registry.resolve(idx, &seed, || {
                let ctx = SeedContext {
                    microphone: self.microphone.clone(),
                    scheduler: self.scheduler.clone(),
                    update: Arc::clone(update),
                    seed: seed.clone(),
                    pattern: idx,
                };
                DelegateHandle::new(
                    format!("{idx}#{seed}"),
                    pattern.delegate(ctx),
                    Arc::clone(&self.executor),
                )
            });

            let outcome = match &res {
                Resolution::Absent => None,
                Resolution::Reused(h) => Some((EventKind::DelegateReused, h, None)),
                Resolution::Spawned(h) | Resolution::FannedOut(h) => {
                    Some((EventKind::DelegateSpawned, h, None))
                }
                Resolution::Failed { handle, error } => {
                    Some((EventKind::DelegateFailed, handle, Some(error.to_string())))
                }
            };
            if let Some((kind, handle, reason)) = outcome {
                let mut ev = Event::new(kind)
                    .with_pattern(idx)
                    .with_seed(seed.to_string())
                    .with_delegate(handle.id())
                    .with_update(seq);
                match reason {
                    Some(reason) => {
                        tracing::warn!(pattern = idx, %seed, delegate = handle.id(), update = seq, %reason, "delegate failed to start");
                        ev = ev.with_reason(reason);
                    }
                    None => {
                        tracing::debug!(pattern = idx, %seed, delegate = handle.id(), update = seq, ?kind, "seed resolved");
                    }
                }
                self.bus.publish(ev);
            }
            out.push(res);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::{
        Delegate, DelegationPattern, Seed, TokioExecutor, call, per_update, startable,
    };
    use crate::dispatch::flavor::Flavor;
    use crate::dispatch::handler::HandlerFn;
    use crate::error::{DelegateError, HandlerError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct Msg {
        seq: u64,
        flavor: Flavor,
    }

    impl Update for Msg {
        fn seq(&self) -> u64 {
            self.seq
        }
    }

    fn msg(seq: u64, flavor: Flavor) -> Arc<Msg> {
        Arc::new(Msg { seq, flavor })
    }

    fn dispatcher(mode: Mode<Msg>, bus: &Bus) -> Dispatcher<Msg> {
        Dispatcher::new(mode, Arc::new(TokioExecutor::new(bus.clone())), bus.clone())
    }

    async fn settle(d: &Dispatcher<Msg>) {
        d.handlers().close();
        d.handlers().wait().await;
        d.handlers().reopen();
    }

    fn counting(counter: &Arc<AtomicUsize>) -> HandlerRef<Msg> {
        let counter = Arc::clone(counter);
        HandlerFn::arc(move |_m: Arc<Msg>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(())
            }
        })
    }

    #[tokio::test]
    async fn routed_update_calls_exactly_its_handler() {
        let bus = Bus::new(16);
        let chats = Arc::new(AtomicUsize::new(0));
        let queries = Arc::new(AtomicUsize::new(0));
        let table = RoutingTable::new()
            .route_ref(Flavor::Chat, counting(&chats))
            .route_ref(Flavor::InlineQuery, counting(&queries));
        let d = dispatcher(
            Mode::Routed {
                classify: Arc::new(|m: &Msg| m.flavor),
                table,
            },
            &bus,
        );

        d.dispatch(msg(1, Flavor::Chat)).await.unwrap();
        settle(&d).await;
        assert_eq!(chats.load(Ordering::SeqCst), 1);
        assert_eq!(queries.load(Ordering::SeqCst), 0);

        let err = d.dispatch(msg(2, Flavor::Poll)).await.unwrap_err();
        assert_eq!(err, ConfigurationError::UnhandledFlavor(Flavor::Poll));
    }

    #[tokio::test]
    async fn handler_failures_do_not_stop_dispatch() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handler: HandlerRef<Msg> = HandlerFn::arc(move |m: Arc<Msg>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match m.seq {
                    1 => Err(HandlerError::new("bad input")),
                    2 => panic!("boom"),
                    _ => Ok(()),
                }
            }
        });
        let d = dispatcher(Mode::Direct(handler), &bus);

        for seq in 1..=3 {
            d.dispatch(msg(seq, Flavor::Chat)).await.unwrap();
        }
        settle(&d).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        let mut failures: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind == EventKind::HandlerFailed)
            .collect();
        failures.sort_by_key(|e| e.update_seq);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].update_seq, Some(1));
        assert!(failures[0].reason.as_deref().unwrap().contains("bad input"));
        assert_eq!(failures[1].update_seq, Some(2));
        assert!(failures[1].reason.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn stuck_handler_does_not_hold_up_dispatch() {
        let bus = Bus::new(16);
        let (tx, mut handled) = mpsc::unbounded_channel();
        let handler: HandlerRef<Msg> = HandlerFn::arc(move |m: Arc<Msg>| {
            let tx = tx.clone();
            async move {
                if m.seq == 1 {
                    std::future::pending::<()>().await;
                }
                let _ = tx.send(m.seq);
                Ok::<_, HandlerError>(())
            }
        });
        let d = dispatcher(Mode::Direct(handler), &bus);

        d.dispatch(msg(1, Flavor::Chat)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), d.dispatch(msg(2, Flavor::Chat)))
            .await
            .expect("dispatch blocked behind a stuck handler")
            .unwrap();
        assert_eq!(handled.recv().await, Some(2));
        assert_eq!(d.handlers().len(), 1);
    }

    #[tokio::test]
    async fn delegate_start_failure_is_reported_and_dispatch_goes_on() {
        struct Refuses;
        impl Delegate for Refuses {
            fn start(&self) -> Result<(), DelegateError> {
                Err(DelegateError::failed("out of workers"))
            }
            fn is_alive(&self) -> bool {
                false
            }
        }

        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let chain = SeederChain::new(vec![
            DelegationPattern::new(|_: &Msg| 7i64, startable(|_ctx: SeedContext<Msg>| Refuses)),
            DelegationPattern::new(
                |_: &Msg| "after",
                call(|_ctx: SeedContext<Msg>| async { Ok::<_, DelegateError>(()) }),
            ),
        ]);
        let d = dispatcher(Mode::Delegation(chain), &bus);

        for seq in 1..=2 {
            let res = d.dispatch(msg(seq, Flavor::Chat)).await.unwrap();
            match &res[0] {
                Resolution::Failed { error, .. } => {
                    assert_eq!(*error, DelegateError::failed("out of workers"));
                }
                other => panic!("expected a failed start, got {other:?}"),
            }
            assert!(res[1].handle().is_some());
        }

        let failed: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind == EventKind::DelegateFailed && e.pattern == Some(0))
            .collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].seed.as_deref(), Some("7"));
        assert_eq!(failed[0].update_seq, Some(1));
        assert!(failed[0].reason.as_deref().unwrap().contains("out of workers"));
        assert!(d.registry().get(0, &crate::delegation::SeedKey::Int(7)).is_none());
    }

    #[tokio::test]
    async fn seeder_chain_resolves_in_configured_order() {
        let bus = Bus::new(64);
        let log: Arc<parking_lot::Mutex<Vec<Seed>>> = Arc::default();
        let recorder = |log: &Arc<parking_lot::Mutex<Vec<Seed>>>| {
            let log = Arc::clone(log);
            call(move |ctx: SeedContext<Msg>| {
                log.lock().push(ctx.seed.clone());
                async { Ok::<_, DelegateError>(()) }
            })
        };
        let chain = SeederChain::new(vec![
            DelegationPattern::new(|_: &Msg| "X", recorder(&log)),
            DelegationPattern::new(|_: &Msg| "Y", recorder(&log)),
        ]);
        let d = dispatcher(Mode::Delegation(chain), &bus);

        for seq in 0..3 {
            let res = d.dispatch(msg(seq, Flavor::Chat)).await.unwrap();
            assert_eq!(res.len(), 2);
            // let the one-shot delegates finish so the next update respawns them
            while d.registry().live() > 0 {
                tokio::task::yield_now().await;
            }
        }
        let expected: Vec<Seed> = ["X", "Y", "X", "Y", "X", "Y"].map(Seed::from).into();
        assert_eq!(*log.lock(), expected);
    }

    #[tokio::test]
    async fn live_delegates_hear_later_updates() {
        let bus = Bus::new(64);
        let heard = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&heard);
        let chain = SeederChain::new(vec![DelegationPattern::new(
            |_: &Msg| 1i64,
            call(move |ctx: SeedContext<Msg>| {
                let counter = Arc::clone(&counter);
                let mut listener = ctx.listener();
                listener.capture(|m: &Msg| m.flavor == Flavor::Chat);
                async move {
                    for _ in 0..2 {
                        listener
                            .wait()
                            .await
                            .map_err(|e| DelegateError::failed(e.to_string()))?;
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok::<_, DelegateError>(())
                }
            }),
        )]);
        let d = dispatcher(Mode::Delegation(chain), &bus);

        let first = d.dispatch(msg(1, Flavor::Chat)).await.unwrap();
        assert!(matches!(first[0], Resolution::Spawned(_)));
        for seq in 2..=3 {
            let res = d.dispatch(msg(seq, Flavor::Chat)).await.unwrap();
            assert!(matches!(res[0], Resolution::Reused(_)));
        }
        while d.registry().live() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(heard.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fanout_pattern_spawns_per_update() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let chain = SeederChain::new(vec![DelegationPattern::new(
            per_update::<Msg>(),
            call(|_ctx: SeedContext<Msg>| async { Ok::<_, DelegateError>(()) }),
        )]);
        let d = dispatcher(Mode::Delegation(chain), &bus);

        for seq in 0..4 {
            let res = d.dispatch(msg(seq, Flavor::Chat)).await.unwrap();
            assert!(matches!(res[0], Resolution::FannedOut(_)));
        }
        assert!(d.registry().is_empty());
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::DelegateSpawned);
        assert_eq!(ev.pattern, Some(0));
    }
}
