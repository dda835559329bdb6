//! # seedvisor
//!
//! **Seedvisor** is a dispatch runtime for conversational update streams.
//!
//! Updates arrive from a polling [`Transport`] or through a push [`Feed`], optionally
//! reordered by sequence number, and are dispatched in one of three modes: a single
//! direct [`Handler`], a flavor-keyed [`RoutingTable`], or a chain of
//! [`DelegationPattern`]s that start at most one long-lived delegate per seed. A
//! [`Scheduler`] injects timed updates into the same dispatch path.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐                         ┌──────────────┐
//!     │  Transport   │                         │  Feed::feed  │
//!     │ (pull fetch) │                         │ (webhook)    │
//!     └──────┬───────┘                         └──────┬───────┘
//!            ▼                                        ▼
//!     ┌──────────────┐                         ┌──────────────┐
//!     │    Poller    │                         │  FeedDriver  │──► OrderingBuffer
//!     │ cursor/retry │                         │ (sequential) │    (when ordered)
//!     └──────┬───────┘                         └──────┬───────┘
//!            └──────────────────┬─────────────────────┘   Scheduler ──► TimerDriver
//!                               ▼                                        │ (due)
//!                               ◄────────────────────────────────────────┘
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Dispatcher (one per Runtime)                                     │
//! │  - Microphone (every update → open Listeners)                     │
//! │  - Mode::Direct(handler)               (spawned, tracked)         │
//! │  - Mode::Routed { classify, table }    (spawned, tracked)         │
//! │  - Mode::Delegation(SeederChain) ──► DelegateRegistry ──► Executor│
//! └──────┬────────────────────────────────────────────────────────────┘
//!        │ Publishes Events: DelegateSpawned, DelegateReused,
//!        │ HandlerFailed, FetchFailed, GapSkipped, ...
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                  (capacity: Config::bus_capacity)                 │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       │     (in Runtime)       │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                           (per-sub queues)
//!                        ┌─────────┼─────────┐
//!                        ▼         ▼         ▼
//!                    worker1   worker2   workerN
//! ```
//!
//! ### Delegation
//! ```text
//! update ──► for (idx, pattern) in SeederChain (all patterns, in order)
//!              seed = pattern.seed(update)
//!              ├─ Absent      → nothing
//!              ├─ Fanout(..)  → new delegate, never registered
//!              └─ Key(k)      → registry[(idx, k)]
//!                                 ├─ alive    → DelegateReused
//!                                 ├─ missing / finished → build, start → DelegateSpawned
//!                                 └─ start refused      → DelegateFailed, key left free
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                               |
//! |-------------------|------------------------------------------------------------------|--------------------------------------------------|
//! | **Sources**       | Long polling with retry, or push feed with optional reordering.  | [`Transport`], [`Poller`], [`Feed`], [`OrderingBuffer`] |
//! | **Dispatch**      | Direct handler or flavor-keyed routing table.                    | [`Handler`], [`HandlerFn`], [`RoutingTable`], [`Flavor`] |
//! | **Delegation**    | Seed-keyed delegates with liveness and follow-up listeners.     | [`Seeder`], [`DelegationPattern`], [`DelegateRegistry`], [`Listener`] |
//! | **Execution**     | Pluggable delegate executor.                                     | [`Executor`], [`TokioExecutor`]                  |
//! | **Timers**        | Timed updates for timeouts and follow-ups, cancellable.          | [`Scheduler`], [`Scheduled`]                     |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers). | [`Subscribe`]                                    |
//! | **Policies**      | Retry delays after transport failures.                           | [`BackoffPolicy`], [`JitterPolicy`]              |
//! | **Errors**        | Typed errors per concern.                                        | [`RuntimeError`], [`ConfigurationError`], [`DelegateError`] |
//! | **Configuration** | Centralize runtime settings.                                     | [`Config`]                                       |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use seedvisor::{Config, DelegateError, DelegationPattern, Runtime, SeedContext, SourceKind, Update, call, per_key};
//!
//! struct Msg { seq: u64, chat: i64 }
//! impl Update for Msg {
//!     fn seq(&self) -> u64 { self.seq }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { source: SourceKind::Push, ..Config::default() };
//!
//!     // One delegate per chat
//!     let rt = Runtime::builder(cfg)
//!         .delegate(DelegationPattern::new(
//!             per_key(|m: &Msg| Some(m.chat)),
//!             call(|ctx: SeedContext<Msg>| async move {
//!                 println!("chat {} started", ctx.update.chat);
//!                 Ok::<_, DelegateError>(())
//!             }),
//!         ))
//!         .build()?;
//!
//!     rt.feed()?.feed(Msg { seq: 1, chat: 42 })?;
//!
//!     let token = CancellationToken::new();
//!     token.cancel();
//!     rt.run(token).await?;
//!     Ok(())
//! }
//! ```
mod core;
mod delegation;
mod dispatch;
mod error;
mod events;
mod panic;
mod policies;
mod source;
mod subscribers;
mod update;

// ---- Public re-exports ----

pub use core::{Config, OrderingMode, Runtime, RuntimeBuilder, Signal, SourceKind};
pub use delegation::{
    Delegate, DelegateFuture, DelegateHandle, DelegateRegistry, Delegation, DelegationPattern,
    Delegator, Executor, Listener, Liveness, Microphone, Resolution, Seed, SeedContext, SeedKey,
    Seeder, SeederChain, SeederRef, TokioExecutor, Until, call, call_with, chain, pair,
    per_application, per_key, per_update, startable, until,
};
pub use dispatch::{Classify, Dispatcher, Flavor, Handler, HandlerFn, HandlerRef, Mode, RoutingTable};
pub use error::{
    ConfigurationError, DelegateError, FeedError, HandlerError, ListenError, RuntimeError,
    ScheduleError, TransportError,
};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use source::{
    Admission, Feed, OrderingBuffer, Poller, Scheduled, Scheduler, SkippedGap, SourceState,
    Transport,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use update::Update;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
