//! # Seeders, delegator factories and the seeder chain.
//!
//! A [`DelegationPattern`] pairs one [`Seeder`] with one delegator factory. The
//! [`SeederChain`] is the ordered, immutable list of patterns a runtime evaluates for
//! every update: **all** patterns run, in configured order, so one update may start
//! several delegates (one per pattern) while each pattern keeps at most one live
//! delegate per seed.
//!
//! ## Example
//! ```
//! use seedvisor::{
//!     DelegateError, DelegationPattern, SeedContext, SeederChain, call, per_application, per_key,
//! };
//!
//! struct Msg { chat: i64 }
//!
//! async fn noop(_ctx: SeedContext<Msg>) -> Result<(), DelegateError> {
//!     Ok(())
//! }
//!
//! let chain = SeederChain::new(vec![
//!     DelegationPattern::new(per_key(|m: &Msg| Some(m.chat)), call(noop)),
//!     DelegationPattern::new(per_application(), call(noop)),
//! ]);
//! assert_eq!(chain.len(), 2);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::delegation::delegate::{Delegate, Delegation};
use crate::delegation::listener::{Listener, Microphone};
use crate::delegation::seed::{Seed, SeedKey};
use crate::error::DelegateError;
use crate::source::Scheduler;

/// Derives a [`Seed`] from an update.
///
/// Implemented for every `Fn(&U) -> S` where `S: Into<Seed>`.
pub trait Seeder<U>: Send + Sync + 'static {
    /// Computes the seed of `update` for this seeder.
    fn seed(&self, update: &U) -> Seed;
}

impl<U, F, S> Seeder<U> for F
where
    F: Fn(&U) -> S + Send + Sync + 'static,
    S: Into<Seed>,
{
    fn seed(&self, update: &U) -> Seed {
        self(update).into()
    }
}

/// Shared handle to a seeder.
pub type SeederRef<U> = Arc<dyn Seeder<U>>;

/// Everything a delegator factory gets to build a delegate.
pub struct SeedContext<U> {
    /// Runtime microphone; delegates open listeners on it to hear later updates.
    pub microphone: Microphone<U>,
    /// The update that caused the spawn.
    pub update: Arc<U>,
    /// The seed the delegate will own.
    pub seed: Seed,
    /// Index of the pattern in the seeder chain.
    pub pattern: usize,
    /// Runtime scheduler; delegates set timeouts and timed follow-ups through it.
    pub scheduler: Scheduler<U>,
}

impl<U: Send + Sync + 'static> SeedContext<U> {
    /// Opens a listener on the runtime microphone.
    pub fn listener(&self) -> Listener<U> {
        self.microphone.listener()
    }
}

/// Builds a [`Delegation`] for a freshly seeded update.
pub type Delegator<U> = Arc<dyn Fn(SeedContext<U>) -> Delegation + Send + Sync>;

/// One seeder paired with one delegator factory.
pub struct DelegationPattern<U> {
    seeder: SeederRef<U>,
    delegator: Delegator<U>,
}

impl<U> Clone for DelegationPattern<U> {
    fn clone(&self) -> Self {
        Self {
            seeder: Arc::clone(&self.seeder),
            delegator: Arc::clone(&self.delegator),
        }
    }
}

impl<U: Send + Sync + 'static> DelegationPattern<U> {
    /// Pairs `seeder` with `delegator`.
    pub fn new<S, D>(seeder: S, delegator: D) -> Self
    where
        S: Seeder<U>,
        D: Fn(SeedContext<U>) -> Delegation + Send + Sync + 'static,
    {
        Self {
            seeder: Arc::new(seeder),
            delegator: Arc::new(delegator),
        }
    }

    /// Seeds `update`.
    pub fn seed(&self, update: &U) -> Seed {
        self.seeder.seed(update)
    }

    /// Runs the delegator factory.
    pub fn delegate(&self, ctx: SeedContext<U>) -> Delegation {
        (self.delegator)(ctx)
    }
}

impl<U> fmt::Debug for DelegationPattern<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationPattern").finish_non_exhaustive()
    }
}

/// Ordered, immutable list of delegation patterns.
pub struct SeederChain<U> {
    patterns: Arc<[DelegationPattern<U>]>,
}

impl<U> Clone for SeederChain<U> {
    fn clone(&self) -> Self {
        Self {
            patterns: Arc::clone(&self.patterns),
        }
    }
}

impl<U> SeederChain<U> {
    /// Freezes `patterns` in the given order.
    pub fn new(patterns: Vec<DelegationPattern<U>>) -> Self {
        Self {
            patterns: patterns.into(),
        }
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True if the chain has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Patterns with their index, in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DelegationPattern<U>)> {
        self.patterns.iter().enumerate()
    }
}

impl<U> fmt::Debug for SeederChain<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeederChain")
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

/// Seeder that returns the first seed accepted by a condition.
pub struct Until<U> {
    cond: Box<dyn Fn(&Seed) -> bool + Send + Sync>,
    seeders: Vec<SeederRef<U>>,
}

impl<U: 'static> Seeder<U> for Until<U> {
    fn seed(&self, update: &U) -> Seed {
        self.seeders
            .iter()
            .map(|s| s.seed(update))
            .find(|seed| (self.cond)(seed))
            .unwrap_or(Seed::Absent)
    }
}

/// Keys updates by `f`; `None` means no delegate.
pub fn per_key<U, F, K>(f: F) -> impl Seeder<U>
where
    U: 'static,
    F: Fn(&U) -> Option<K> + Send + Sync + 'static,
    K: Into<SeedKey>,
{
    move |update: &U| Seed::from(f(update))
}

/// One delegate for the whole application.
pub fn per_application<U: 'static>() -> impl Seeder<U> {
    |_: &U| Seed::Key(SeedKey::Int(1))
}

/// A fresh delegate for every update.
pub fn per_update<U: 'static>() -> impl Seeder<U> {
    |_: &U| Seed::fanout()
}

/// Tries `seeders` in turn and returns the first seed satisfying `cond`.
pub fn until<U, C>(cond: C, seeders: Vec<SeederRef<U>>) -> Until<U>
where
    U: 'static,
    C: Fn(&Seed) -> bool + Send + Sync + 'static,
{
    Until {
        cond: Box::new(cond),
        seeders,
    }
}

/// Tries `seeders` in turn and returns the first non-absent seed.
pub fn chain<U: 'static>(seeders: Vec<SeederRef<U>>) -> Until<U> {
    until(|seed: &Seed| !seed.is_absent(), seeders)
}

/// Builds a pattern from one or more seeders; several seeders are chained.
///
/// An empty list yields a pattern that never seeds.
pub fn pair<U, D>(mut seeders: Vec<SeederRef<U>>, delegator: D) -> DelegationPattern<U>
where
    U: Send + Sync + 'static,
    D: Fn(SeedContext<U>) -> Delegation + Send + Sync + 'static,
{
    let seeder: SeederRef<U> = match seeders.len() {
        1 => seeders.remove(0),
        _ => Arc::new(chain(seeders)),
    };
    DelegationPattern {
        seeder,
        delegator: Arc::new(delegator),
    }
}

/// Delegator running `f(ctx)` as a deferred unit of work.
pub fn call<U, F, Fut>(f: F) -> impl Fn(SeedContext<U>) -> Delegation + Send + Sync + 'static
where
    U: Send + Sync + 'static,
    F: Fn(SeedContext<U>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DelegateError>> + Send + 'static,
{
    move |ctx| Delegation::call(f(ctx))
}

/// Delegator binding `ctx` and a clone of `args` to `f`; the call happens at start.
pub fn call_with<U, F, A, Fut>(
    f: F,
    args: A,
) -> impl Fn(SeedContext<U>) -> Delegation + Send + Sync + 'static
where
    U: Send + Sync + 'static,
    F: Fn(SeedContext<U>, A) -> Fut + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DelegateError>> + Send + 'static,
{
    let f = Arc::new(f);
    move |ctx| {
        let f = Arc::clone(&f);
        Delegation::call_with(move |(ctx, args)| f(ctx, args), (ctx, args.clone()))
    }
}

/// Delegator building a self-managing [`Delegate`] object.
pub fn startable<U, F, D>(f: F) -> impl Fn(SeedContext<U>) -> Delegation + Send + Sync + 'static
where
    U: Send + Sync + 'static,
    F: Fn(SeedContext<U>) -> D + Send + Sync + 'static,
    D: Delegate,
{
    move |ctx| Delegation::startable(f(ctx))
}
