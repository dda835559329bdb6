//! # Delegation: seeds, delegates, and their lifecycle.
//!
//! - [`seed`] the three-case seed model ([`Seed`], [`SeedKey`]);
//! - [`seeder`] seeders, delegator factories, patterns and the [`SeederChain`];
//! - [`delegate`] the [`Delegation`] variant and the uniform [`DelegateHandle`];
//! - [`registry`] the per-runtime [`DelegateRegistry`] with lazy liveness GC;
//! - [`executor`] the [`Executor`] seam and its tokio implementation;
//! - [`listener`] the [`Microphone`]/[`Listener`] channel for follow-up updates.

pub mod delegate;
pub mod executor;
pub mod listener;
pub mod registry;
pub mod seed;
pub mod seeder;

pub use delegate::{Delegate, DelegateFuture, DelegateHandle, Delegation};
pub use executor::{Executor, Liveness, TokioExecutor};
pub use listener::{Listener, Microphone};
pub use registry::{DelegateRegistry, Resolution};
pub use seed::{Seed, SeedKey};
pub use seeder::{
    DelegationPattern, Delegator, SeedContext, Seeder, SeederChain, SeederRef, Until, call,
    call_with, chain, pair, per_application, per_key, per_update, startable, until,
};
