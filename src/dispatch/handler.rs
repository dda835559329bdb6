//! # Direct-call handlers.
//!
//! A [`Handler`] processes updates inline on the dispatch path, with no delegate
//! lifecycle at all. [`HandlerFn`] adapts an async closure.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use seedvisor::{Handler, HandlerError, HandlerFn, HandlerRef, Update};
//!
//! struct Ping(u64);
//! impl Update for Ping {
//!     fn seq(&self) -> u64 { self.0 }
//! }
//!
//! let h: HandlerRef<Ping> = HandlerFn::arc(|p: Arc<Ping>| async move {
//!     if p.0 == 0 {
//!         return Err(HandlerError::new("zero"));
//!     }
//!     Ok(())
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::update::Update;

/// # Asynchronous update handler.
///
/// Errors and panics are caught by the dispatcher, reported as
/// `EventKind::HandlerFailed`, and never stop later updates.
#[async_trait]
pub trait Handler<U: Update>: Send + Sync + 'static {
    /// Handles one update.
    async fn handle(&self, update: Arc<U>) -> Result<(), HandlerError>;
}

/// Shared handle to a handler.
pub type HandlerRef<U> = Arc<dyn Handler<U>>;

/// Function-backed handler.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps `f` and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandlerFn")
    }
}

#[async_trait]
impl<U, F, Fut> Handler<U> for HandlerFn<F>
where
    U: Update,
    F: Fn(Arc<U>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, update: Arc<U>) -> Result<(), HandlerError> {
        (self.f)(update).await
    }
}
