//! # Delegates: independently executing units of work.
//!
//! A delegator factory may produce a delegate in three shapes, modelled by the tagged
//! variant [`Delegation`]:
//! - [`Delegation::Startable`]: an object with its own `start`/`is_alive` ([`Delegate`])
//! - [`Delegation::Call`]: a deferred unit of work (a boxed future)
//! - [`Delegation::CallWith`]: a deferred call with bound arguments, invoked at start
//!
//! The dispatcher normalizes all three into one [`DelegateHandle`]. Deferred shapes are
//! handed to the [`Executor`](crate::Executor) only when the handle is started.
//!
//! ## Rules
//! - `start()` is called **exactly once**; a second call fails with
//!   [`DelegateError::AlreadyStarted`].
//! - `is_alive()` is `false` before start and eventually `false` after the work ends.
//! - A handle is a liveness probe: holding one never keeps work running, and dropping
//!   every handle never stops it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::delegation::executor::{Executor, Liveness};
use crate::error::DelegateError;

/// Future run by a deferred delegate.
pub type DelegateFuture = BoxFuture<'static, Result<(), DelegateError>>;

/// Process-wide delegate id counter.
static DELEGATE_ID: AtomicU64 = AtomicU64::new(1);

/// # Startable delegate object.
///
/// Implement this for delegates that manage their own execution (a dedicated thread,
/// an actor, an external process).
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use seedvisor::{Delegate, DelegateError};
///
/// struct Flag(AtomicBool);
///
/// impl Delegate for Flag {
///     fn start(&self) -> Result<(), DelegateError> {
///         if self.0.swap(true, Ordering::SeqCst) {
///             return Err(DelegateError::AlreadyStarted);
///         }
///         Ok(())
///     }
///
///     fn is_alive(&self) -> bool {
///         self.0.load(Ordering::SeqCst)
///     }
/// }
/// ```
pub trait Delegate: Send + Sync + 'static {
    /// Begins execution. Called exactly once.
    fn start(&self) -> Result<(), DelegateError>;

    /// Liveness probe; must eventually report `false` once execution ends.
    fn is_alive(&self) -> bool;
}

/// What a delegator factory returns.
pub enum Delegation {
    /// A self-managing delegate object.
    Startable(Box<dyn Delegate>),
    /// A unit of work, spawned on the executor at start.
    Call(DelegateFuture),
    /// A call with bound arguments, invoked and spawned at start.
    CallWith(Box<dyn FnOnce() -> DelegateFuture + Send>),
}

impl Delegation {
    /// Wraps a startable object.
    pub fn startable(delegate: impl Delegate) -> Self {
        Delegation::Startable(Box::new(delegate))
    }

    /// Wraps a unit of work.
    pub fn call<Fut>(work: Fut) -> Self
    where
        Fut: Future<Output = Result<(), DelegateError>> + Send + 'static,
    {
        Delegation::Call(Box::pin(work))
    }

    /// Binds `args` to `func`; `func(args)` runs only when the delegate starts.
    pub fn call_with<F, A, Fut>(func: F, args: A) -> Self
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<(), DelegateError>> + Send + 'static,
    {
        Delegation::CallWith(Box::new(move || Box::pin(func(args)) as DelegateFuture))
    }

    fn shape(&self) -> &'static str {
        match self {
            Delegation::Startable(_) => "startable",
            Delegation::Call(_) => "call",
            Delegation::CallWith(_) => "call_with",
        }
    }
}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Delegation").field(&self.shape()).finish()
    }
}

/// Uniform handle to a delegate, whatever shape it was produced in.
#[derive(Clone)]
pub struct DelegateHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    label: Arc<str>,
    body: Body,
}

enum Body {
    Startable(Box<dyn Delegate>),
    Deferred {
        executor: Arc<dyn Executor>,
        state: Mutex<Deferred>,
    },
}

enum Deferred {
    Pending(Delegation),
    Running(Box<dyn Liveness>),
    Taken,
}

impl DelegateHandle {
    /// Normalizes a factory result into a handle. Deferred shapes run on `executor`.
    pub fn new(label: impl Into<Arc<str>>, delegation: Delegation, executor: Arc<dyn Executor>) -> Self {
        let body = match delegation {
            Delegation::Startable(d) => Body::Startable(d),
            deferred => Body::Deferred {
                executor,
                state: Mutex::new(Deferred::Pending(deferred)),
            },
        };
        Self {
            inner: Arc::new(HandleInner {
                id: DELEGATE_ID.fetch_add(1, Ordering::Relaxed),
                label: label.into(),
                body,
            }),
        }
    }

    /// Process-unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Human-readable label (`pattern#seed`).
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Begins execution. Must be called exactly once.
    pub fn start(&self) -> Result<(), DelegateError> {
        match &self.inner.body {
            Body::Startable(d) => d.start(),
            Body::Deferred { executor, state } => {
                let mut state = state.lock();
                let work = match std::mem::replace(&mut *state, Deferred::Taken) {
                    Deferred::Pending(Delegation::Call(fut)) => fut,
                    Deferred::Pending(Delegation::CallWith(bound)) => bound(),
                    Deferred::Pending(Delegation::Startable(_)) | Deferred::Taken => {
                        return Err(DelegateError::AlreadyStarted);
                    }
                    running @ Deferred::Running(_) => {
                        *state = running;
                        return Err(DelegateError::AlreadyStarted);
                    }
                };
                *state = Deferred::Running(executor.execute(self.inner.id, &self.inner.label, work));
                Ok(())
            }
        }
    }

    /// Liveness probe.
    pub fn is_alive(&self) -> bool {
        match &self.inner.body {
            Body::Startable(d) => d.is_alive(),
            Body::Deferred { state, .. } => match &*state.lock() {
                Deferred::Running(l) => !l.is_finished(),
                Deferred::Pending(_) | Deferred::Taken => false,
            },
        }
    }

    /// True if both handles refer to the same delegate.
    pub fn ptr_eq(&self, other: &DelegateHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DelegateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateHandle")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .finish()
    }
}
