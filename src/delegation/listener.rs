//! # Microphone and listeners: how live delegates hear later updates.
//!
//! The registry never forwards an update to the delegate that owns its seed. Instead the
//! dispatcher broadcasts every update through the runtime's [`Microphone`] before
//! resolving seeds, and a delegate that wants follow-up updates holds a [`Listener`]
//! with one or more capture predicates.
//!
//! ```text
//! Dispatcher::dispatch(update)
//!   └─► Microphone::send(Arc<U>) ──┬─► [queue L1] ─► Listener::wait() (delegate #1)
//!                                  ├─► [queue L2] ─► Listener::wait() (delegate #2)
//!                                  └─► (closed queues pruned)
//! ```
//!
//! ## Rules
//! - Queues are unbounded; `send` never blocks the dispatch path.
//! - Dropping a [`Listener`] closes its queue; the microphone forgets it on the next send.
//! - A listener only sees updates broadcast after it was created.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::ListenError;

type Capture<U> = Box<dyn Fn(&U) -> bool + Send + Sync>;

/// Broadcasts dispatched updates to every live [`Listener`].
///
/// Cheap to clone; clones share the same set of listeners.
pub struct Microphone<U> {
    queues: Arc<Mutex<Vec<mpsc::UnboundedSender<Arc<U>>>>>,
}

impl<U> Clone for Microphone<U> {
    fn clone(&self) -> Self {
        Self {
            queues: Arc::clone(&self.queues),
        }
    }
}

impl<U> Default for Microphone<U> {
    fn default() -> Self {
        Self {
            queues: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<U: Send + Sync + 'static> Microphone<U> {
    /// Creates a microphone with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a listener attached to this microphone.
    pub fn listener(&self) -> Listener<U> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.lock().push(tx);
        Listener {
            rx,
            captures: Vec::new(),
            idle: None,
        }
    }

    /// Delivers `update` to every live listener and prunes closed ones.
    pub fn send(&self, update: &Arc<U>) {
        self.queues
            .lock()
            .retain(|tx| tx.send(Arc::clone(update)).is_ok());
    }

    /// Number of attached listeners (closed ones included until the next send).
    pub fn listeners(&self) -> usize {
        self.queues.lock().len()
    }
}

/// Receives the updates broadcast by a [`Microphone`] that match its captures.
pub struct Listener<U> {
    rx: mpsc::UnboundedReceiver<Arc<U>>,
    captures: Vec<Capture<U>>,
    idle: Option<Duration>,
}

impl<U: Send + Sync + 'static> Listener<U> {
    /// Adds a capture predicate. An update matches if any predicate accepts it.
    pub fn capture<F>(&mut self, pattern: F) -> &mut Self
    where
        F: Fn(&U) -> bool + Send + Sync + 'static,
    {
        self.captures.push(Box::new(pattern));
        self
    }

    /// Makes [`wait`](Listener::wait) give up after `timeout` without a matching update.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle = Some(timeout);
        self
    }

    /// Waits for the next update matching one of the captures.
    ///
    /// Fails with [`ListenError::NothingToCapture`] when no capture was registered,
    /// [`ListenError::Idle`] when the idle timeout elapses, and [`ListenError::Closed`]
    /// once the microphone is gone.
    pub async fn wait(&mut self) -> Result<Arc<U>, ListenError> {
        if self.captures.is_empty() {
            return Err(ListenError::NothingToCapture);
        }
        match self.idle {
            None => self.next_match().await,
            Some(timeout) => tokio::time::timeout(timeout, self.next_match())
                .await
                .map_err(|_| ListenError::Idle { timeout })?,
        }
    }

    async fn next_match(&mut self) -> Result<Arc<U>, ListenError> {
        loop {
            let update = self.rx.recv().await.ok_or(ListenError::Closed)?;
            if self.captures.iter().any(|c| c(&update)) {
                return Ok(update);
            }
        }
    }
}
