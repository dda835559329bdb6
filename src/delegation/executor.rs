//! # Executor: where delegate work runs.
//!
//! [`Executor`] decouples the runtime from the concrete concurrency primitive: it starts
//! a unit of work and returns a [`Liveness`] probe for it. The default
//! [`TokioExecutor`] spawns each delegate as a tokio task and reports its outcome on the
//! event bus.
//!
//! ## Outcome reporting (TokioExecutor)
//! ```text
//! execute(id, label, work) ──► tracker.spawn(catch_unwind(work))
//!                                   ├─ Ok(())    → DelegateFinished
//!                                   ├─ Err(e)    → DelegateFailed   (isolated)
//!                                   └─ panic     → DelegatePanicked (isolated)
//! ```
//!
//! Failures never reach the dispatch path. Stopping the runtime does not abort running
//! delegates; [`TokioExecutor::drain`] only *waits* for them.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::delegation::delegate::DelegateFuture;
use crate::error::{DelegateError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::panic::panic_message;

/// Probe reporting whether a started unit of work has finished.
pub trait Liveness: Send + Sync + 'static {
    /// True once the work has completed (successfully or not).
    fn is_finished(&self) -> bool;
}

impl<T: Send + 'static> Liveness for JoinHandle<T> {
    fn is_finished(&self) -> bool {
        JoinHandle::is_finished(self)
    }
}

/// Starts units of delegate work.
pub trait Executor: Send + Sync + 'static {
    /// Begins executing `work` concurrently and returns its liveness probe.
    ///
    /// Must not block; `id` and `label` identify the delegate in reports.
    fn execute(&self, id: u64, label: &str, work: DelegateFuture) -> Box<dyn Liveness>;
}

/// Tokio-backed executor: one task per delegate.
#[derive(Clone)]
pub struct TokioExecutor {
    bus: Bus,
    tracker: TaskTracker,
}

impl TokioExecutor {
    /// Creates an executor that reports delegate outcomes on `bus`.
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            tracker: TaskTracker::new(),
        }
    }

    /// Number of delegates (and handler calls sharing the tracker) still running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `grace` for every spawned delegate to finish.
    ///
    /// Delegates are never cancelled; on timeout they keep running and
    /// [`RuntimeError::GraceExceeded`] reports how many were left.
    pub async fn drain(&self, grace: Duration) -> Result<(), RuntimeError> {
        drain(&self.tracker, grace).await
    }

    /// Tracker the delegates are spawned on; handler calls may share it.
    pub(crate) fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }
}

/// Waits up to `grace` for the tasks of `tracker` without aborting them.
pub(crate) async fn drain(tracker: &TaskTracker, grace: Duration) -> Result<(), RuntimeError> {
    tracker.close();
    let res = tokio::time::timeout(grace, tracker.wait()).await;
    tracker.reopen();
    match res {
        Ok(()) => Ok(()),
        Err(_) => Err(RuntimeError::GraceExceeded {
            grace,
            running: tracker.len(),
        }),
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, id: u64, label: &str, work: DelegateFuture) -> Box<dyn Liveness> {
        let bus = self.bus.clone();
        let label: Arc<str> = label.into();

        let join = self.tracker.spawn(async move {
            let outcome = match std::panic::AssertUnwindSafe(work).catch_unwind().await {
                Ok(res) => res,
                Err(payload) => Err(DelegateError::Panicked {
                    info: panic_message(payload.as_ref()),
                }),
            };
            report(&bus, id, &label, outcome);
        });
        Box::new(join)
    }
}

fn report(bus: &Bus, id: u64, label: &str, outcome: Result<(), DelegateError>) {
    match outcome {
        Ok(()) => bus.publish(
            Event::new(EventKind::DelegateFinished)
                .with_delegate(id)
                .with_reason(label),
        ),
        Err(DelegateError::Panicked { info }) => {
            tracing::error!(delegate = id, label, %info, "delegate panicked");
            bus.publish(
                Event::new(EventKind::DelegatePanicked)
                    .with_delegate(id)
                    .with_reason(format!("{label}: {info}")),
            );
        }
        Err(e) => {
            tracing::warn!(delegate = id, label, err = %e, "delegate failed");
            bus.publish(
                Event::new(EventKind::DelegateFailed)
                    .with_delegate(id)
                    .with_reason(format!("{label}: {e}")),
            );
        }
    }
}
