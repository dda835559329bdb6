//! # Scheduler: timed updates injected into the dispatch path.
//!
//! A [`Scheduler`] hands an update to the runtime's timer driver together with the
//! instant it becomes due. The driver runs next to the source and dispatches each due
//! update like a fetched or pushed one: microphone first, then the configured mode.
//! Delegates use it for timeouts and timed follow-ups; their listeners hear a timed
//! update like any other.
//!
//! ```text
//! Scheduler::event_at(at, u) ─┐
//! Scheduler::cancel(&ev)     ─┴─► [command queue] ──► TimerDriver (DelayQueue)
//!                                                          │ due, not cancelled
//!                                                          ▼
//!                                     TimerFired ◄── dispatcher.dispatch(u)
//! ```
//!
//! ## Rules
//! - A [`Scheduled`] event either fires or is cancelled, never both.
//! - Timed updates bypass the ordering buffer and the poller cursor.
//! - Scheduling fails with [`ScheduleError::Closed`] once the runtime has stopped;
//!   events still pending at stop never fire.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};

use crate::dispatch::Dispatcher;
use crate::error::{ConfigurationError, ScheduleError};
use crate::events::{Bus, Event, EventKind};
use crate::update::Update;

/// Deadlines further out than this are clamped to it.
const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

static TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one scheduled update; pass it to [`Scheduler::cancel`].
#[derive(Clone, Debug)]
pub struct Scheduled {
    id: u64,
    due: Instant,
    settled: Arc<AtomicBool>,
}

impl Scheduled {
    /// Process-unique timer id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the update becomes due.
    pub fn due(&self) -> Instant {
        self.due
    }

    /// True until the event fires or is cancelled.
    pub fn is_pending(&self) -> bool {
        !self.settled.load(Ordering::Acquire)
    }
}

struct Timer<U> {
    id: u64,
    settled: Arc<AtomicBool>,
    update: Arc<U>,
}

enum Command<U> {
    Insert { timer: Timer<U>, due: Instant },
    Cancel(u64),
}

/// Schedules updates for later dispatch. Cheap to clone.
pub struct Scheduler<U> {
    tx: mpsc::UnboundedSender<Command<U>>,
}

impl<U> Clone for Scheduler<U> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<U: Update> Scheduler<U> {
    /// Dispatches `update` at `at` (immediately if `at` has passed).
    pub fn event_at(&self, at: Instant, update: U) -> Result<Scheduled, ScheduleError> {
        let scheduled = Scheduled {
            id: TIMER_ID.fetch_add(1, Ordering::Relaxed),
            due: at,
            settled: Arc::new(AtomicBool::new(false)),
        };
        let timer = Timer {
            id: scheduled.id,
            settled: Arc::clone(&scheduled.settled),
            update: Arc::new(update),
        };
        self.tx
            .send(Command::Insert { timer, due: at })
            .map_err(|_| ScheduleError::Closed)?;
        Ok(scheduled)
    }

    /// Dispatches `update` once `delay` has elapsed.
    pub fn event_later(&self, delay: Duration, update: U) -> Result<Scheduled, ScheduleError> {
        self.event_at(Instant::now() + delay.min(MAX_DELAY), update)
    }

    /// Dispatches `update` as soon as the timer driver gets to it.
    pub fn event_now(&self, update: U) -> Result<Scheduled, ScheduleError> {
        self.event_at(Instant::now(), update)
    }

    /// Cancels `event`. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self, event: &Scheduled) -> bool {
        if event.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.send(Command::Cancel(event.id));
        true
    }
}

/// Creates a connected scheduler and timer driver.
pub(crate) fn channel<U>(bus: Bus) -> (Scheduler<U>, TimerDriver<U>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Scheduler { tx },
        TimerDriver {
            rx,
            queue: DelayQueue::new(),
            keys: HashMap::new(),
            bus,
        },
    )
}

/// Owns the pending timers of one runtime and dispatches them when due.
pub(crate) struct TimerDriver<U> {
    rx: mpsc::UnboundedReceiver<Command<U>>,
    queue: DelayQueue<Timer<U>>,
    keys: HashMap<u64, delay_queue::Key>,
    bus: Bus,
}

impl<U: Update> TimerDriver<U> {
    /// Fires due timers until `token` is cancelled.
    ///
    /// A configuration error raised while dispatching a timed update is returned.
    pub(crate) async fn run(
        &mut self,
        dispatcher: &Dispatcher<U>,
        token: &CancellationToken,
    ) -> Result<(), ConfigurationError> {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(cmd) = self.rx.recv() => self.apply(cmd),
                Some(expired) = self.queue.next() => {
                    self.fire(expired.into_inner(), dispatcher).await?;
                }
            }
        }
        tracing::debug!(pending = self.queue.len(), "timers stopped");
        Ok(())
    }

    fn apply(&mut self, cmd: Command<U>) {
        match cmd {
            Command::Insert { timer, due } => {
                let id = timer.id;
                let key = self.queue.insert_at(timer, due.min(Instant::now() + MAX_DELAY));
                self.keys.insert(id, key);
            }
            Command::Cancel(id) => {
                if let Some(key) = self.keys.remove(&id) {
                    self.queue.try_remove(&key);
                }
            }
        }
    }

    async fn fire(&mut self, timer: Timer<U>, dispatcher: &Dispatcher<U>) -> Result<(), ConfigurationError> {
        self.keys.remove(&timer.id);
        if timer.settled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let seq = timer.update.seq();
        tracing::debug!(timer = timer.id, update = seq, "timer fired");
        self.bus.publish(
            Event::new(EventKind::TimerFired)
                .with_update(seq)
                .with_reason(timer.id.to_string()),
        );
        dispatcher.dispatch(timer.update).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::{Listener, TokioExecutor};
    use crate::dispatch::{HandlerFn, HandlerRef, Mode};
    use crate::error::HandlerError;

    #[derive(Debug)]
    struct Tick(u64);

    impl Update for Tick {
        fn seq(&self) -> u64 {
            self.0
        }
    }

    fn dispatcher(bus: &Bus) -> (Dispatcher<Tick>, Listener<Tick>) {
        let handler: HandlerRef<Tick> = HandlerFn::arc(|_t: Arc<Tick>| async { Ok::<_, HandlerError>(()) });
        let exec = Arc::new(TokioExecutor::new(bus.clone()));
        let d = Dispatcher::new(Mode::Direct(handler), exec, bus.clone());
        let mut heard = d.microphone().listener();
        heard.capture(|_t: &Tick| true);
        (d, heard)
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_in_deadline_order() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let (d, mut heard) = dispatcher(&bus);
        let scheduler = d.scheduler().clone();
        let mut timers = d.take_timers().unwrap();
        let token = CancellationToken::new();

        let stop = token.clone();
        let run = tokio::spawn(async move { timers.run(&d, &token).await });

        let start = Instant::now();
        scheduler.event_later(Duration::from_secs(3), Tick(3)).unwrap();
        scheduler.event_later(Duration::from_secs(1), Tick(1)).unwrap();
        scheduler.event_now(Tick(0)).unwrap();

        for expected in [0, 1, 3] {
            assert_eq!(heard.wait().await.unwrap().0, expected);
            assert!(start.elapsed() >= Duration::from_secs(expected));
        }
        stop.cancel();
        run.await.unwrap().unwrap();

        let fired = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.kind == EventKind::TimerFired)
            .count();
        assert_eq!(fired, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let bus = Bus::new(64);
        let (d, mut heard) = dispatcher(&bus);
        let scheduler = d.scheduler().clone();
        let mut timers = d.take_timers().unwrap();
        let token = CancellationToken::new();

        let stop = token.clone();
        let run = tokio::spawn(async move { timers.run(&d, &token).await });

        let early = scheduler.event_later(Duration::from_secs(1), Tick(1)).unwrap();
        let late = scheduler.event_later(Duration::from_secs(2), Tick(2)).unwrap();
        assert!(scheduler.cancel(&early));
        assert!(!scheduler.cancel(&early));
        assert!(!early.is_pending());
        assert!(late.is_pending());

        assert_eq!(heard.wait().await.unwrap().0, 2);
        assert!(!late.is_pending());
        assert!(!scheduler.cancel(&late));

        stop.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn scheduling_fails_once_the_driver_is_gone() {
        let bus = Bus::new(8);
        let (d, _heard) = dispatcher(&bus);
        drop(d.take_timers());
        assert!(d.take_timers().is_none());
        assert_eq!(
            d.scheduler().event_now(Tick(1)).unwrap_err(),
            ScheduleError::Closed
        );
    }
}
