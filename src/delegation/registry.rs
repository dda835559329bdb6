//! # Delegate registry: seed → live delegate index.
//!
//! The registry remembers, per pattern and hashable seed, the most recently created
//! [`DelegateHandle`]. It is a lookup aid only: handles are liveness probes, the work
//! itself is owned by the executor (or by the user's startable object).
//!
//! ## Resolve
//! ```text
//! resolve(pattern, seed, factory)
//!   ├─ Seed::Absent     → Resolution::Absent          (factory not called)
//!   ├─ Seed::Fanout     → factory() → start()         → Resolution::FannedOut
//!   └─ Seed::Key(k)     → lock slot (pattern, k)
//!        ├─ slot alive  → Resolution::Reused          (no factory, no start)
//!        └─ empty / dead → factory() → start() → store → Resolution::Spawned
//!   (start() failed      → Resolution::Failed, slot left empty)
//! ```
//!
//! ## Rules
//! - At most one live handle per `(pattern, key)`.
//! - Every key owns a slot with its own lock. The map's shard lock is held only to
//!   find or create the slot, so resolves of one key serialize while other keys go
//!   ahead, even when they hash to the same shard.
//! - Dead entries are replaced lazily on the next lookup; [`DelegateRegistry::purge`]
//!   sweeps them on demand.
//! - The factory and `start()` must not resolve the same key again.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::delegation::delegate::DelegateHandle;
use crate::delegation::seed::{Seed, SeedKey};
use crate::error::DelegateError;

/// Outcome of [`DelegateRegistry::resolve`].
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The seeder wanted no delegate.
    Absent,
    /// A new delegate was created, registered and started.
    Spawned(DelegateHandle),
    /// A live delegate already owns the seed.
    Reused(DelegateHandle),
    /// A new unregistered delegate was created and started (fan-out).
    FannedOut(DelegateHandle),
    /// A new delegate was created but refused to start; nothing was registered.
    Failed {
        /// The delegate that failed to start.
        handle: DelegateHandle,
        /// Why it did not start.
        error: DelegateError,
    },
}

impl Resolution {
    /// The handle involved, if any.
    pub fn handle(&self) -> Option<&DelegateHandle> {
        match self {
            Resolution::Absent => None,
            Resolution::Spawned(h)
            | Resolution::Reused(h)
            | Resolution::FannedOut(h)
            | Resolution::Failed { handle: h, .. } => Some(h),
        }
    }

    /// True if a delegate was started by this resolution.
    pub fn is_spawn(&self) -> bool {
        matches!(self, Resolution::Spawned(_) | Resolution::FannedOut(_))
    }
}

type Slot = Arc<Mutex<Option<DelegateHandle>>>;

/// In-memory index of live delegates, scoped to one runtime.
#[derive(Debug, Default)]
pub struct DelegateRegistry {
    entries: DashMap<(usize, SeedKey), Slot>,
}

impl DelegateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `seed` of pattern `pattern` to a delegate, spawning one through
    /// `factory` if needed.
    ///
    /// Only resolves of the same key wait for each other. A freshly created handle
    /// that fails to start yields [`Resolution::Failed`]; the key stays free, and the
    /// next update with that seed tries again.
    pub fn resolve<F>(&self, pattern: usize, seed: &Seed, factory: F) -> Resolution
    where
        F: FnOnce() -> DelegateHandle,
    {
        let key = match seed {
            Seed::Absent => return Resolution::Absent,
            Seed::Fanout(_) => {
                let handle = factory();
                return match handle.start() {
                    Ok(()) => Resolution::FannedOut(handle),
                    Err(error) => Resolution::Failed { handle, error },
                };
            }
            Seed::Key(key) => (pattern, key.clone()),
        };

        let slot = Arc::clone(self.entries.entry(key).or_default().value());
        let mut current = slot.lock();
        if let Some(live) = current.as_ref().filter(|h| h.is_alive()) {
            return Resolution::Reused(live.clone());
        }

        let handle = factory();
        match handle.start() {
            Ok(()) => {
                *current = Some(handle.clone());
                Resolution::Spawned(handle)
            }
            Err(error) => {
                *current = None;
                Resolution::Failed { handle, error }
            }
        }
    }

    /// Number of entries, dead ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entry is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries whose delegate is still alive.
    pub fn live(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().lock().as_ref().is_some_and(DelegateHandle::is_alive))
            .count()
    }

    /// Live handle registered for `key` under `pattern`, if any.
    pub fn get(&self, pattern: usize, key: &SeedKey) -> Option<DelegateHandle> {
        let slot = self.entries.get(&(pattern, key.clone()))?.value().clone();
        let current = slot.lock();
        current.as_ref().filter(|h| h.is_alive()).cloned()
    }

    /// Drops every entry whose delegate is dead; returns how many were removed.
    ///
    /// Slots a resolve is currently working on are kept.
    pub fn purge(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| {
            Arc::strong_count(slot) > 1
                || slot.lock().as_ref().is_some_and(DelegateHandle::is_alive)
        });
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::delegate::{Delegate, Delegation};
    use crate::delegation::executor::TokioExecutor;
    use crate::error::DelegateError;
    use crate::events::Bus;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Startable delegate whose liveness the test controls.
    struct Switch {
        alive: Arc<AtomicBool>,
        starts: Arc<AtomicUsize>,
    }

    impl Delegate for Switch {
        fn start(&self) -> Result<(), DelegateError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.alive.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        alive: Arc<AtomicBool>,
        starts: Arc<AtomicUsize>,
        made: AtomicUsize,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                alive: Arc::new(AtomicBool::new(false)),
                starts: Arc::new(AtomicUsize::new(0)),
                made: AtomicUsize::new(0),
            }
        }

        fn factory(&self) -> impl FnOnce() -> DelegateHandle + '_ {
            move || {
                self.made.fetch_add(1, Ordering::SeqCst);
                DelegateHandle::new(
                    "test",
                    Delegation::startable(Switch {
                        alive: self.alive.clone(),
                        starts: self.starts.clone(),
                    }),
                    Arc::new(TokioExecutor::new(Bus::new(1))),
                )
            }
        }

        fn made(&self) -> usize {
            self.made.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn same_key_spawns_once_while_alive() {
        let reg = DelegateRegistry::new();
        let h = Harness::new();
        let seed = Seed::from(42i64);

        let first = reg.resolve(0, &seed, h.factory());
        assert!(matches!(first, Resolution::Spawned(_)));
        for _ in 0..5 {
            let again = reg.resolve(0, &seed, h.factory());
            assert!(matches!(again, Resolution::Reused(_)));
            assert!(again.handle().unwrap().ptr_eq(first.handle().unwrap()));
        }
        assert_eq!(h.made(), 1);
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn fanout_spawns_every_time_and_leaves_registry_untouched() {
        let reg = DelegateRegistry::new();
        let h = Harness::new();
        let seed = Seed::fanout();

        let handles: Vec<_> = (0..3)
            .map(|_| reg.resolve(0, &seed, h.factory()))
            .collect();
        assert!(handles.iter().all(|r| matches!(r, Resolution::FannedOut(_))));
        assert!(!handles[0].handle().unwrap().ptr_eq(handles[1].handle().unwrap()));
        assert_eq!(h.made(), 3);
        assert!(reg.is_empty());
    }

    #[test]
    fn absent_seed_is_a_noop() {
        let reg = DelegateRegistry::new();
        let h = Harness::new();

        let res = reg.resolve(0, &Seed::Absent, h.factory());
        assert!(matches!(res, Resolution::Absent));
        assert_eq!(h.made(), 0);
        assert!(reg.is_empty());
    }

    #[test]
    fn dead_delegate_is_replaced() {
        let reg = DelegateRegistry::new();
        let h = Harness::new();
        let seed = Seed::from("chat");

        let first = reg.resolve(0, &seed, h.factory());
        h.alive.store(false, Ordering::SeqCst);
        assert_eq!(reg.live(), 0);

        let second = reg.resolve(0, &seed, h.factory());
        assert!(matches!(second, Resolution::Spawned(_)));
        assert!(!second.handle().unwrap().ptr_eq(first.handle().unwrap()));
        assert_eq!(h.made(), 2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn patterns_have_independent_key_spaces() {
        let reg = DelegateRegistry::new();
        let h = Harness::new();
        let seed = Seed::from(7i64);

        assert!(reg.resolve(0, &seed, h.factory()).is_spawn());
        assert!(reg.resolve(1, &seed, h.factory()).is_spawn());
        assert_eq!(reg.len(), 2);
        assert!(reg.get(1, &SeedKey::Int(7)).is_some());
    }

    #[test]
    fn purge_sweeps_dead_entries() {
        let reg = DelegateRegistry::new();
        let h = Harness::new();
        reg.resolve(0, &Seed::from(1i64), h.factory());
        reg.resolve(0, &Seed::from(2i64), h.factory());

        assert_eq!(reg.purge(), 0);
        h.alive.store(false, Ordering::SeqCst);
        assert_eq!(reg.purge(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn start_failure_leaves_the_key_free() {
        struct Broken;
        impl Delegate for Broken {
            fn start(&self) -> Result<(), DelegateError> {
                Err(DelegateError::failed("no thread available"))
            }
            fn is_alive(&self) -> bool {
                false
            }
        }

        let reg = DelegateRegistry::new();
        let seed = Seed::from(1i64);
        let res = reg.resolve(3, &seed, || {
            DelegateHandle::new(
                "broken",
                Delegation::startable(Broken),
                Arc::new(TokioExecutor::new(Bus::new(1))),
            )
        });
        match res {
            Resolution::Failed { error, .. } => {
                assert_eq!(error, DelegateError::failed("no thread available"));
            }
            other => panic!("expected a failed start, got {other:?}"),
        }
        assert!(reg.get(3, &SeedKey::Int(1)).is_none());

        let h = Harness::new();
        assert!(matches!(reg.resolve(3, &seed, h.factory()), Resolution::Spawned(_)));
        assert_eq!(reg.live(), 1);
    }

    #[test]
    fn concurrent_resolves_of_one_key_spawn_once() {
        let reg = Arc::new(DelegateRegistry::new());
        let h = Arc::new(Harness::new());

        std::thread::scope(|s| {
            for _ in 0..8 {
                let reg = Arc::clone(&reg);
                let h = Arc::clone(&h);
                s.spawn(move || {
                    for _ in 0..50 {
                        reg.resolve(0, &Seed::from(99i64), h.factory());
                    }
                });
            }
        });
        assert_eq!(h.made(), 1);
    }

    #[test]
    fn slow_factory_does_not_hold_up_other_keys() {
        let reg = DelegateRegistry::new();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let slow = Harness::new();
        let others = Harness::new();

        std::thread::scope(|s| {
            let (reg_ref, slow_ref) = (&reg, &slow);
            let waiting = s.spawn(move || {
                let make = slow_ref.factory();
                reg_ref.resolve(0, &Seed::from(0i64), move || {
                    let _ = entered_tx.send(());
                    let _ = release_rx.recv();
                    make()
                })
            });
            entered_rx.recv().unwrap();

            // with one lock per shard, some of these keys would block until released
            for key in 1..=256i64 {
                assert!(reg.resolve(0, &Seed::from(key), others.factory()).is_spawn());
            }
            release_tx.send(()).unwrap();
            assert!(waiting.join().unwrap().is_spawn());
        });
        assert_eq!(others.made(), 256);
        assert_eq!(reg.len(), 257);
    }
}
