//! # Ordering buffer: restores sequence order for pushed updates.
//!
//! Keeps the expected-next sequence number `E`, initialised from the first update ever
//! seen, and a holding area of early arrivals keyed by sequence number.
//!
//! ```text
//! push(s)
//!   ├─ s == E → release s, E += 1, then release held E, E+1, ... while present
//!   ├─ s >  E → hold s (a second copy of a held s is dropped)
//!   └─ s <  E → discard (stale or redelivered)
//! ```
//!
//! Without a hold limit a sequence number that never arrives stalls every later one.
//! With a hold limit, once the oldest held update has waited that long, [`expire`]
//! jumps `E` to the smallest held sequence number and releases from there; anything
//! below the new `E` that shows up later is discarded.
//!
//! Releasing `u64::MAX` exhausts the buffer: nothing can follow it, so every later
//! update is discarded.
//!
//! [`expire`]: OrderingBuffer::expire

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::update::Update;

/// Result of [`OrderingBuffer::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<U> {
    /// Updates ready for dispatch, in sequence order.
    Released(Vec<U>),
    /// The update arrived early and is waiting for the gap to fill.
    Held(u64),
    /// The update was stale or a duplicate.
    Discarded(u64),
}

/// A gap given up on by [`OrderingBuffer::expire`].
#[derive(Debug, PartialEq, Eq)]
pub struct SkippedGap<U> {
    /// First sequence number that was never seen.
    pub from: u64,
    /// First sequence number released after the gap.
    pub resume: u64,
    /// Updates ready for dispatch, in sequence order.
    pub released: Vec<U>,
}

/// Reordering stage of an ordered push feed.
#[derive(Debug)]
pub struct OrderingBuffer<U> {
    expected: Option<u64>,
    exhausted: bool,
    held: BTreeMap<u64, (Instant, U)>,
    max_hold: Option<Duration>,
}

impl<U: Update> OrderingBuffer<U> {
    /// Creates an empty buffer; `max_hold = None` holds early updates forever.
    pub fn new(max_hold: Option<Duration>) -> Self {
        Self {
            expected: None,
            exhausted: false,
            held: BTreeMap::new(),
            max_hold,
        }
    }

    /// Creates a buffer that expects `first` before anything else.
    pub fn starting_at(first: u64, max_hold: Option<Duration>) -> Self {
        Self {
            expected: Some(first),
            ..Self::new(max_hold)
        }
    }

    /// Next sequence number to release, once known.
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// Number of held updates.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Admits one update received at `now`.
    pub fn push(&mut self, update: U, now: Instant) -> Admission<U> {
        let seq = update.seq();
        let expected = *self.expected.get_or_insert(seq);

        if self.exhausted || seq < expected {
            return Admission::Discarded(seq);
        }
        if seq > expected {
            if self.held.contains_key(&seq) {
                return Admission::Discarded(seq);
            }
            self.held.insert(seq, (now, update));
            return Admission::Held(seq);
        }

        let mut released = vec![update];
        match seq.checked_add(1) {
            Some(next) => self.advance(next, &mut released),
            None => self.exhausted = true,
        }
        Admission::Released(released)
    }

    /// When the oldest held update will exceed the hold limit.
    pub fn next_deadline(&self) -> Option<Instant> {
        let limit = self.max_hold?;
        self.held
            .values()
            .map(|(since, _)| *since)
            .min()
            .map(|since| since + limit)
    }

    /// Skips the current gap if the oldest held update has waited past the hold limit.
    pub fn expire(&mut self, now: Instant) -> Option<SkippedGap<U>> {
        if self.next_deadline()? > now {
            return None;
        }
        let from = self.expected?;
        let resume = *self.held.keys().next()?;

        let mut released = Vec::new();
        self.advance(resume, &mut released);
        Some(SkippedGap {
            from,
            resume,
            released,
        })
    }

    /// Sets `E = next`, then releases held updates while `E` is present.
    fn advance(&mut self, mut next: u64, released: &mut Vec<U>) {
        while let Some((_, update)) = self.held.remove(&next) {
            released.push(update);
            match next.checked_add(1) {
                Some(n) => next = n,
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        self.expected = Some(next);
    }
}
