//! Cache Entry Module
//!
//! Defines a single cached value together with its absolute deadline.

use std::time::{Duration, Instant};

// == Entry ==
/// Represents a single cache entry with value and deadline.
///
/// An entry without a deadline is treated as already dead, not as immortal.
/// Callers wanting a long-lived entry must give it a far-future deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// Absolute expiry instant, None = dead
    deadline: Option<Instant>,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates a new entry with an optional deadline.
    pub fn new(value: V, deadline: Option<Instant>) -> Self {
        Self { value, deadline }
    }

    // == Deadline ==
    /// Returns the current deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // == Set Deadline ==
    /// Overwrites the deadline unconditionally.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    // == Extend ==
    /// Sets the deadline to `now + by`, where `now` defaults to the current
    /// instant. The previous deadline plays no part.
    pub fn extend(&mut self, by: Duration, now: Option<Instant>) {
        self.deadline = Some(deadline_after(now.unwrap_or_else(Instant::now), by));
    }

    // == Is Dead ==
    /// Checks if the entry has expired.
    ///
    /// True when there is no deadline or `now` is strictly past it.
    pub fn is_dead(&self, now: Option<Instant>) -> bool {
        match self.deadline {
            Some(deadline) => now.unwrap_or_else(Instant::now) > deadline,
            None => true,
        }
    }

    // == Remaining ==
    /// Returns the time left before the deadline, or None if there is none.
    ///
    /// Saturates to zero once the deadline has passed.
    pub fn remaining(&self, now: Option<Instant>) -> Option<Duration> {
        let now = now.unwrap_or_else(Instant::now);
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Consumes the entry, returning the stored value.
    pub fn into_value(self) -> V {
        self.value
    }
}

// == Deadline Arithmetic ==
/// Returns `now + by`, or the furthest representable instant when the sum
/// would overflow.
pub(crate) fn deadline_after(now: Instant, by: Duration) -> Instant {
    let mut by = by;
    loop {
        if let Some(deadline) = now.checked_add(by) {
            return deadline;
        }
        by /= 2;
    }
}
