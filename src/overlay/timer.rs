//! Cooperative one-shot timers for the UI thread
//!
//! Nothing fires on its own: the event loop calls [`TimerQueue::pop_due`]
//! on every tick and uses [`TimerQueue::next_deadline`] to decide when to
//! wake up next.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    pending: BinaryHeap<Reverse<(Instant, TimerId)>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, deadline: Instant) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push(Reverse((deadline, id)));
        id
    }

    /// Remove a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|Reverse((_, pending))| *pending != id);
        self.pending.len() != before
    }

    /// Pop the earliest timer whose deadline has passed
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerId> {
        match self.pending.peek() {
            Some(Reverse((deadline, _))) if *deadline <= now => {
                self.pending.pop().map(|Reverse((_, id))| id)
            }
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.peek().map(|Reverse((deadline, _))| *deadline)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
