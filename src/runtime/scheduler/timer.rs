//! Timer queue for the event loop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use super::job::Job;

/// An entry in the timer queue.
///
/// Stored in a `BinaryHeap` ordered so that the earliest deadline pops first;
/// entries with the same deadline pop in insertion order.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,
    /// Insertion sequence, breaks ties between equal deadlines.
    pub(crate) seq: u64,
    /// Job to run once the deadline has passed.
    pub(crate) job: Job,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` behaves as a min-heap.
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending timers.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(
        &mut self,
        deadline: Instant,
        job: Job,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry { deadline, seq, job });
    }

    /// Earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Check whether the earliest timer is due at `now`.
    pub(crate) fn has_due(
        &self,
        now: Instant,
    ) -> bool {
        self.next_deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Pop the earliest timer whose deadline is at or before `now`.
    pub(crate) fn pop_due(
        &mut self,
        now: Instant,
    ) -> Option<Job> {
        match self.heap.peek() {
            Some(entry) if entry.deadline <= now => self.heap.pop().map(|entry| entry.job),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}
