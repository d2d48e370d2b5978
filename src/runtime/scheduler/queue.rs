//! Job queue for the event loop
//!
//! Single-threaded FIFO queue. Jobs pushed while the queue is being drained
//! land at the back and run in the same drain.

use std::cell::RefCell;
use std::collections::VecDeque;

use super::job::Job;

/// FIFO queue of jobs owned by one event loop.
#[derive(Debug, Default)]
pub struct JobQueue {
    /// Inner deque; borrowed only for the duration of a push or pop.
    inner: RefCell<VecDeque<Job>>,
}

impl JobQueue {
    /// Create a new empty job queue.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(VecDeque::new()),
        }
    }

    /// Push a job to the back of the queue.
    #[inline]
    pub fn push(
        &self,
        job: Job,
    ) {
        self.inner.borrow_mut().push_back(job);
    }

    /// Pop a job from the front of the queue.
    #[inline]
    pub fn pop_front(&self) -> Option<Job> {
        self.inner.borrow_mut().pop_front()
    }

    /// Get the number of jobs in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}
