//! Job definitions for the event loop.
//!
//! A job is one unit of deferred work: a boxed callback plus bookkeeping used
//! for tracing and statistics.

use std::fmt;

/// Unique job identifier (per event loop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl fmt::Display for JobId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Job({})", self.0)
    }
}

/// Where a job was queued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Queued by `defer`; runs at the next microtask checkpoint.
    Microtask,
    /// Queued by `set_timeout`; runs once its deadline has passed.
    Timer,
    /// Posted from another thread through a remote settler.
    Remote,
}

impl fmt::Display for JobKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            JobKind::Microtask => write!(f, "microtask"),
            JobKind::Timer => write!(f, "timer"),
            JobKind::Remote => write!(f, "remote"),
        }
    }
}

/// A callback waiting to run on the event loop.
pub struct Job {
    id: JobId,
    kind: JobKind,
    callback: Box<dyn FnOnce()>,
}

impl fmt::Debug for Job {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Job {
    /// Create a new job.
    pub fn new<F>(
        id: JobId,
        kind: JobKind,
        callback: F,
    ) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            id,
            kind,
            callback: Box::new(callback),
        }
    }

    /// Get the job ID.
    #[inline]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Get the job kind.
    #[inline]
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Consume the job and run its callback.
    #[inline]
    pub fn run(self) {
        (self.callback)()
    }
}

/// Generator for job IDs.
#[derive(Debug, Default)]
pub struct JobIdGenerator {
    next_id: u64,
}

impl JobIdGenerator {
    /// Create a new job ID generator.
    #[inline]
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Generate the next job ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        JobId(id)
    }
}
