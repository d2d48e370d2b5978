//! Cooperative event loop
//!
//! This module provides the scheduler shim every deferred value runs on: a
//! single-threaded loop with a FIFO microtask queue, a wall-clock timer queue
//! and a channel for completions posted from other threads.
//!
//! There is one loop per thread, created lazily on first use. Nothing here
//! ever runs a callback synchronously inside the call that queued it.

pub mod job;
pub mod queue;
pub mod remote;
mod timer;

#[cfg(test)]
mod tests;

pub use job::{Job, JobId, JobIdGenerator, JobKind};
pub use queue::JobQueue;
pub use remote::{remote, RemoteSettler};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, trace, warn};

use crate::runtime::deferred::unhandled::{self, UnhandledRejection};
use crate::runtime::deferred::{Deferred, Reason, Settled};
use crate::runtime::errors::{panic_message, DeferredError};
use crate::util::config::SchedulerSection;

use remote::RemoteMessage;
use timer::TimerQueue;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How long one idle poll blocks waiting for remote completions.
    pub idle_timeout: Duration,
    /// Maximum number of jobs a single run call may execute.
    pub job_budget: Option<usize>,
    /// Whether rejections nobody handles are reported at checkpoints.
    pub track_unhandled_rejections: bool,
    /// Statistics collection enabled.
    pub enable_stats: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(10),
            job_budget: None,
            track_unhandled_rejections: true,
            enable_stats: false,
        }
    }
}

impl From<&SchedulerSection> for SchedulerConfig {
    fn from(section: &SchedulerSection) -> Self {
        Self {
            idle_timeout: Duration::from_millis(section.idle_timeout_ms),
            job_budget: section.job_budget,
            track_unhandled_rejections: section.track_unhandled_rejections,
            enable_stats: section.enable_stats,
        }
    }
}

/// Scheduler statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total microtasks queued.
    pub jobs_deferred: usize,
    /// Total jobs executed (all kinds).
    pub jobs_run: usize,
    /// Total timers fired.
    pub timers_fired: usize,
    /// Total completions received from other threads.
    pub remote_received: usize,
    /// Total panics caught inside jobs.
    pub panics_caught: usize,
}

/// Why a run call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No microtasks, timers or outstanding remote settlers are left.
    Idle,
    /// The caller's stop condition became true.
    Condition,
    /// The configured job budget ran out.
    BudgetExhausted,
}

type RemoteSlot = Box<dyn FnOnce(Box<dyn Any + Send>)>;

struct LoopShared {
    config: RefCell<SchedulerConfig>,
    microtasks: JobQueue,
    timers: RefCell<TimerQueue>,
    ids: RefCell<JobIdGenerator>,
    stats: Cell<SchedulerStats>,
    running: Cell<bool>,
    remote_tx: Sender<RemoteMessage>,
    remote_rx: Receiver<RemoteMessage>,
    remote_slots: RefCell<HashMap<u64, RemoteSlot>>,
    next_remote_key: Cell<u64>,
}

/// Handle to the current thread's event loop.
///
/// Cloning is cheap; every clone refers to the same loop.
#[derive(Clone)]
pub struct EventLoop {
    shared: Rc<LoopShared>,
}

thread_local! {
    static CURRENT: EventLoop = EventLoop::with_config(SchedulerConfig::default());
}

/// Jobs one run call may still execute.
struct Budget {
    limit: Option<usize>,
    used: usize,
}

impl Budget {
    fn new(limit: Option<usize>) -> Self {
        Self { limit, used: 0 }
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.used >= limit)
    }

    fn spend(&mut self) {
        self.used += 1;
    }
}

/// Resets the `running` flag even if a run call unwinds.
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &*self.shared.config.borrow())
            .field("microtasks", &self.shared.microtasks.len())
            .field("timers", &self.shared.timers.borrow().len())
            .field("remote", &self.shared.remote_slots.borrow().len())
            .field("running", &self.shared.running.get())
            .finish()
    }
}

impl EventLoop {
    fn with_config(config: SchedulerConfig) -> Self {
        let (remote_tx, remote_rx) = channel::unbounded();
        Self {
            shared: Rc::new(LoopShared {
                config: RefCell::new(config),
                microtasks: JobQueue::new(),
                timers: RefCell::new(TimerQueue::new()),
                ids: RefCell::new(JobIdGenerator::new()),
                stats: Cell::new(SchedulerStats::default()),
                running: Cell::new(false),
                remote_tx,
                remote_rx,
                remote_slots: RefCell::new(HashMap::new()),
                next_remote_key: Cell::new(0),
            }),
        }
    }

    /// Get the event loop of the calling thread.
    pub fn current() -> Self {
        CURRENT.with(|event_loop| event_loop.clone())
    }

    /// Replace the configuration of the calling thread's loop.
    ///
    /// Takes effect from the next job; queued work is kept.
    pub fn install(config: SchedulerConfig) -> Self {
        let event_loop = Self::current();
        debug!(?config, "installing scheduler config");
        *event_loop.shared.config.borrow_mut() = config;
        event_loop
    }

    /// Get a copy of the active configuration.
    pub fn config(&self) -> SchedulerConfig {
        self.shared.config.borrow().clone()
    }

    /// Get a snapshot of the statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats.get()
    }

    /// Check whether a run call is in progress on this loop.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.running.get()
    }

    /// Number of microtasks, timers and remote settlers still outstanding.
    pub fn pending_jobs(&self) -> usize {
        self.shared.microtasks.len()
            + self.shared.timers.borrow().len()
            + self.shared.remote_slots.borrow().len()
    }

    /// Install a hook for rejections that reach a checkpoint unhandled.
    ///
    /// Replaces the process-wide hook for this thread.
    pub fn on_unhandled_rejection<F>(
        &self,
        hook: F,
    ) where
        F: Fn(&UnhandledRejection) + 'static,
    {
        unhandled::set_local_hook(Rc::new(hook));
    }

    fn record(
        &self,
        update: impl FnOnce(&mut SchedulerStats),
    ) {
        if self.shared.config.borrow().enable_stats {
            let mut stats = self.shared.stats.get();
            update(&mut stats);
            self.shared.stats.set(stats);
        }
    }

    fn next_id(&self) -> JobId {
        self.shared.ids.borrow_mut().next()
    }

    /// Queue a callback for the next microtask checkpoint.
    pub fn defer<F>(
        &self,
        callback: F,
    ) -> JobId
    where
        F: FnOnce() + 'static,
    {
        let id = self.next_id();
        self.shared
            .microtasks
            .push(Job::new(id, JobKind::Microtask, callback));
        self.record(|stats| stats.jobs_deferred += 1);
        id
    }

    /// Run a callback once `delay` of wall-clock time has passed.
    pub fn set_timeout<F>(
        &self,
        delay: Duration,
        callback: F,
    ) -> JobId
    where
        F: FnOnce() + 'static,
    {
        let id = self.next_id();
        let deadline = Instant::now() + delay;
        self.shared
            .timers
            .borrow_mut()
            .push(deadline, Job::new(id, JobKind::Timer, callback));
        id
    }

    pub(crate) fn register_remote(
        &self,
        slot: RemoteSlot,
    ) -> (u64, Sender<RemoteMessage>) {
        let key = self.shared.next_remote_key.get();
        self.shared.next_remote_key.set(key + 1);
        self.shared.remote_slots.borrow_mut().insert(key, slot);
        (key, self.shared.remote_tx.clone())
    }

    /// Drive the loop until nothing is left to do.
    pub fn run_until_idle(&self) -> RunOutcome {
        self.run_until(|| false)
    }

    /// Drive the loop until `done` returns true or nothing is left to do.
    ///
    /// `done` is checked after every microtask checkpoint.
    pub fn run_until<P>(
        &self,
        mut done: P,
    ) -> RunOutcome
    where
        P: FnMut() -> bool,
    {
        if self.is_running() {
            warn!("run called from inside a running event loop; ignoring");
            return RunOutcome::Idle;
        }
        self.shared.running.set(true);
        let _guard = RunningGuard(&self.shared.running);

        let mut budget = Budget::new(self.shared.config.borrow().job_budget);

        loop {
            // 1. Microtask checkpoint
            while !self.shared.microtasks.is_empty() {
                // Checked before popping, so the queue keeps its order.
                if budget.exhausted() {
                    return RunOutcome::BudgetExhausted;
                }
                let Some(job) = self.shared.microtasks.pop_front() else {
                    break;
                };
                budget.spend();
                self.run_job(job);
            }
            let track = self.shared.config.borrow().track_unhandled_rejections;
            unhandled::checkpoint(track);

            if done() {
                return RunOutcome::Condition;
            }

            // 2. At most one macrotask per turn
            let now = Instant::now();
            let timer_due = self.shared.timers.borrow().has_due(now);
            if (timer_due || !self.shared.remote_rx.is_empty()) && budget.exhausted() {
                return RunOutcome::BudgetExhausted;
            }
            if timer_due {
                let due = self.shared.timers.borrow_mut().pop_due(now);
                if let Some(job) = due {
                    budget.spend();
                    self.record(|stats| stats.timers_fired += 1);
                    self.run_job(job);
                    continue;
                }
            }
            if let Ok(message) = self.shared.remote_rx.try_recv() {
                budget.spend();
                self.deliver(message);
                continue;
            }

            // 3. Nothing ready: wait for a deadline or a remote completion
            let next_deadline = self.shared.timers.borrow().next_deadline();
            let outstanding = !self.shared.remote_slots.borrow().is_empty();
            let wait = match (next_deadline, outstanding) {
                (Some(deadline), _) => deadline.saturating_duration_since(now),
                (None, true) => self.shared.config.borrow().idle_timeout,
                (None, false) => {
                    if self.shared.microtasks.is_empty() {
                        return RunOutcome::Idle;
                    }
                    continue;
                }
            };
            if budget.exhausted() {
                return RunOutcome::BudgetExhausted;
            }
            match self.shared.remote_rx.recv_timeout(wait) {
                Ok(message) => {
                    budget.spend();
                    self.deliver(message);
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Unreachable while the loop holds its own sender.
                Err(RecvTimeoutError::Disconnected) => return RunOutcome::Idle,
            }
        }
    }

    /// Run the loop until `deferred` settles and return its outcome.
    pub fn block_on<T>(
        &self,
        deferred: &Deferred<T>,
    ) -> Result<T, Reason>
    where
        T: Clone + 'static,
    {
        if self.is_running() {
            return Err(DeferredError::Reentrant.into());
        }
        deferred.mark_handled();
        let outcome = self.run_until(|| !deferred.is_pending());
        match deferred.settled() {
            Some(Settled::Fulfilled(value)) => Ok(value),
            Some(Settled::Rejected(reason)) => Err(reason),
            None if outcome == RunOutcome::BudgetExhausted => {
                Err(DeferredError::BudgetExhausted.into())
            }
            None => Err(DeferredError::Stalled.into()),
        }
    }

    fn deliver(
        &self,
        message: RemoteMessage,
    ) {
        let RemoteMessage { key, payload } = message;
        let slot = self.shared.remote_slots.borrow_mut().remove(&key);
        match slot {
            Some(slot) => {
                self.record(|stats| stats.remote_received += 1);
                let id = self.next_id();
                self.run_job(Job::new(id, JobKind::Remote, move || slot(payload)));
            }
            None => debug!(key, "remote completion for an unknown slot; dropping"),
        }
    }

    fn run_job(
        &self,
        job: Job,
    ) {
        let id = job.id();
        let kind = job.kind();
        trace!(job = %id, %kind, "running job");
        let result = panic::catch_unwind(AssertUnwindSafe(|| job.run()));
        self.record(|stats| stats.jobs_run += 1);
        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            error!(job = %id, %kind, "job panicked: {}", message);
            self.record(|stats| stats.panics_caught += 1);
            unhandled::report_failure(message);
        }
    }
}

/// Queue a callback on the current thread's loop.
pub fn defer<F>(callback: F) -> JobId
where
    F: FnOnce() + 'static,
{
    EventLoop::current().defer(callback)
}

/// Run a callback on the current thread's loop after `delay`.
pub fn set_timeout<F>(
    delay: Duration,
    callback: F,
) -> JobId
where
    F: FnOnce() + 'static,
{
    EventLoop::current().set_timeout(delay, callback)
}

/// Drive the current thread's loop until it is idle.
pub fn run_until_idle() -> RunOutcome {
    EventLoop::current().run_until_idle()
}

/// Drive the current thread's loop until `deferred` settles.
pub fn block_on<T>(deferred: &Deferred<T>) -> Result<T, Reason>
where
    T: Clone + 'static,
{
    EventLoop::current().block_on(deferred)
}

/// A deferred value that fulfills with `value` after `duration`.
pub fn delay<T>(
    duration: Duration,
    value: T,
) -> Deferred<T>
where
    T: Clone + 'static,
{
    let (deferred, resolver) = Deferred::pending();
    set_timeout(duration, move || resolver.fulfill(value));
    deferred
}

/// A deferred value that rejects with `reason` after `duration`.
pub fn delay_reject<T>(
    duration: Duration,
    reason: impl Into<Reason>,
) -> Deferred<T>
where
    T: Clone + 'static,
{
    let reason = reason.into();
    let (deferred, resolver) = Deferred::pending();
    set_timeout(duration, move || resolver.reject(reason));
    deferred
}
