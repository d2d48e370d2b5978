//! Deferred values
//!
//! A [`Deferred<T>`] is a single-assignment asynchronous result in the
//! Promise/A+ mould. It starts out pending, settles exactly once to either a
//! value or a [`Reason`], and runs every handler registered through
//! [`then`](Deferred::then) on a later turn of the event loop, in
//! registration order.
//!
//! ```
//! use deferred::{block_on, ok, Deferred};
//!
//! let answer = Deferred::resolve(41).map(|v| v + 1);
//! assert_eq!(block_on(&answer).unwrap(), 42);
//!
//! let recovered = Deferred::<i32>::reject("nope").catch(|reason| {
//!     assert_eq!(reason.message(), "nope");
//!     ok(0)
//! });
//! assert_eq!(block_on(&recovered).unwrap(), 0);
//! ```

pub mod combinators;
mod reason;
mod resolver;
mod thenable;
pub mod unhandled;

#[cfg(test)]
mod tests;

pub use combinators::{all, race};
pub use reason::Reason;
pub use resolver::{ok, HandlerResult, Resolution, Resolver};
pub use thenable::Thenable;

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::runtime::errors::{panic_message, DeferredError};
use crate::runtime::scheduler;

static NEXT_DEFERRED_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a deferred value, used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeferredId(u64);

impl DeferredId {
    fn next() -> Self {
        DeferredId(NEXT_DEFERRED_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeferredId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Deferred({})", self.0)
    }
}

/// Observable state of a deferred value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with a reason.
    Rejected,
}

/// Terminal outcome of a deferred value.
#[derive(Debug, Clone)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(Reason),
}

impl<T> Settled<T> {
    /// Which terminal state this is.
    pub fn state(&self) -> DeferredState {
        match self {
            Settled::Fulfilled(_) => DeferredState::Fulfilled,
            Settled::Rejected(_) => DeferredState::Rejected,
        }
    }

    /// Convert into a `Result`.
    pub fn into_result(self) -> Result<T, Reason> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(reason) => Err(reason),
        }
    }
}

/// A registered handler record, consumed when the value settles.
pub(crate) type Reaction<T> = Box<dyn FnOnce(Settled<T>)>;

enum State<T> {
    Pending,
    Fulfilled(T),
    Rejected(Reason),
}

struct Inner<T> {
    id: DeferredId,
    state: State<T>,
    /// Non-empty only while pending.
    reactions: SmallVec<[Reaction<T>; 2]>,
    /// Set once anything has subscribed; unobserved rejections get reported.
    handled: bool,
}

/// A Promise/A+ style deferred value.
///
/// Clones share the same underlying value. Two handles compare equal when
/// they refer to the same value.
pub struct Deferred<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Deferred<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Deferred<T> {}

impl<T> fmt::Debug for Deferred<T>
where
    T: fmt::Debug,
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut debug = f.debug_struct("Deferred");
        debug.field("id", &inner.id);
        match &inner.state {
            State::Pending => debug.field("state", &"pending"),
            State::Fulfilled(value) => debug.field("fulfilled", value),
            State::Rejected(reason) => debug.field("rejected", reason),
        };
        debug.finish()
    }
}

impl<T> Deferred<T> {
    /// Get the identifier of this value.
    #[inline]
    pub fn id(&self) -> DeferredId {
        self.inner.borrow().id
    }

    /// Check whether two handles refer to the same value.
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Deferred<T>,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current state.
    pub fn state(&self) -> DeferredState {
        match self.inner.borrow().state {
            State::Pending => DeferredState::Pending,
            State::Fulfilled(_) => DeferredState::Fulfilled,
            State::Rejected(_) => DeferredState::Rejected,
        }
    }

    /// Check whether the value has not settled yet.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }
}

impl<T: Clone + 'static> Deferred<T> {
    fn new_pending() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id: DeferredId::next(),
                state: State::Pending,
                reactions: SmallVec::new(),
                handled: false,
            })),
        }
    }

    /// Create a deferred value and run `executor` synchronously with its
    /// settlement capabilities.
    ///
    /// An `Err` from the executor, or a panic inside it, rejects the value
    /// unless the executor already resolved it.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>) -> Result<(), Reason>,
    {
        let deferred = Self::new_pending();
        let resolver = Resolver::new(deferred.clone());
        let result = panic::catch_unwind(AssertUnwindSafe(|| executor(resolver.clone())));
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(payload) => {
                Some(DeferredError::ExecutorPanicked(panic_message(payload.as_ref())).into())
            }
        };
        if let Some(reason) = failure {
            resolver.reject(reason);
        }
        deferred
    }

    /// Create a pending value together with its capabilities.
    pub fn pending() -> (Self, Resolver<T>) {
        let deferred = Self::new_pending();
        let resolver = Resolver::new(deferred.clone());
        (deferred, resolver)
    }

    /// A value already fulfilled with `value`.
    pub fn resolve(value: T) -> Self {
        Self::resolve_with(Resolution::Value(value))
    }

    /// A value resolved with `resolution`.
    ///
    /// A deferred value is returned unchanged; thenables are adopted.
    pub fn resolve_with(resolution: Resolution<T>) -> Self {
        match resolution {
            Resolution::Deferred(deferred) => deferred,
            other => {
                let (deferred, resolver) = Self::pending();
                resolver.resolve(other);
                deferred
            }
        }
    }

    /// A value already rejected with `reason`.
    pub fn reject(reason: impl Into<Reason>) -> Self {
        let (deferred, resolver) = Self::pending();
        resolver.reject(reason);
        deferred
    }

    /// The terminal outcome, if settled.
    pub fn settled(&self) -> Option<Settled<T>> {
        match &self.inner.borrow().state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Settled::Fulfilled(value.clone())),
            State::Rejected(reason) => Some(Settled::Rejected(reason.clone())),
        }
    }

    /// Register handlers for both outcomes.
    ///
    /// Returns a new value immediately. The handler that matches the outcome
    /// runs on a later turn, never inside this call, and whatever it returns
    /// resolves the returned value. A panicking handler rejects it with
    /// [`DeferredError::HandlerPanicked`].
    pub fn then<U, F, R>(
        &self,
        on_fulfilled: F,
        on_rejected: R,
    ) -> Deferred<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> HandlerResult<U> + 'static,
        R: FnOnce(Reason) -> HandlerResult<U> + 'static,
    {
        let (downstream, resolver) = Deferred::<U>::pending();
        self.add_reaction(Box::new(move |settled| {
            let outcome = match settled {
                Settled::Fulfilled(value) => call_handler(move || on_fulfilled(value)),
                Settled::Rejected(reason) => call_handler(move || on_rejected(reason)),
            };
            match outcome {
                Ok(resolution) => resolver.resolve(resolution),
                Err(reason) => resolver.reject(reason),
            }
        }));
        downstream
    }

    /// Register a fulfillment handler; rejections pass through unchanged.
    pub fn on_fulfilled<U, F>(
        &self,
        on_fulfilled: F,
    ) -> Deferred<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> HandlerResult<U> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// Transform the fulfilled value.
    pub fn map<U, F>(
        &self,
        f: F,
    ) -> Deferred<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.on_fulfilled(move |value| ok(f(value)))
    }

    /// Transform the fulfilled value with a fallible function; `Err` rejects.
    pub fn try_map<U, E, F>(
        &self,
        f: F,
    ) -> Deferred<U>
    where
        U: Clone + 'static,
        E: Into<Reason>,
        F: FnOnce(T) -> Result<U, E> + 'static,
    {
        self.on_fulfilled(move |value| f(value).map(Resolution::Value).map_err(Into::into))
    }

    /// Continue with another deferred value produced from the fulfilled one.
    pub fn and_then<U, F>(
        &self,
        f: F,
    ) -> Deferred<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Deferred<U> + 'static,
    {
        self.on_fulfilled(move |value| Ok(Resolution::Deferred(f(value))))
    }

    /// Register a rejection handler; values pass through unchanged.
    pub fn catch<R>(
        &self,
        on_rejected: R,
    ) -> Deferred<T>
    where
        R: FnOnce(Reason) -> HandlerResult<T> + 'static,
    {
        self.then(ok, on_rejected)
    }

    /// Replace a rejection with a value.
    pub fn recover<R>(
        &self,
        f: R,
    ) -> Deferred<T>
    where
        R: FnOnce(Reason) -> T + 'static,
    {
        self.catch(move |reason| ok(f(reason)))
    }

    /// A new value that settles exactly like this one.
    pub fn forward(&self) -> Deferred<T> {
        self.then(ok, Err)
    }

    /// Run `on_settled` on either outcome, then pass the outcome through.
    ///
    /// If `on_settled` fails, panics, or resolves to a value that rejects,
    /// that rejection replaces the outcome. If it resolves to a pending value,
    /// the outcome is held back until that value settles.
    pub fn finally<F>(
        &self,
        on_settled: F,
    ) -> Deferred<T>
    where
        F: FnOnce() -> HandlerResult<()> + 'static,
    {
        let (downstream, resolver) = Deferred::pending();
        self.add_reaction(Box::new(move |settled| {
            let pass_through = move || match settled {
                Settled::Fulfilled(value) => ok(value),
                Settled::Rejected(reason) => Err(reason),
            };
            let outcome = call_handler(on_settled).and_then(|resolution| match resolution {
                Resolution::Value(()) => pass_through(),
                other => Ok(Resolution::Deferred(
                    Deferred::resolve_with(other).on_fulfilled(move |()| pass_through()),
                )),
            });
            match outcome {
                Ok(resolution) => resolver.resolve(resolution),
                Err(reason) => resolver.reject(reason),
            }
        }));
        downstream
    }

    /// Register a handler record.
    ///
    /// Pending values queue it; settled values hand it to the scheduler.
    pub(crate) fn add_reaction(
        &self,
        reaction: Reaction<T>,
    ) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let was_handled = std::mem::replace(&mut inner.handled, true);
        let settled = match &inner.state {
            State::Pending => {
                inner.reactions.push(reaction);
                return;
            }
            State::Fulfilled(value) => Settled::Fulfilled(value.clone()),
            State::Rejected(reason) => Settled::Rejected(reason.clone()),
        };
        let id = inner.id;
        drop(guard);

        if !was_handled && settled.state() == DeferredState::Rejected {
            unhandled::handled(id);
        }
        scheduler::defer(move || reaction(settled));
    }

    /// Move from pending to a terminal state; no-op once settled.
    pub(crate) fn settle(
        &self,
        outcome: Settled<T>,
    ) {
        let (id, reactions, unobserved) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if !matches!(inner.state, State::Pending) {
                debug!(deferred = %inner.id, "already settled; ignoring");
                return;
            }
            inner.state = match &outcome {
                Settled::Fulfilled(value) => State::Fulfilled(value.clone()),
                Settled::Rejected(reason) => State::Rejected(reason.clone()),
            };
            (inner.id, std::mem::take(&mut inner.reactions), !inner.handled)
        };
        trace!(deferred = %id, state = ?outcome.state(), handlers = reactions.len(), "settled");

        if let Settled::Rejected(reason) = &outcome {
            if unobserved {
                let liveness: std::rc::Weak<dyn std::any::Any> = Rc::<RefCell<Inner<T>>>::downgrade(&self.inner);
                unhandled::track(id, reason.clone(), liveness);
            }
        }
        for reaction in reactions {
            let settled = outcome.clone();
            scheduler::defer(move || reaction(settled));
        }
    }

    /// Count a rejection as observed without registering a handler.
    pub(crate) fn mark_handled(&self) {
        let (id, was_handled, rejected) = {
            let mut inner = self.inner.borrow_mut();
            let was_handled = std::mem::replace(&mut inner.handled, true);
            (inner.id, was_handled, matches!(inner.state, State::Rejected(_)))
        };
        if rejected && !was_handled {
            unhandled::handled(id);
        }
    }
}

/// Run a handler, turning a panic into a rejection.
fn call_handler<U, H>(handler: H) -> HandlerResult<U>
where
    H: FnOnce() -> HandlerResult<U>,
{
    panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
        Err(DeferredError::HandlerPanicked(panic_message(payload.as_ref())).into())
    })
}

/// A value already fulfilled with `value`.
pub fn resolve<T: Clone + 'static>(value: T) -> Deferred<T> {
    Deferred::resolve(value)
}

/// A value already rejected with `reason`.
pub fn reject<T: Clone + 'static>(reason: impl Into<Reason>) -> Deferred<T> {
    Deferred::reject(reason)
}
