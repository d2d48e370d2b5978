//! Settlement capabilities and the resolution procedure.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, trace};

use super::thenable::Thenable;
use super::{Deferred, Reason, Settled};
use crate::runtime::errors::{panic_message, DeferredError};

/// What a deferred value can be resolved with.
pub enum Resolution<T> {
    /// A plain value; fulfills directly.
    Value(T),
    /// Another deferred value; adopted once it settles.
    Deferred(Deferred<T>),
    /// A foreign then-shaped value; adopted through its `subscribe`.
    Thenable(Rc<dyn Thenable<T>>),
}

impl<T> Resolution<T> {
    /// Resolve with a plain value.
    #[inline]
    pub fn value(value: T) -> Self {
        Resolution::Value(value)
    }

    /// Resolve by adopting a foreign thenable.
    pub fn thenable<Th>(thenable: Th) -> Self
    where
        Th: Thenable<T> + 'static,
    {
        Resolution::Thenable(Rc::new(thenable))
    }
}

impl<T> From<Deferred<T>> for Resolution<T> {
    fn from(deferred: Deferred<T>) -> Self {
        Resolution::Deferred(deferred)
    }
}

impl<T> fmt::Debug for Resolution<T>
where
    T: fmt::Debug,
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Deferred(deferred) => f.debug_tuple("Deferred").field(&deferred.id()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// What a handler returns. `Err` rejects the downstream value.
pub type HandlerResult<T> = Result<Resolution<T>, Reason>;

/// Shorthand for a handler that fulfills with `value`.
#[inline]
pub fn ok<T>(value: T) -> HandlerResult<T> {
    Ok(Resolution::Value(value))
}

/// The pair of settlement capabilities for one deferred value.
///
/// All clones share one "already resolved" flag: the first call to
/// [`resolve`](Resolver::resolve), [`fulfill`](Resolver::fulfill) or
/// [`reject`](Resolver::reject) wins and every later call is a no-op.
pub struct Resolver<T> {
    target: Deferred<T>,
    already_resolved: Rc<Cell<bool>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            already_resolved: self.already_resolved.clone(),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("target", &self.target.id())
            .field("already_resolved", &self.already_resolved.get())
            .finish()
    }
}

impl<T: Clone + 'static> Resolver<T> {
    pub(crate) fn new(target: Deferred<T>) -> Self {
        Self {
            target,
            already_resolved: Rc::new(Cell::new(false)),
        }
    }

    /// Resolve the target through the resolution procedure.
    pub fn resolve(
        &self,
        resolution: Resolution<T>,
    ) {
        if self.claim() {
            resolve_into(&self.target, resolution);
        }
    }

    /// Fulfill the target with a plain value.
    #[inline]
    pub fn fulfill(
        &self,
        value: T,
    ) {
        self.resolve(Resolution::Value(value));
    }

    /// Reject the target.
    pub fn reject(
        &self,
        reason: impl Into<Reason>,
    ) {
        if self.claim() {
            self.target.settle(Settled::Rejected(reason.into()));
        }
    }

    /// Whether a capability has already been used.
    ///
    /// A resolved target may still be pending while it follows another value.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.already_resolved.get()
    }

    fn claim(&self) -> bool {
        if self.already_resolved.replace(true) {
            debug!(deferred = %self.target.id(), "ignoring repeated settlement");
            return false;
        }
        true
    }
}

/// Resolve `target` with `resolution`.
///
/// A value that is `target` itself rejects with
/// [`DeferredError::SelfResolution`]. Deferred values and thenables are
/// subscribed to with fresh capabilities, so whatever they settle with is fed
/// back through here; nested values unwrap to any depth.
pub(crate) fn resolve_into<T>(
    target: &Deferred<T>,
    resolution: Resolution<T>,
) where
    T: Clone + 'static,
{
    match resolution {
        Resolution::Value(value) => target.settle(Settled::Fulfilled(value)),
        Resolution::Deferred(source) => {
            if source.ptr_eq(target) {
                target.settle(Settled::Rejected(DeferredError::SelfResolution.into()));
                return;
            }
            trace!(deferred = %target.id(), source = %source.id(), "adopting deferred value");
            // Subscribing to a native value cannot fail.
            let _ = Thenable::subscribe(&source, Resolver::new(target.clone()));
        }
        Resolution::Thenable(thenable) => {
            if thenable.deferred_id() == Some(target.id()) {
                target.settle(Settled::Rejected(DeferredError::SelfResolution.into()));
                return;
            }
            trace!(deferred = %target.id(), "adopting thenable");
            let resolver = Resolver::new(target.clone());
            let attempt =
                panic::catch_unwind(AssertUnwindSafe(|| thenable.subscribe(resolver.clone())));
            let failure = match attempt {
                Ok(Ok(())) => None,
                Ok(Err(reason)) => Some(reason),
                Err(payload) => Some(
                    DeferredError::ThenablePanicked(panic_message(payload.as_ref())).into(),
                ),
            };
            // Ignored if the thenable already used one of the capabilities.
            if let Some(reason) = failure {
                resolver.reject(reason);
            }
        }
    }
}
