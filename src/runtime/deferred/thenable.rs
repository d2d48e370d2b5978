//! Interop with foreign then-shaped values.

use super::{Deferred, DeferredId, Resolver, Settled};

/// Anything that can deliver a value or a reason to a pair of capabilities.
///
/// `subscribe` plays the role of `then(onFulfilled, onRejected)`: it must
/// eventually call `resolver.resolve`/`fulfill` or `resolver.reject`. Calling
/// more than one of them, or the same one twice, is tolerated; only the first
/// call counts. Returning `Err` rejects the adopting value unless a capability
/// was already called.
pub trait Thenable<T> {
    /// Register the capabilities with this value.
    fn subscribe(
        &self,
        resolver: Resolver<T>,
    ) -> Result<(), super::Reason>;

    /// Identity of the deferred value behind this thenable, if there is one.
    ///
    /// Used to reject attempts to resolve a value with itself.
    fn deferred_id(&self) -> Option<DeferredId> {
        None
    }
}

impl<T: Clone + 'static> Thenable<T> for Deferred<T> {
    fn subscribe(
        &self,
        resolver: Resolver<T>,
    ) -> Result<(), super::Reason> {
        self.add_reaction(Box::new(move |settled| match settled {
            Settled::Fulfilled(value) => resolver.fulfill(value),
            Settled::Rejected(reason) => resolver.reject(reason),
        }));
        Ok(())
    }

    fn deferred_id(&self) -> Option<DeferredId> {
        Some(self.id())
    }
}
