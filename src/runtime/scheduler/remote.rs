//! Completions posted from other threads.
//!
//! A [`RemoteSettler`] is the only piece of a deferred value that may leave
//! the loop's thread. Settling it sends a message over a channel; the loop
//! picks the message up as a macrotask and settles the local value there.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crossbeam::channel::Sender;
use tracing::{error, trace};

use super::EventLoop;
use crate::runtime::deferred::{Deferred, Reason};
use crate::runtime::errors::DeferredError;

/// Value carried from the settling thread back to the loop.
type RemoteOutcome<T> = Result<T, anyhow::Error>;

pub(crate) struct RemoteMessage {
    pub(crate) key: u64,
    pub(crate) payload: Box<dyn Any + Send>,
}

/// Thread-safe settlement capability for a deferred value owned by a loop.
///
/// Dropping it without settling rejects the deferred value with
/// [`DeferredError::SettlerDropped`].
pub struct RemoteSettler<T: Send + 'static> {
    key: u64,
    tx: Sender<RemoteMessage>,
    sent: bool,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + 'static> fmt::Debug for RemoteSettler<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RemoteSettler")
            .field("key", &self.key)
            .field("sent", &self.sent)
            .finish()
    }
}

impl<T: Send + 'static> RemoteSettler<T> {
    /// Fulfill the deferred value with `value`.
    pub fn fulfill(
        mut self,
        value: T,
    ) {
        self.send(Ok(value));
    }

    /// Reject the deferred value with `error`.
    pub fn reject<E>(
        mut self,
        error: E,
    ) where
        E: Into<anyhow::Error>,
    {
        self.send(Err(error.into()));
    }

    fn send(
        &mut self,
        outcome: RemoteOutcome<T>,
    ) {
        self.sent = true;
        let message = RemoteMessage {
            key: self.key,
            payload: Box::new(outcome),
        };
        if self.tx.send(message).is_err() {
            trace!(key = self.key, "event loop gone; remote completion dropped");
        }
    }
}

impl<T: Send + 'static> Drop for RemoteSettler<T> {
    fn drop(&mut self) {
        if !self.sent {
            self.send(Err(anyhow::Error::new(DeferredError::SettlerDropped)));
        }
    }
}

/// Create a deferred value on the current loop together with a settler that
/// may be moved to another thread.
pub fn remote<T>() -> (Deferred<T>, RemoteSettler<T>)
where
    T: Clone + Send + 'static,
{
    let (deferred, resolver) = Deferred::pending();
    let (key, tx) = EventLoop::current().register_remote(Box::new(move |payload: Box<dyn Any + Send>| {
        match payload.downcast::<RemoteOutcome<T>>() {
            Ok(outcome) => match *outcome {
                Ok(value) => resolver.fulfill(value),
                Err(err) => resolver.reject(Reason::from(err)),
            },
            Err(_) => error!("remote completion carried an unexpected payload type"),
        }
    }));
    let settler = RemoteSettler {
        key,
        tx,
        sent: false,
        _marker: PhantomData,
    };
    (deferred, settler)
}
