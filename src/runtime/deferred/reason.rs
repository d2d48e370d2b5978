//! Rejection reasons.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::runtime::errors::DeferredError;

/// The value a deferred value rejects with.
///
/// Any `'static` type can be a reason; the payload is kept as-is and can be
/// recovered with [`Reason::downcast_ref`]. A rendered message is captured at
/// construction so reasons can always be logged. Cloning is cheap.
#[derive(Clone)]
pub struct Reason {
    payload: Rc<dyn Any>,
    message: Rc<str>,
}

impl Reason {
    /// Wrap an arbitrary value; the message is its `Debug` rendering.
    pub fn new<E>(value: E) -> Self
    where
        E: Any + fmt::Debug,
    {
        let message = format!("{:?}", value);
        Self {
            payload: Rc::new(value),
            message: message.into(),
        }
    }

    /// A plain message. The payload is the `String` itself.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            message: message.as_str().into(),
            payload: Rc::new(message),
        }
    }

    /// Wrap an error; the message is its `Display` rendering.
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let message = error.to_string();
        Self {
            payload: Rc::new(error),
            message: message.into(),
        }
    }

    /// Rendered message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Borrow the payload as `E`, if that is what it is.
    #[inline]
    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    /// Check whether the payload is an `E`.
    #[inline]
    pub fn is<E: Any>(&self) -> bool {
        self.payload.is::<E>()
    }

    /// The runtime error this reason carries, if the runtime manufactured it.
    pub fn as_deferred_error(&self) -> Option<&DeferredError> {
        self.downcast_ref::<DeferredError>()
    }

    /// Check whether two reasons share the same payload allocation.
    pub fn ptr_eq(
        &self,
        other: &Reason,
    ) -> bool {
        Rc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for Reason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("Reason").field(&self.message).finish()
    }
}

impl fmt::Display for Reason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<DeferredError> for Reason {
    fn from(error: DeferredError) -> Self {
        Reason::error(error)
    }
}

impl From<anyhow::Error> for Reason {
    fn from(error: anyhow::Error) -> Self {
        // Keep runtime errors recognisable after a round trip through anyhow.
        match error.downcast::<DeferredError>() {
            Ok(runtime) => Reason::error(runtime),
            Err(error) => {
                let message = error.to_string();
                Self {
                    payload: Rc::new(error),
                    message: message.into(),
                }
            }
        }
    }
}

impl From<&str> for Reason {
    fn from(message: &str) -> Self {
        Reason::msg(message)
    }
}

impl From<String> for Reason {
    fn from(message: String) -> Self {
        Reason::msg(message)
    }
}
