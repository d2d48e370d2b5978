//! Runtime errors

use thiserror::Error;

/// Result of driving the event loop to a value.
pub type DeferredResult<T> = Result<T, crate::runtime::deferred::Reason>;

/// Errors manufactured by the runtime itself.
///
/// Every other rejection reason is whatever the executor or handler produced;
/// these are the only reasons the runtime creates on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeferredError {
    #[error("cannot resolve a deferred value with itself")]
    SelfResolution,

    #[error("executor panicked: {0}")]
    ExecutorPanicked(String),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("thenable panicked: {0}")]
    ThenablePanicked(String),

    #[error("remote settler dropped before settling")]
    SettlerDropped,

    // === Errors returned by `block_on` ===
    #[error("event loop went idle before the deferred value settled")]
    Stalled,

    #[error("job budget exhausted before the deferred value settled")]
    BudgetExhausted,

    #[error("cannot block on a deferred value from inside a running event loop")]
    Reentrant,
}

/// Render a panic payload the way `std` prints it.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
