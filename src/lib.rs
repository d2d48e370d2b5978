//! deferred
//!
//! Promise/A+ style deferred values on a small cooperative event loop.
//!
//! A [`Deferred<T>`] is pending until it is fulfilled with a `T` or rejected
//! with a [`Reason`], and settles exactly once. Handlers attached with
//! [`then`](Deferred::then) and friends always run on a later turn of the
//! calling thread's [`EventLoop`], in the order they were registered.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use deferred::{all, block_on, delay, Deferred};
//!
//! let slow = delay(Duration::from_millis(5), 1);
//! let fast = Deferred::resolve(2);
//! let both: Deferred<Vec<i32>> = all(vec![slow, fast]);
//! let sum = both.map(|values| values.iter().sum::<i32>());
//! assert_eq!(block_on(&sum).unwrap(), 3);
//! ```

#![doc(html_root_url = "https://docs.rs/deferred")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use runtime::deferred::unhandled::{
    clear_unhandled_rejection_hook, set_unhandled_rejection_hook, UnhandledRejection,
};
pub use runtime::deferred::{
    all, ok, race, reject, resolve, Deferred, DeferredId, DeferredState, HandlerResult, Reason,
    Resolution, Resolver, Settled, Thenable,
};
pub use runtime::errors::{DeferredError, DeferredResult};
pub use runtime::scheduler::{
    block_on, defer, delay, delay_reject, remote, run_until_idle, set_timeout, EventLoop,
    RemoteSettler, RunOutcome, SchedulerConfig, SchedulerStats,
};

use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "deferred";

/// Load the user config, initialise logging and configure this thread's loop.
///
/// Convenience for applications; libraries embedding the runtime usually
/// call [`EventLoop::install`] directly.
pub fn init() -> Result<EventLoop, util::config::ConfigError> {
    let config = util::config::load_user_config()?;
    util::logger::init_from_config(&config.log);
    debug!(version = VERSION, "{} runtime initialised", NAME);
    Ok(EventLoop::install(config.scheduler_config()))
}
