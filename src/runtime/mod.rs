//! Runtime system
//!
//! This module contains the deferred value core and the event loop it runs on.

pub mod deferred;
pub mod errors;
pub mod scheduler;
