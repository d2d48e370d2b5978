//! Deferred 单元测试
//!
//! 测试单次结算、链式调用、解析过程、组合器与未处理拒绝的报告

mod unhandled;

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::deferred::{Deferred, Settled};
use crate::runtime::scheduler::run_until_idle;

/// Shared log that handlers append to.
pub(super) fn recorder<T: 'static>() -> Rc<RefCell<Vec<T>>> {
    Rc::new(RefCell::new(Vec::new()))
}

/// Drain the loop and return the outcome, panicking if still pending.
pub(super) fn settle_now<T: Clone + 'static>(deferred: &Deferred<T>) -> Settled<T> {
    run_until_idle();
    match deferred.settled() {
        Some(settled) => settled,
        None => panic!("{} is still pending", deferred.id()),
    }
}

/// Drain the loop and return the rejection message.
pub(super) fn rejection<T: Clone + 'static>(deferred: &Deferred<T>) -> String {
    match settle_now(deferred) {
        Settled::Rejected(reason) => reason.message().to_string(),
        Settled::Fulfilled(_) => panic!("{} fulfilled, expected a rejection", deferred.id()),
    }
}
