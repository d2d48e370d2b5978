//! End-to-end scenarios through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use deferred::{
    all, block_on, ok, race, run_until_idle, Deferred, DeferredError, EventLoop, Reason,
    Resolution, Resolver, RunOutcome, Thenable,
};

#[test]
fn test_boom() {
    let message = Deferred::resolve(5)
        .map(|v| v + 1)
        .on_fulfilled(|_: i32| -> deferred::HandlerResult<i32> { Err(Reason::msg("boom")) })
        .catch(|e| ok(e.message().len() as i32))
        .map(|len| format!("caught {} chars", len));
    assert_eq!(block_on(&message).unwrap(), "caught 4 chars");
}

#[test]
fn test_interleaved_chains() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let a = log.clone();
    let b = log.clone();
    let left = Deferred::resolve(()).map(move |()| a.borrow_mut().push("a1"));
    let right = Deferred::resolve(()).map(move |()| b.borrow_mut().push("b1"));
    let a = log.clone();
    let b = log.clone();
    let _ = left.map(move |()| a.borrow_mut().push("a2"));
    let _ = right.map(move |()| b.borrow_mut().push("b2"));

    assert_eq!(run_until_idle(), RunOutcome::Idle);
    // One hop per turn, so independent chains interleave.
    assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
}

/// A callback-style source, the shape of most foreign asynchronous APIs.
struct Callback<T> {
    outcome: Result<T, &'static str>,
}

impl<T: Clone + 'static> Thenable<T> for Callback<T> {
    fn subscribe(
        &self,
        resolver: Resolver<T>,
    ) -> Result<(), Reason> {
        let outcome = self.outcome.clone();
        deferred::defer(move || match outcome {
            Ok(value) => resolver.fulfill(value),
            Err(message) => resolver.reject(message),
        });
        Ok(())
    }
}

#[test]
fn test_foreign_sources_compose() {
    let sources: Vec<Deferred<u32>> = (1..=4)
        .map(|n| Deferred::resolve_with(Resolution::<u32>::thenable(Callback { outcome: Ok(n) })))
        .collect();
    let combined: Deferred<Vec<u32>> = all(sources);
    let total = combined.map(|values| values.into_iter().sum::<u32>());
    assert_eq!(block_on(&total).unwrap(), 10);

    let failing = Deferred::resolve_with(Resolution::<u32>::thenable(Callback {
        outcome: Err("unreachable host"),
    }));
    let fallback = failing.recover(|reason| {
        assert_eq!(reason.message(), "unreachable host");
        0
    });
    assert_eq!(block_on(&fallback).unwrap(), 0);
}

#[test]
fn test_race_against_pending_forever() {
    let (never, _keep) = Deferred::<i32>::pending();
    let winner: Deferred<i32> = race(vec![never, Deferred::resolve(1)]);
    assert_eq!(block_on(&winner).unwrap(), 1);
}

#[test]
fn test_self_resolution_surfaces_as_error() {
    let (deferred, resolver) = Deferred::<i32>::pending();
    resolver.resolve(deferred.clone().into());
    let reason = block_on(&deferred).unwrap_err();
    assert_eq!(reason.as_deferred_error(), Some(&DeferredError::SelfResolution));
}

#[test]
fn test_unhandled_hook_sees_dropped_chain() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    EventLoop::current().on_unhandled_rejection(move |report| sink.borrow_mut().push(report.message.clone()));

    let _ = Deferred::resolve(1).try_map(|_: i32| Err::<i32, _>("parse failure"));
    run_until_idle();
    assert_eq!(*seen.borrow(), vec!["parse failure".to_string()]);
}
