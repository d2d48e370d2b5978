//! Combinators over many deferred values.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use super::{ok, Deferred, Resolution};

/// Wait for every input to fulfill.
///
/// Fulfills with the values in input order, whatever order they settle in.
/// Rejects with the first rejection; later outcomes are ignored. An empty
/// input fulfills with an empty vector.
pub fn all<T, I>(inputs: I) -> Deferred<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
{
    let inputs: Vec<Deferred<T>> = inputs
        .into_iter()
        .map(|input| Deferred::resolve_with(input.into()))
        .collect();
    if inputs.is_empty() {
        return Deferred::resolve(Vec::new());
    }

    let (combined, resolver) = Deferred::pending();
    let slots: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(Cell::new(inputs.len()));
    trace!(deferred = %combined.id(), inputs = inputs.len(), "all");

    for (index, input) in inputs.into_iter().enumerate() {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let on_value = resolver.clone();
        let on_reason = resolver.clone();
        // The per-input handlers settle `combined` directly; the value
        // returned from `then` only exists to observe the input.
        let _ = input.then(
            move |value| {
                slots.borrow_mut()[index] = Some(value);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let values = slots.borrow_mut().drain(..).flatten().collect();
                    on_value.fulfill(values);
                }
                ok(())
            },
            move |reason| {
                on_reason.reject(reason);
                ok(())
            },
        );
    }
    combined
}

/// Settle like whichever input settles first.
///
/// An empty input never settles.
pub fn race<T, I>(inputs: I) -> Deferred<T>
where
    T: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
{
    let (winner, resolver) = Deferred::pending();
    for input in inputs {
        let on_value = resolver.clone();
        let on_reason = resolver.clone();
        let _ = Deferred::resolve_with(input.into()).then(
            move |value| {
                on_value.fulfill(value);
                ok(())
            },
            move |reason| {
                on_reason.reject(reason);
                ok(())
            },
        );
    }
    winner
}
