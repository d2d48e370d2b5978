//! Unhandled rejection tracking
//!
//! A deferred value that rejects while nothing observes it is recorded here.
//! Attaching a handler before the next microtask checkpoint forgets the
//! record; anything still recorded at the checkpoint is reported through the
//! thread's hook, or the process-wide hook when the thread has none.
//!
//! Reporting is purely observational and never changes how values settle.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::{DeferredId, Reason};

/// A rejection (or a panic inside a scheduled job) that nobody handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledRejection {
    /// The rejected value; `None` for a panic inside a scheduled job.
    pub id: Option<DeferredId>,
    /// Rendered reason.
    pub message: String,
}

/// Dangles once the rejected value is dropped.
type Liveness = Weak<dyn Any>;
type LocalHook = Rc<dyn Fn(&UnhandledRejection)>;
type GlobalHook = Arc<dyn Fn(&UnhandledRejection) + Send + Sync>;

static GLOBAL_HOOK: Lazy<RwLock<Option<GlobalHook>>> = Lazy::new(|| RwLock::new(None));

#[derive(Default)]
struct Tracker {
    /// Rejected without observers since the last checkpoint.
    pending: Vec<(DeferredId, Reason, Liveness)>,
    /// Already reported and still alive; kept to log late handling.
    reported: HashMap<DeferredId, Liveness>,
    /// Panics caught in jobs since the last checkpoint.
    failures: Vec<String>,
    local_hook: Option<LocalHook>,
}

thread_local! {
    static TRACKER: RefCell<Tracker> = RefCell::new(Tracker::default());
}

/// Install the process-wide hook, used by threads without their own hook.
pub fn set_unhandled_rejection_hook<F>(hook: F)
where
    F: Fn(&UnhandledRejection) + Send + Sync + 'static,
{
    *GLOBAL_HOOK.write() = Some(Arc::new(hook));
}

/// Remove the process-wide hook.
pub fn clear_unhandled_rejection_hook() {
    *GLOBAL_HOOK.write() = None;
}

pub(crate) fn set_local_hook(hook: LocalHook) {
    let _ = TRACKER.try_with(|tracker| tracker.borrow_mut().local_hook = Some(hook));
}

pub(crate) fn track(
    id: DeferredId,
    reason: Reason,
    liveness: Liveness,
) {
    let _ = TRACKER.try_with(|tracker| tracker.borrow_mut().pending.push((id, reason, liveness)));
}

/// A handler was attached to a value that had rejected unobserved.
pub(crate) fn handled(id: DeferredId) {
    let _ = TRACKER.try_with(|tracker| {
        let mut tracker = tracker.borrow_mut();
        let before = tracker.pending.len();
        tracker.pending.retain(|(pending, _, _)| *pending != id);
        if tracker.pending.len() == before && tracker.reported.remove(&id).is_some() {
            info!(deferred = %id, "rejection handled after it was reported");
        }
    });
}

pub(crate) fn report_failure(message: String) {
    let _ = TRACKER.try_with(|tracker| tracker.borrow_mut().failures.push(message));
}

#[cfg(test)]
pub(crate) fn reported_count() -> usize {
    TRACKER.with(|tracker| tracker.borrow().reported.len())
}

/// Report everything recorded since the last checkpoint.
pub(crate) fn checkpoint(enabled: bool) {
    let drained = TRACKER.try_with(|tracker| {
        let mut tracker = tracker.borrow_mut();
        let pending = std::mem::take(&mut tracker.pending);
        let failures = std::mem::take(&mut tracker.failures);
        if enabled && !pending.is_empty() {
            // Dropped values can no longer gain a handler.
            tracker.reported.retain(|_, liveness| liveness.strong_count() > 0);
            let reported = pending.iter().map(|(id, _, liveness)| (*id, liveness.clone()));
            tracker.reported.extend(reported);
        }
        (pending, failures, tracker.local_hook.clone())
    });
    let Ok((pending, failures, local_hook)) = drained else {
        return;
    };
    if !enabled || (pending.is_empty() && failures.is_empty()) {
        return;
    }

    let reports = pending
        .into_iter()
        .map(|(id, reason, _)| {
            warn!(deferred = %id, reason = %reason, "unhandled rejection");
            UnhandledRejection {
                id: Some(id),
                message: reason.message().to_string(),
            }
        })
        .chain(failures.into_iter().map(|message| UnhandledRejection { id: None, message }));

    // Hooks run with no tracker borrow held; they may create and reject values.
    match local_hook {
        Some(hook) => reports.for_each(|report| hook(&report)),
        None => {
            let global = GLOBAL_HOOK.read().clone();
            if let Some(hook) = global {
                reports.for_each(|report| hook(&report));
            } else {
                reports.for_each(drop);
            }
        }
    }
}
