//! 未处理拒绝报告测试

use std::sync::Arc;

use parking_lot::Mutex;

use super::recorder;
use crate::runtime::deferred::unhandled::{
    self, clear_unhandled_rejection_hook, set_unhandled_rejection_hook, UnhandledRejection,
};
use crate::runtime::deferred::{ok, Deferred};
use crate::runtime::scheduler::{defer, run_until_idle, EventLoop, SchedulerConfig};

fn collect_local() -> std::rc::Rc<std::cell::RefCell<Vec<UnhandledRejection>>> {
    let reports = recorder();
    let sink = reports.clone();
    EventLoop::current().on_unhandled_rejection(move |report| sink.borrow_mut().push(report.clone()));
    reports
}

#[test]
fn test_unobserved_rejection_is_reported() {
    let reports = collect_local();
    let rejected = Deferred::<i32>::reject("nobody cares");
    run_until_idle();

    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, Some(rejected.id()));
    assert_eq!(reports[0].message, "nobody cares");
}

#[test]
fn test_handler_before_checkpoint_suppresses_report() {
    let reports = collect_local();
    let rejected = Deferred::<i32>::reject("caught in time");
    let _recovered = rejected.recover(|_| 0);
    run_until_idle();
    assert!(reports.borrow().is_empty());
}

#[test]
fn test_handler_in_same_turn_suppresses_report() {
    let reports = collect_local();
    defer(|| {
        let rejected = Deferred::<i32>::reject("handled later in the turn");
        defer(move || {
            let _ = rejected.catch(|_| ok(0));
        });
    });
    run_until_idle();
    // The checkpoint runs after the whole drain, nested jobs included.
    assert!(reports.borrow().is_empty());
}

#[test]
fn test_only_the_end_of_a_chain_is_reported() {
    let reports = collect_local();
    let tail = Deferred::<i32>::reject("propagated").map(|v| v + 1).map(|v| v * 2);
    run_until_idle();

    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, Some(tail.id()));
}

#[test]
fn test_late_handler_still_runs() {
    let reports = collect_local();
    let rejected = Deferred::<i32>::reject("late");
    run_until_idle();
    assert_eq!(reports.borrow().len(), 1);

    let recovered = rejected.recover(|reason| reason.message().len() as i32);
    run_until_idle();
    assert_eq!(recovered.settled().unwrap().into_result().unwrap(), 4);
    assert_eq!(reports.borrow().len(), 1);
}

#[test]
fn test_dropped_values_are_forgotten() {
    let reports = collect_local();
    {
        let _dropped = Deferred::<i32>::reject("dropped");
        run_until_idle();
    }
    assert_eq!(unhandled::reported_count(), 1);

    let kept = Deferred::<i32>::reject("kept");
    run_until_idle();
    assert_eq!(reports.borrow().len(), 2);
    assert_eq!(unhandled::reported_count(), 1);

    let _recovered = kept.recover(|_| 0);
    assert_eq!(unhandled::reported_count(), 0);
}

#[test]
fn test_tracking_can_be_disabled() {
    EventLoop::install(SchedulerConfig {
        track_unhandled_rejections: false,
        ..SchedulerConfig::default()
    });
    let reports = collect_local();
    let _ = Deferred::<i32>::reject("silent");
    run_until_idle();
    assert!(reports.borrow().is_empty());
}

#[test]
fn test_global_hook() {
    const MARKER: &str = "reported through the process-wide hook";
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    set_unhandled_rejection_hook(move |report| sink.lock().push(report.message.clone()));

    let _ = Deferred::<i32>::reject(MARKER);
    run_until_idle();
    clear_unhandled_rejection_hook();

    // Other test threads may report through the same hook.
    assert_eq!(seen.lock().iter().filter(|m| m.as_str() == MARKER).count(), 1);
}
