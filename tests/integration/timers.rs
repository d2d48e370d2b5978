//! Wall-clock behaviour of timers and timer-backed values.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use deferred::{all, block_on, delay, race, set_timeout, Deferred, EventLoop, SchedulerConfig};

#[test]
fn test_race_ten_beats_hundred() {
    let started = Instant::now();
    let winner: Deferred<&str> = race(vec![
        delay(Duration::from_millis(100), "100ms"),
        delay(Duration::from_millis(10), "10ms"),
    ]);
    assert_eq!(block_on(&winner).unwrap(), "10ms");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(10));
    assert!(elapsed < Duration::from_millis(100), "took {:?}", elapsed);
}

#[test]
fn test_all_waits_for_slowest() {
    let started = Instant::now();
    let combined: Deferred<Vec<u64>> = all(
        [30u64, 5, 15]
            .into_iter()
            .map(|ms| delay(Duration::from_millis(ms), ms)),
    );
    assert_eq!(block_on(&combined).unwrap(), vec![30, 5, 15]);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_timeout_chain_keeps_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let staged = delay(Duration::from_millis(5), 1)
        .and_then(|v| delay(Duration::from_millis(5), v + 1))
        .map(move |v| {
            sink.borrow_mut().push(v);
            v
        });
    let early = log.clone();
    set_timeout(Duration::from_millis(1), move || early.borrow_mut().push(0));

    assert_eq!(block_on(&staged).unwrap(), 2);
    assert_eq!(*log.borrow(), vec![0, 2]);
}

#[test]
fn test_stats_count_timers() {
    let event_loop = EventLoop::install(SchedulerConfig {
        enable_stats: true,
        ..SchedulerConfig::default()
    });
    let value = delay(Duration::from_millis(2), ()).map(|()| "done");
    assert_eq!(block_on(&value).unwrap(), "done");
    let stats = event_loop.stats();
    assert_eq!(stats.timers_fired, 1);
    assert!(stats.jobs_run >= 2);
}
