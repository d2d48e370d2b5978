//! Completions posted from worker threads.

use std::thread;
use std::time::Duration;

use crossbeam::channel;
use deferred::{all, block_on, remote, Deferred, DeferredError, EventLoop};

#[test]
fn test_workers_settle_in_any_order() {
    let mut values = Vec::new();
    let mut workers = Vec::new();
    for n in 0..4u64 {
        let (value, settler) = remote::<u64>();
        values.push(value);
        workers.push(thread::spawn(move || {
            thread::sleep(Duration::from_millis(20 - n * 5));
            settler.fulfill(n * n);
        }));
    }
    let combined: Deferred<Vec<u64>> = all(values);
    assert_eq!(block_on(&combined).unwrap(), vec![0, 1, 4, 9]);
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(EventLoop::current().pending_jobs(), 0);
}

#[test]
fn test_worker_error_becomes_reason() {
    #[derive(Debug, thiserror::Error)]
    #[error("worker failed with code {0}")]
    struct WorkerError(i32);

    let (value, settler) = remote::<String>();
    thread::spawn(move || settler.reject(WorkerError(7)));
    let reason = block_on(&value).unwrap_err();
    assert_eq!(reason.message(), "worker failed with code 7");
    let inner = reason.downcast_ref::<anyhow::Error>().unwrap();
    assert_eq!(inner.downcast_ref::<WorkerError>().map(|e| e.0), Some(7));
}

#[test]
fn test_dropped_settler_rejects() {
    let (value, settler) = remote::<()>();
    let (ready_tx, ready_rx) = channel::bounded(1);
    let worker = thread::spawn(move || {
        let _settler = settler;
        ready_tx.send(()).unwrap();
    });
    ready_rx.recv().unwrap();
    worker.join().unwrap();

    let reason = block_on(&value).unwrap_err();
    assert_eq!(reason.as_deferred_error(), Some(&DeferredError::SettlerDropped));
}

#[test]
fn test_remote_value_chains_on_loop_thread() {
    let loop_thread = thread::current().id();
    let (value, settler) = remote::<i32>();
    let observed = value.map(move |v| (v, thread::current().id() == loop_thread));
    thread::spawn(move || settler.fulfill(5));
    assert_eq!(block_on(&observed).unwrap(), (5, true));
}
