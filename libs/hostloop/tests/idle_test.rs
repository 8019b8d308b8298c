// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Idle callbacks run once, after pending dispatches, one phase at a time.

mod common;

use std::sync::Arc;
use std::thread;

use hostloop::{BridgeError, EventLoop, ThreadToken};
use parking_lot::Mutex;

#[test]
fn test_idle_runs_after_pending_dispatches() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let order = Arc::new(Mutex::new(Vec::new()));

    let remote = handle.clone();
    let log = Arc::clone(&order);
    thread::spawn(move || {
        let idle_log = Arc::clone(&log);
        remote
            .on_idle(move || idle_log.lock().push("idle".to_string()))
            .unwrap();
        for i in 0..10 {
            let log = Arc::clone(&log);
            remote
                .run_on_main(move || log.lock().push(format!("dispatch-{}", i)))
                .unwrap();
        }
    })
    .join()
    .unwrap();

    event_loop.run_until_drained().unwrap();

    let mut expected: Vec<String> = (0..10).map(|i| format!("dispatch-{}", i)).collect();
    expected.push("idle".to_string());
    assert_eq!(*order.lock(), expected);
}

#[test]
fn test_idle_registered_from_main_closure_waits_for_queued_work() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let order = Arc::new(Mutex::new(Vec::new()));

    let remote = handle.clone();
    let log = Arc::clone(&order);
    thread::spawn(move || {
        let inner = remote.clone();
        remote
            .run_on_main(move || {
                let idle_log = Arc::clone(&log);
                inner
                    .on_idle(move || idle_log.lock().push("idle".to_string()))
                    .unwrap();

                // Ten more dispatches from a worker, queued before the idle phase.
                let worker = inner.clone();
                let worker_log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..10 {
                        let log = Arc::clone(&worker_log);
                        worker
                            .run_on_main(move || log.lock().push(format!("dispatch-{}", i)))
                            .unwrap();
                    }
                })
                .join()
                .unwrap();
            })
            .unwrap();
    })
    .join()
    .unwrap();

    event_loop.run_until_drained().unwrap();

    let order = order.lock();
    assert_eq!(order.len(), 11);
    assert_eq!(order.last().map(String::as_str), Some("idle"));
}

#[test]
fn test_idle_callback_runs_once_on_main() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let runs = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&runs);
    handle
        .on_idle(move || log.lock().push(ThreadToken::current()))
        .unwrap();
    assert_eq!(handle.pending_idle(), 1);

    assert_eq!(event_loop.turn().unwrap(), 1);
    assert_eq!(event_loop.turn().unwrap(), 0);
    event_loop.run_until_drained().unwrap();

    assert_eq!(*runs.lock(), vec![ThreadToken::current()]);
    assert_eq!(handle.pending_idle(), 0);
}

#[test]
fn test_registration_during_idle_phase_waits_for_next_phase() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let order = Arc::new(Mutex::new(Vec::new()));

    let inner = handle.clone();
    let log = Arc::clone(&order);
    handle
        .on_idle(move || {
            log.lock().push("first");
            let next = Arc::clone(&log);
            inner.on_idle(move || next.lock().push("second")).unwrap();
        })
        .unwrap();

    assert_eq!(event_loop.turn().unwrap(), 1);
    assert_eq!(*order.lock(), vec!["first"]);
    assert_eq!(handle.pending_idle(), 1);

    assert_eq!(event_loop.turn().unwrap(), 1);
    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[test]
fn test_idle_phase_preserves_registration_order() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let log = Arc::clone(&order);
        handle.on_idle(move || log.lock().push(i)).unwrap();
    }
    event_loop.run_until_drained().unwrap();
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_idle_after_loop_dropped_fails_closed() {
    common::init_tracing();
    let event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    drop(event_loop);

    let remote = handle.clone();
    let result = thread::spawn(move || remote.on_idle(|| {})).join().unwrap();
    assert!(matches!(result, Err(BridgeError::LoopClosed(_))));
    assert_eq!(handle.pending_idle(), 0);
}

#[test]
fn test_idle_on_main_after_loop_dropped_fails_closed() {
    common::init_tracing();
    let event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    drop(event_loop);

    let ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&ran);
    let result = handle.on_idle(move || *flag.lock() = true);

    assert!(matches!(result, Err(BridgeError::LoopClosed(_))));
    assert_eq!(handle.pending_idle(), 0);
    assert!(!*ran.lock());
}

#[test]
fn test_idle_callbacks_unrun_at_drop_are_released() {
    common::init_tracing();
    let event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();

    let marker = Arc::new(());
    let held = Arc::clone(&marker);
    handle.on_idle(move || drop(held)).unwrap();
    assert_eq!(Arc::strong_count(&marker), 2);

    drop(event_loop);
    assert_eq!(handle.pending_idle(), 0);
    assert_eq!(Arc::strong_count(&marker), 1);
}
