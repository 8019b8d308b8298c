// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Background work: `do_work` on the pool, completion on the main thread,
//! completion order independent of submission order.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hostloop::{
    BridgeError, CallbackTarget, EventLoop, ExecutionContext, HostValue, LocalHost, ThreadToken,
    PANIC_ERROR_CODE,
};
use parking_lot::Mutex;

/// Registers a host callable that records every argument list it receives.
fn recording_target(
    host: &LocalHost,
    name: &str,
) -> (CallbackTarget, Rc<RefCell<Vec<Vec<HostValue>>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    let target = host.register_function(name, move |args, _context| {
        sink.borrow_mut().push(args.to_vec());
        Ok(HostValue::Undefined)
    });
    (target, calls)
}

#[test]
fn test_square_scheduled_off_main_completes_on_main() {
    common::init_tracing();
    let host = LocalHost::new();
    let mut event_loop = EventLoop::builder().host(host.clone()).build().unwrap();
    let handle = event_loop.handle();
    let main = ThreadToken::current();
    let (target, calls) = recording_target(&host, "done");

    let work_thread = Arc::new(Mutex::new(None));
    let after_thread = Arc::new(Mutex::new(None));

    let remote = handle.clone();
    let work_slot = Arc::clone(&work_thread);
    let after_slot = Arc::clone(&after_thread);
    thread::spawn(move || {
        remote
            .schedule(
                5i64,
                move |work| {
                    *work_slot.lock() = Some(ThreadToken::current());
                    let n = *work.input();
                    work.set_result(n * n);
                },
                move |done| {
                    *after_slot.lock() = Some(ThreadToken::current());
                    let squared = done.take_result().unwrap_or_default();
                    done.set_node_style_args([HostValue::from(squared)]);
                },
                Some(target),
            )
            .unwrap();
    })
    .join()
    .unwrap();

    event_loop.run_until_drained().unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![vec![HostValue::Null, HostValue::Number(25.0)]]
    );
    assert_eq!(after_thread.lock().clone(), Some(main.clone()));

    let worker = work_thread.lock().clone().unwrap();
    assert_ne!(worker, main);
    assert!(worker.name().unwrap().starts_with("hostloop-worker-"));

    let invocation = host.invocations().pop().unwrap();
    assert_eq!(invocation.thread, main);
    assert_eq!(handle.work_in_flight(), 0);
}

#[test]
fn test_completion_order_follows_completion_not_submission() {
    common::init_tracing();
    let host = LocalHost::new();
    let mut event_loop = EventLoop::builder().host(host).build().unwrap();
    let handle = event_loop.handle();

    let order = Arc::new(Mutex::new(Vec::new()));
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);

    let first_order = Arc::clone(&order);
    handle
        .schedule::<&'static str, (), _, _>(
            "b1",
            move |_work| {
                // Held until b2 has fully completed on the main thread.
                let _ = gate_rx.recv_timeout(Duration::from_secs(10));
            },
            move |done| first_order.lock().push(*done.input()),
            None,
        )
        .unwrap();

    let second_order = Arc::clone(&order);
    handle
        .schedule::<&'static str, (), _, _>(
            "b2",
            |_work| {},
            move |done| {
                second_order.lock().push(*done.input());
                let _ = gate_tx.send(());
            },
            None,
        )
        .unwrap();

    event_loop.run_until_drained().unwrap();
    assert_eq!(*order.lock(), vec!["b2", "b1"]);
}

#[test]
fn test_error_is_first_completion_arg() {
    common::init_tracing();
    let host = LocalHost::new();
    let mut event_loop = EventLoop::builder().host(host.clone()).build().unwrap();
    let handle = event_loop.handle();
    let (target, calls) = recording_target(&host, "done");

    handle
        .schedule(
            -1i64,
            |work| {
                if *work.input() < 0 {
                    work.set_error(22, "negative input");
                } else {
                    work.set_result(*work.input());
                }
            },
            |done| {
                assert_eq!(done.error_code(), 22);
                assert!(done.result().is_none());
                done.set_node_style_args(Vec::new());
            },
            Some(target),
        )
        .unwrap();

    event_loop.run_until_drained().unwrap();
    assert_eq!(
        *calls.borrow(),
        vec![vec![HostValue::error(22, "negative input")]]
    );
}

#[test]
fn test_panicking_work_reports_error_instead_of_unwinding() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let seen = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&seen);
    handle
        .schedule::<(), u8, _, _>(
            (),
            |_work| panic!("worker exploded"),
            move |done| {
                *slot.lock() = Some((done.error_code(), done.error_message().to_string()));
            },
            None,
        )
        .unwrap();

    event_loop.run_until_drained().unwrap();
    let (code, message) = seen.lock().clone().unwrap();
    assert_eq!(code, PANIC_ERROR_CODE);
    assert!(message.contains("worker exploded"), "{}", message);

    // The pool survives: more work still completes.
    let again = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&again);
    handle
        .schedule::<(), u8, _, _>(
            (),
            |work| work.set_result(1),
            move |done| *flag.lock() = done.result() == Some(&1),
            None,
        )
        .unwrap();
    event_loop.run_until_drained().unwrap();
    assert!(*again.lock());
}

#[test]
fn test_completion_runs_in_captured_context() {
    common::init_tracing();
    let host = LocalHost::new();
    let mut event_loop = EventLoop::builder().host(host.clone()).build().unwrap();
    let handle = event_loop.handle();

    let seen_context = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&seen_context);
    let target = host.register_function("ctx", move |_args, _context| {
        *slot.borrow_mut() = ExecutionContext::current();
        Ok(HostValue::Undefined)
    });

    let request = ExecutionContext::new("request-17");
    {
        let _entered = request.enter();
        handle
            .schedule::<(), (), _, _>((), |_work| {}, |_done| {}, Some(target))
            .unwrap();
    }
    assert!(ExecutionContext::current().is_none());

    event_loop.run_until_drained().unwrap();

    assert_eq!(seen_context.borrow().clone(), Some(request.clone()));
    let invocation = host.invocations().pop().unwrap();
    assert_eq!(invocation.context, Some(request));
    // Context is exited once the completion returns.
    assert!(ExecutionContext::current().is_none());
}

#[test]
fn test_many_jobs_complete_exactly_once() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let completed = Arc::new(Mutex::new(Vec::new()));

    let submitters: Vec<_> = (0..4u64)
        .map(|t| {
            let handle = handle.clone();
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                for i in 0..25u64 {
                    let completed = Arc::clone(&completed);
                    handle
                        .schedule(
                            t * 100 + i,
                            |work| {
                                let v = *work.input();
                                work.set_result(v);
                            },
                            move |done| completed.lock().push(done.take_result().unwrap()),
                            None,
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    event_loop.run_until_drained().unwrap();

    let mut values = completed.lock().clone();
    values.sort_unstable();
    let expected: Vec<u64> = (0..4u64)
        .flat_map(|t| (0..25u64).map(move |i| t * 100 + i))
        .collect();
    assert_eq!(values, expected);
    assert_eq!(handle.work_in_flight(), 0);
}

#[test]
fn test_stale_completion_target_is_not_invoked() {
    common::init_tracing();
    let host = LocalHost::new();
    let mut event_loop = EventLoop::builder().host(host.clone()).build().unwrap();
    let handle = event_loop.handle();
    let (target, calls) = recording_target(&host, "done");

    host.replace_context();
    handle
        .schedule::<(), (), _, _>(
            (),
            |_work| {},
            |done| done.set_node_style_args(Vec::new()),
            Some(target),
        )
        .unwrap();

    event_loop.run_until_drained().unwrap();
    assert!(calls.borrow().is_empty());
    assert_eq!(handle.work_in_flight(), 0);
}

#[test]
fn test_schedule_after_loop_dropped_fails_closed() {
    common::init_tracing();
    let event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    drop(event_loop);

    let result = handle.schedule::<(), (), _, _>((), |_work| {}, |_done| {}, None);
    assert!(matches!(result, Err(BridgeError::LoopClosed(_))));
    assert_eq!(handle.work_in_flight(), 0);
}
