// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Main-thread dispatch.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::core::event_loop::LoopMessage;
use crate::core::{BridgeError, BridgeHandle, Result, ThreadToken};

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// A closure waiting to run on the main thread. Runs at most once; dropping it
/// unrun frees the captured state.
pub struct PendingClosure {
    id: u64,
    origin: ThreadToken,
    task: Task,
}

impl PendingClosure {
    pub(crate) fn new(id: u64, task: Task) -> Self {
        Self {
            id,
            origin: ThreadToken::current(),
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Thread that posted the closure.
    pub fn origin(&self) -> &ThreadToken {
        &self.origin
    }

    pub(crate) fn run(self) {
        tracing::trace!("[closure#{}] Running (posted from {})", self.id, self.origin);
        (self.task)()
    }
}

impl fmt::Debug for PendingClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingClosure")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .finish()
    }
}

impl BridgeHandle {
    /// Run `f` on the main thread.
    ///
    /// On the main thread `f` runs synchronously before this returns. From any
    /// other thread it is queued and runs exactly once on a later loop turn,
    /// after everything the same thread posted before it. Fails with
    /// [`BridgeError::QueueFull`] when the dispatch bound is reached and
    /// [`BridgeError::LoopClosed`] once the loop is gone; in both cases `f` is
    /// dropped without running.
    pub fn run_on_main<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            f();
            return Ok(());
        }

        if let Err(e) = self.shared.reserve_dispatch() {
            tracing::error!("Main-thread dispatch rejected: {}", e);
            return Err(e);
        }
        let closure = PendingClosure::new(self.shared.next_id(), Box::new(f));
        let id = closure.id();

        if self.shared.sender.send(LoopMessage::Dispatch(closure)).is_err() {
            self.shared.release_dispatch();
            tracing::error!("[closure#{}] Main loop closed, dispatch dropped", id);
            return Err(BridgeError::LoopClosed("main-thread dispatch"));
        }
        Ok(())
    }

    /// Run `f` on the main thread and resolve with its return value.
    ///
    /// The returned future does not borrow the handle and may be awaited on any
    /// runtime. Awaiting it on the main thread itself is pointless: there `f`
    /// has already run by the time this returns.
    pub fn run_on_main_async<F, T>(&self, f: F) -> MainThreadResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let posted = self.run_on_main(move || {
            let _ = tx.send(f());
        });
        MainThreadResult {
            rejected: posted.err(),
            rx,
        }
    }
}

/// Future returned by [`BridgeHandle::run_on_main_async`].
pub struct MainThreadResult<T> {
    rejected: Option<BridgeError>,
    rx: oneshot::Receiver<T>,
}

impl<T> Future for MainThreadResult<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(err) = self.rejected.take() {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| BridgeError::LoopClosed("main-thread result")))
    }
}
