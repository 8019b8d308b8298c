// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! One-shot callbacks run when the main loop has nothing else to do.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::core::dispatcher::PendingClosure;
use crate::core::event_loop::LoopMessage;
use crate::core::{BridgeError, BridgeHandle, Result};

#[derive(Default)]
pub(crate) struct IdleQueue {
    callbacks: Mutex<VecDeque<PendingClosure>>,
}

impl IdleQueue {
    pub(crate) fn push(&self, closure: PendingClosure) {
        self.callbacks.lock().push_back(closure);
    }

    pub(crate) fn remove(&self, id: u64) -> Option<PendingClosure> {
        let mut callbacks = self.callbacks.lock();
        let index = callbacks.iter().position(|c| c.id() == id)?;
        callbacks.remove(index)
    }

    /// Everything registered so far, in registration order. Callbacks
    /// registered after this returns belong to the next idle phase.
    pub(crate) fn take_batch(&self) -> Vec<PendingClosure> {
        self.callbacks.lock().drain(..).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.lock().len()
    }
}

impl BridgeHandle {
    /// Run `f` once on the main thread during the next idle phase.
    ///
    /// The idle phase starts only once no dispatched closures or completions
    /// are waiting, so `f` runs after everything already pending when it was
    /// registered. Callbacks registered while an idle phase is running wait for
    /// the following phase. Callable from any thread; fails with
    /// [`BridgeError::LoopClosed`] once the loop is dropped.
    pub fn on_idle<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.is_closed() {
            tracing::error!("Main loop closed, idle callback rejected");
            return Err(BridgeError::LoopClosed("idle callback"));
        }

        let closure = PendingClosure::new(self.shared.next_id(), Box::new(f));
        let id = closure.id();
        self.shared.idle.push(closure);

        // The main thread is busy running us; it will see the registration.
        if self.is_main_thread() {
            return Ok(());
        }

        // A loop dropped after the first check may already have drained the queue.
        if self.shared.sender.send(LoopMessage::Wake).is_err() || self.shared.is_closed() {
            drop(self.shared.idle.remove(id));
            tracing::error!("[closure#{}] Main loop closed, idle callback dropped", id);
            return Err(BridgeError::LoopClosed("idle callback"));
        }
        Ok(())
    }

    /// Idle callbacks waiting for the next idle phase.
    pub fn pending_idle(&self) -> usize {
        self.shared.idle.len()
    }
}
