// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Background work with main-thread completion.
//!
//! [`BridgeHandle::schedule`] runs `do_work` on a pool thread, then posts the
//! baton back so `after_work` and the completion target run on the main thread.
//! Ordering is by completion, not by submission.

mod baton;
mod pool;

pub use baton::{Baton, BatonState, CompletionPhase, WorkPhase, PANIC_ERROR_CODE};
pub(crate) use pool::WorkerPool;

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use crate::core::{BridgeError, BridgeHandle, Result};
use crate::host::{with_host, CallbackTarget, ExecutionContext};

/// Identifier of one scheduled unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub(crate) u64);

impl WorkId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work#{}", self.0)
    }
}

/// Work waiting for (or running on) a pool thread.
pub(crate) trait QueuedWork: Send {
    fn id(&self) -> WorkId;

    /// Run `do_work`. Never unwinds.
    fn perform(self: Box<Self>) -> Box<dyn CompletedWork>;
}

/// Work whose `do_work` has finished, waiting for the main thread.
pub(crate) trait CompletedWork: Send {
    fn id(&self) -> WorkId;

    /// Run `after_work` and invoke the completion target. Main thread only.
    fn complete(self: Box<Self>);
}

pub(crate) type Job = Box<dyn QueuedWork>;

struct ScheduledWork<I, R, D, A> {
    baton: Baton<I, R>,
    do_work: D,
    after_work: A,
}

struct FinishedWork<I, R, A> {
    baton: Baton<I, R>,
    after_work: A,
}

impl<I, R, D, A> QueuedWork for ScheduledWork<I, R, D, A>
where
    I: Send + 'static,
    R: Send + 'static,
    D: FnOnce(&mut WorkPhase<'_, I, R>) + Send + 'static,
    A: FnOnce(&mut CompletionPhase<'_, I, R>) + Send + 'static,
{
    fn id(&self) -> WorkId {
        self.baton.id()
    }

    fn perform(self: Box<Self>) -> Box<dyn CompletedWork> {
        let ScheduledWork {
            mut baton,
            do_work,
            after_work,
        } = *self;

        let span = baton.span.clone();
        let _entered = span.enter();
        baton.advance(BatonState::Working);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut phase = WorkPhase::new(&mut baton);
            do_work(&mut phase);
        }));
        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            tracing::error!("[{}] do_work panicked: {}", baton.id(), message);
            baton.fail(PANIC_ERROR_CODE, format!("do_work panicked: {}", message));
        }

        Box::new(FinishedWork { baton, after_work })
    }
}

impl<I, R, A> CompletedWork for FinishedWork<I, R, A>
where
    I: Send + 'static,
    R: Send + 'static,
    A: FnOnce(&mut CompletionPhase<'_, I, R>) + Send + 'static,
{
    fn id(&self) -> WorkId {
        self.baton.id()
    }

    fn complete(self: Box<Self>) {
        let FinishedWork {
            mut baton,
            after_work,
        } = *self;

        let span = baton.span.clone();
        let _entered = span.enter();
        let id = baton.id();

        baton.advance(BatonState::Completing);
        {
            let mut phase = CompletionPhase::new(&mut baton);
            after_work(&mut phase);
        }

        baton.advance(BatonState::Invoking);
        if let Some(target) = baton.take_target() {
            let context = baton.context().cloned();
            let _context_guard = context.as_ref().map(ExecutionContext::enter);
            let args = baton.take_completion_args();

            match with_host(|host| host.invoke(&target, &args, context.as_ref())) {
                Some(Ok(_)) => tracing::trace!("[{}] Completion target {} invoked", id, target),
                Some(Err(e)) => tracing::error!("[{}] Completion target failed: {}", id, e),
                None => tracing::warn!(
                    "[{}] No host on the completing thread, {} not invoked",
                    id,
                    target
                ),
            }
        }

        baton.advance(BatonState::Terminal);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl BridgeHandle {
    /// Run `do_work` on the worker pool, then `after_work` and the optional
    /// completion `target` on the main thread.
    ///
    /// The execution context current on the calling thread is captured and
    /// re-entered around the target invocation. A panic in `do_work` is caught
    /// and surfaces as [`PANIC_ERROR_CODE`] in the completion phase. Callable
    /// from any thread.
    pub fn schedule<I, R, D, A>(
        &self,
        input: I,
        do_work: D,
        after_work: A,
        target: Option<CallbackTarget>,
    ) -> Result<WorkId>
    where
        I: Send + 'static,
        R: Send + 'static,
        D: FnOnce(&mut WorkPhase<'_, I, R>) + Send + 'static,
        A: FnOnce(&mut CompletionPhase<'_, I, R>) + Send + 'static,
    {
        let id = WorkId(self.shared.next_id());
        let mut baton = Baton::new(
            id,
            input,
            target,
            ExecutionContext::current(),
            tracing::Span::current(),
        );
        baton.advance(BatonState::Queued);

        let job: Job = Box::new(ScheduledWork {
            baton,
            do_work,
            after_work,
        });

        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        if self.shared.jobs.send(job).is_err() {
            self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            tracing::error!("[{}] Worker pool closed, work dropped", id);
            return Err(BridgeError::LoopClosed("scheduled work"));
        }

        tracing::trace!("[{}] Queued for the worker pool", id);
        Ok(id)
    }
}
