// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use crate::core::work_queue::WorkId;
use crate::host::{CallbackTarget, ExecutionContext, HostValue};

/// Error code recorded when `do_work` panics.
pub const PANIC_ERROR_CODE: i32 = -1;

/// Lifecycle of one unit of background work.
///
/// `Created → Queued → Working → Completing → Invoking → Terminal`. Only the
/// `Working` step runs on a pool thread; every other step runs on the main
/// thread (or, for `Created`/`Queued`, on the scheduling thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatonState {
    Created,
    Queued,
    Working,
    Completing,
    Invoking,
    Terminal,
}

impl BatonState {
    fn successor(self) -> Option<BatonState> {
        match self {
            BatonState::Created => Some(BatonState::Queued),
            BatonState::Queued => Some(BatonState::Working),
            BatonState::Working => Some(BatonState::Completing),
            BatonState::Completing => Some(BatonState::Invoking),
            BatonState::Invoking => Some(BatonState::Terminal),
            BatonState::Terminal => None,
        }
    }
}

impl fmt::Display for BatonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatonState::Created => "created",
            BatonState::Queued => "queued",
            BatonState::Working => "working",
            BatonState::Completing => "completing",
            BatonState::Invoking => "invoking",
            BatonState::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Per-job record carried from the scheduling thread to a pool thread and back
/// to the main thread.
///
/// `I` is the input handed to `do_work`, `R` the result it produces. An error
/// code of `0` means success.
pub struct Baton<I, R> {
    id: WorkId,
    state: BatonState,
    input: I,
    result: Option<R>,
    error_code: i32,
    error_message: String,
    completion_args: Vec<HostValue>,
    context: Option<ExecutionContext>,
    target: Option<CallbackTarget>,
    pub(crate) span: tracing::Span,
}

impl<I, R> Baton<I, R> {
    pub(crate) fn new(
        id: WorkId,
        input: I,
        target: Option<CallbackTarget>,
        context: Option<ExecutionContext>,
        span: tracing::Span,
    ) -> Self {
        Self {
            id,
            state: BatonState::Created,
            input,
            result: None,
            error_code: 0,
            error_message: String::new(),
            completion_args: Vec::new(),
            context,
            target,
            span,
        }
    }

    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn state(&self) -> BatonState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: BatonState) {
        debug_assert_eq!(
            self.state.successor(),
            Some(next),
            "[{}] invalid transition {} -> {}",
            self.id,
            self.state,
            next
        );
        tracing::trace!("[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    pub(crate) fn fail(&mut self, code: i32, message: String) {
        self.error_code = code;
        self.error_message = message;
    }

    pub(crate) fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    pub(crate) fn take_target(&mut self) -> Option<CallbackTarget> {
        self.target.take()
    }

    pub(crate) fn take_completion_args(&mut self) -> Vec<HostValue> {
        std::mem::take(&mut self.completion_args)
    }
}

impl<I, R> fmt::Debug for Baton<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Baton")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("error_code", &self.error_code)
            .field("has_result", &self.result.is_some())
            .field("target", &self.target)
            .finish()
    }
}

/// View of a baton handed to `do_work` on a pool thread.
///
/// No host access is possible from here; the only way out is the result or
/// error recorded on the baton.
pub struct WorkPhase<'a, I, R> {
    baton: &'a mut Baton<I, R>,
}

impl<'a, I, R> WorkPhase<'a, I, R> {
    pub(crate) fn new(baton: &'a mut Baton<I, R>) -> Self {
        Self { baton }
    }

    pub fn id(&self) -> WorkId {
        self.baton.id
    }

    pub fn input(&self) -> &I {
        &self.baton.input
    }

    pub fn set_result(&mut self, result: R) {
        self.baton.result = Some(result);
    }

    /// Record a failure. `code` should be non-zero; `0` reads as success.
    pub fn set_error(&mut self, code: i32, message: impl Into<String>) {
        self.baton.fail(code, message.into());
    }

    pub fn error_code(&self) -> i32 {
        self.baton.error_code
    }
}

/// View of a baton handed to `after_work` on the main thread.
pub struct CompletionPhase<'a, I, R> {
    baton: &'a mut Baton<I, R>,
}

impl<'a, I, R> CompletionPhase<'a, I, R> {
    pub(crate) fn new(baton: &'a mut Baton<I, R>) -> Self {
        Self { baton }
    }

    pub fn id(&self) -> WorkId {
        self.baton.id
    }

    pub fn input(&self) -> &I {
        &self.baton.input
    }

    pub fn result(&self) -> Option<&R> {
        self.baton.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<R> {
        self.baton.result.take()
    }

    pub fn error_code(&self) -> i32 {
        self.baton.error_code
    }

    pub fn error_message(&self) -> &str {
        &self.baton.error_message
    }

    pub fn is_error(&self) -> bool {
        self.baton.error_code != 0
    }

    /// Context captured when the work was scheduled.
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.baton.context.as_ref()
    }

    /// Arguments the completion target is invoked with.
    pub fn set_completion_args(&mut self, args: Vec<HostValue>) {
        self.baton.completion_args = args;
    }

    /// `[error]` on failure, otherwise `[null, ...results]`.
    pub fn set_node_style_args(&mut self, results: impl IntoIterator<Item = HostValue>) {
        let args = if self.is_error() {
            vec![HostValue::error(
                self.baton.error_code,
                self.baton.error_message.clone(),
            )]
        } else {
            std::iter::once(HostValue::Null).chain(results).collect()
        };
        self.baton.completion_args = args;
    }
}
