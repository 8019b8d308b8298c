// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Ambient execution context.
//!
//! Hosts that track "which logical task caused this callback" (async hooks,
//! request scopes) expose that as an [`ExecutionContext`]. Work scheduled on
//! the pool captures the context current at schedule time and re-enters it
//! around its completion callback on the main thread.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ExecutionContext>> = const { RefCell::new(Vec::new()) };
}

#[derive(Clone)]
pub struct ExecutionContext {
    id: u64,
    label: Arc<str>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            payload: None,
        }
    }

    pub fn with_payload<T: Any + Send + Sync>(label: impl Into<Arc<str>>, payload: T) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            ..Self::new(label)
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Innermost context entered on this thread.
    pub fn current() -> Option<Self> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Make this the current context until the guard drops.
    pub fn enter(&self) -> ContextGuard {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(self.clone());
            stack.len() - 1
        });
        ContextGuard {
            depth,
            _not_send: PhantomData,
        }
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExecutionContext {}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Restores the previous context on drop. Must be dropped on the thread that
/// entered it.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ContextGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_and_exit_nest() {
        assert!(ExecutionContext::current().is_none());

        let outer = ExecutionContext::new("outer");
        let inner = ExecutionContext::new("inner");
        {
            let _outer = outer.enter();
            assert_eq!(ExecutionContext::current(), Some(outer.clone()));
            {
                let _inner = inner.enter();
                assert_eq!(ExecutionContext::current().unwrap().label(), "inner");
            }
            assert_eq!(ExecutionContext::current(), Some(outer.clone()));
        }
        assert!(ExecutionContext::current().is_none());
    }

    #[test]
    fn test_context_does_not_leak_across_threads() {
        let ctx = ExecutionContext::new("request");
        let _guard = ctx.enter();
        let seen = std::thread::spawn(ExecutionContext::current).join().unwrap();
        assert!(seen.is_none());
    }

    #[test]
    fn test_payload_downcast() {
        let ctx = ExecutionContext::with_payload("req", 42u64);
        assert_eq!(ctx.payload::<u64>(), Some(&42));
        assert_eq!(ctx.payload::<String>(), None);
        assert_ne!(ctx.id(), ExecutionContext::new("req").id());
    }
}
