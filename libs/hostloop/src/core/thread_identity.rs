// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Which OS thread is "main".
//!
//! The main thread is recorded explicitly by whoever constructs the
//! [`EventLoop`](crate::core::EventLoop) on it. The record is write-once: it is
//! established the first time it is bound and never changes afterward. There is
//! no discovery fallback; until the identity is bound every thread is treated
//! as "not main", so nothing is ever run inline on a guessed thread.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;

use crate::core::{BridgeError, Result};

/// Opaque identifier of an OS thread.
///
/// Equality and hashing use the thread id only; the name is carried for
/// diagnostics.
#[derive(Clone)]
pub struct ThreadToken {
    id: ThreadId,
    name: Option<Arc<str>>,
}

impl ThreadToken {
    /// Token for the calling thread.
    pub fn current() -> Self {
        let thread = std::thread::current();
        Self {
            id: thread.id(),
            name: thread.name().map(Arc::from),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for ThreadToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ThreadToken {}

impl Hash for ThreadToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadToken")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "'{}' ({:?})", name, self.id),
            None => write!(f, "{:?}", self.id),
        }
    }
}

/// Shared, write-once record of the main thread.
///
/// Cloning is cheap and every clone observes the same record.
#[derive(Clone, Default)]
pub struct ThreadIdentity {
    main: Arc<OnceLock<ThreadToken>>,
}

impl ThreadIdentity {
    /// Identity with no main thread yet. Fails closed until bound.
    pub fn unresolved() -> Self {
        Self::default()
    }

    /// Identity bound to the calling thread.
    pub fn capture_current() -> Self {
        let identity = Self::unresolved();
        let token = ThreadToken::current();
        tracing::debug!("Main thread captured: {}", token);
        let _ = identity.main.set(token);
        identity
    }

    /// Bind the calling thread as main if nothing is bound yet.
    ///
    /// Binding again from the main thread is a no-op. Binding from any other
    /// thread once resolved returns [`BridgeError::NotMainThread`].
    pub fn bind_current(&self) -> Result<ThreadToken> {
        let current = ThreadToken::current();
        let main = self.main.get_or_init(|| {
            tracing::debug!("Main thread bound lazily: {}", current);
            current.clone()
        });

        if *main == current {
            Ok(main.clone())
        } else {
            Err(BridgeError::NotMainThread {
                expected: main.clone(),
                actual: current,
            })
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.main.get().is_some()
    }

    /// The main thread, or [`BridgeError::IdentityUnresolved`].
    pub fn main_thread(&self) -> Result<ThreadToken> {
        self.main.get().cloned().ok_or(BridgeError::IdentityUnresolved)
    }

    /// `false` on every thread while unresolved.
    pub fn is_main_thread(&self) -> bool {
        let current = std::thread::current().id();
        self.main.get().is_some_and(|main| main.id == current)
    }

    /// Error unless the caller is on the (resolved) main thread.
    pub fn ensure_main(&self) -> Result<()> {
        let main = self.main_thread()?;
        let current = ThreadToken::current();
        if main == current {
            Ok(())
        } else {
            Err(BridgeError::NotMainThread {
                expected: main,
                actual: current,
            })
        }
    }
}

impl fmt::Debug for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadIdentity")
            .field("main", &self.main.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_current_is_main_here_only() {
        let identity = ThreadIdentity::capture_current();
        assert!(identity.is_main_thread());
        assert!(identity.ensure_main().is_ok());

        let remote = identity.clone();
        let on_other = std::thread::spawn(move || remote.is_main_thread())
            .join()
            .unwrap();
        assert!(!on_other);
    }

    #[test]
    fn test_unresolved_fails_closed() {
        let identity = ThreadIdentity::unresolved();
        assert!(!identity.is_resolved());
        assert!(!identity.is_main_thread());
        assert!(matches!(
            identity.main_thread(),
            Err(BridgeError::IdentityUnresolved)
        ));
        assert!(matches!(
            identity.ensure_main(),
            Err(BridgeError::IdentityUnresolved)
        ));
    }

    #[test]
    fn test_bind_is_write_once() {
        let identity = ThreadIdentity::unresolved();

        let remote = identity.clone();
        let bound = std::thread::Builder::new()
            .name("first-binder".into())
            .spawn(move || remote.bind_current().unwrap())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(bound.name(), Some("first-binder"));

        // A later bind from a different thread must not move the record.
        match identity.bind_current() {
            Err(BridgeError::NotMainThread { expected, actual }) => {
                assert_eq!(expected, bound);
                assert_eq!(actual, ThreadToken::current());
            }
            other => panic!("Expected NotMainThread, got {:?}", other),
        }
        assert!(!identity.is_main_thread());
        assert_eq!(identity.main_thread().unwrap(), bound);
    }

    #[test]
    fn test_rebind_from_main_is_noop() {
        let identity = ThreadIdentity::capture_current();
        let first = identity.main_thread().unwrap();
        let again = identity.bind_current().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_token_equality_ignores_name() {
        let token = ThreadToken::current();
        let clone = ThreadToken {
            id: token.id(),
            name: Some(Arc::from("renamed")),
        };
        assert_eq!(token, clone);
    }
}
