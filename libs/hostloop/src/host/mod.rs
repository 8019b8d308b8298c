// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Boundary between the bridge and the host environment.
//!
//! The bridge never touches host internals directly. It hands values and
//! callback handles to a [`Host`] (invoke a callable, acquire/release a named
//! sink object), and it only ever does so on the main thread: the host is
//! installed in a main-thread slot by the [`EventLoop`](crate::core::EventLoop)
//! and [`with_host`] returns `None` anywhere else.

pub mod context;
pub mod local;
pub mod modules;

pub use context::{ContextGuard, ExecutionContext};
pub use local::{ConsoleLine, InvocationRecord, LocalHost};
pub use modules::{
    load_module, registered_modules, ModuleExports, ModuleRegistration, NativeFunction,
    NativeModule,
};

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

/// Handle to a callable owned by the host.
///
/// Handles are tied to the host context (`epoch`) they were issued in. Once the
/// host replaces its context the handle is stale and invoking it fails with
/// [`InvokeError::Stale`] instead of reaching freed state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackTarget {
    id: u64,
    epoch: u64,
    name: Arc<str>,
}

impl CallbackTarget {
    pub fn new(id: u64, epoch: u64, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            epoch,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.name, self.id, self.epoch)
    }
}

/// Error value handed to the host (e.g. first argument of a Node-style callback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error({}): {}", self.code, self.message)
    }
}

/// Opaque value passed across the host boundary.
#[derive(Clone)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
    Error(HostError),
    Callable(CallbackTarget),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl HostValue {
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        HostValue::Error(HostError {
            code,
            message: message.into(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, HostValue::Error(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, HostValue::Undefined | HostValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&CallbackTarget> {
        match self {
            HostValue::Callable(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&HostError> {
        match self {
            HostValue::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) => true,
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Json(a), HostValue::Json(b)) => a == b,
            (HostValue::Error(a), HostValue::Error(b)) => a == b,
            (HostValue::Callable(a), HostValue::Callable(b)) => a == b,
            (HostValue::Opaque(a), HostValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "Undefined"),
            HostValue::Null => write!(f, "Null"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Number(n) => write!(f, "Number({})", n),
            HostValue::String(s) => write!(f, "String({:?})", s),
            HostValue::Json(v) => write!(f, "Json({})", v),
            HostValue::Error(e) => write!(f, "{:?}", e),
            HostValue::Callable(t) => write!(f, "Callable({})", t),
            HostValue::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

/// String conversion as a script console would print it.
impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Number(n) => write!(f, "{}", n),
            HostValue::String(s) => write!(f, "{}", s),
            HostValue::Json(v) => write!(f, "{}", v),
            HostValue::Error(e) => write!(f, "{}", e),
            HostValue::Callable(t) => write!(f, "[Function: {}]", t.name()),
            HostValue::Opaque(_) => write!(f, "[object Opaque]"),
        }
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Number(value as f64)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        HostValue::Json(value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("Handle {target} is stale (host context is now epoch {current_epoch})")]
    Stale {
        target: String,
        current_epoch: u64,
    },

    #[error("Unknown callable: {0}")]
    Unknown(String),

    #[error("Host unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid arguments for {target}: {message}")]
    InvalidArguments { target: String, message: String },

    #[error("Callable {target} failed: {message}")]
    Failed { target: String, message: String },
}

/// Named function handles belonging to one host object (e.g. `console`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHandles {
    object: Arc<str>,
    epoch: u64,
    methods: BTreeMap<String, CallbackTarget>,
}

impl SinkHandles {
    pub fn new(object: impl Into<Arc<str>>, epoch: u64) -> Self {
        Self {
            object: object.into(),
            epoch,
            methods: BTreeMap::new(),
        }
    }

    pub fn with_method(mut self, name: impl Into<String>, target: CallbackTarget) -> Self {
        self.methods.insert(name.into(), target);
        self
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn get(&self, method: &str) -> Option<&CallbackTarget> {
        self.methods.get(method)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Invokes host callables. Only ever called on the main thread.
pub trait CallbackInvoker {
    fn invoke(
        &self,
        target: &CallbackTarget,
        args: &[HostValue],
        context: Option<&ExecutionContext>,
    ) -> Result<HostValue, InvokeError>;
}

/// Hands out named function sets (e.g. the `console` object's methods).
pub trait SinkProvider {
    /// `None` when the host currently has no such object.
    fn acquire_sink(&self, object: &str) -> Option<SinkHandles>;

    fn release_sink(&self, handles: &SinkHandles);
}

/// Everything the bridge needs from a host.
pub trait Host: CallbackInvoker + SinkProvider {}

impl<T: CallbackInvoker + SinkProvider + ?Sized> Host for T {}

thread_local! {
    static MAIN_HOST: RefCell<Option<Rc<dyn Host>>> = const { RefCell::new(None) };
}

/// Keeps a host installed in the current thread's slot; restores the previous
/// occupant on drop.
pub(crate) struct HostSlotGuard {
    previous: Option<Rc<dyn Host>>,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for HostSlotGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        MAIN_HOST.with(|slot| *slot.borrow_mut() = previous);
    }
}

pub(crate) fn install_host(host: Rc<dyn Host>) -> HostSlotGuard {
    let previous = MAIN_HOST.with(|slot| slot.borrow_mut().replace(host));
    HostSlotGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Run `f` against the host installed on this thread.
///
/// Returns `None` off the main thread or when no host is installed.
pub fn with_host<R>(f: impl FnOnce(&dyn Host) -> R) -> Option<R> {
    // Clone out of the slot so `f` may re-enter `with_host`.
    let host = MAIN_HOST.with(|slot| slot.borrow().clone());
    host.map(|host| f(host.as_ref()))
}

pub fn has_host() -> bool {
    MAIN_HOST.with(|slot| slot.borrow().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_console_conversion() {
        assert_eq!(HostValue::Undefined.to_string(), "undefined");
        assert_eq!(HostValue::Null.to_string(), "null");
        assert_eq!(HostValue::Number(25.0).to_string(), "25");
        assert_eq!(HostValue::from("hi").to_string(), "hi");
        assert_eq!(HostValue::error(1, "boom").to_string(), "Error(1): boom");
    }

    #[test]
    fn test_opaque_equality_is_identity() {
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(5u32);
        let a = HostValue::Opaque(Arc::clone(&payload));
        let b = HostValue::Opaque(payload);
        let c = HostValue::Opaque(Arc::new(5u32));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_host_slot_is_thread_local() {
        let host: Rc<dyn Host> = LocalHost::new();
        let guard = install_host(host);
        assert!(has_host());
        assert_eq!(with_host(|_| 1), Some(1));

        let elsewhere = std::thread::spawn(|| with_host(|_| 1)).join().unwrap();
        assert_eq!(elsewhere, None);

        drop(guard);
        assert!(!has_host());
    }

    #[test]
    fn test_sink_handles_lookup() {
        let handles = SinkHandles::new("console", 3)
            .with_method("log", CallbackTarget::new(1, 3, "console.log"))
            .with_method("warn", CallbackTarget::new(2, 3, "console.warn"));
        assert_eq!(handles.get("log").map(|t| t.id()), Some(1));
        assert!(handles.get("error").is_none());
        assert_eq!(handles.method_names().collect::<Vec<_>>(), vec!["log", "warn"]);
    }
}
