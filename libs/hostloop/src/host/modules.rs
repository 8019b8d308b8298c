// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::BridgeHandle;
use crate::host::{with_host, CallbackTarget, ExecutionContext, HostValue, InvokeError};

/// A native function exported to the host. Callable from any thread.
pub type NativeFunction = Arc<dyn Fn(&[HostValue]) -> Result<HostValue, InvokeError> + Send + Sync>;

/// Functions a module hands to the host when it is loaded.
#[derive(Clone)]
pub struct ModuleExports {
    module: String,
    functions: BTreeMap<String, NativeFunction>,
}

impl ModuleExports {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            functions: BTreeMap::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn set<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[HostValue]) -> Result<HostValue, InvokeError> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<NativeFunction> {
        self.functions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Call an export by name.
    pub fn call(&self, name: &str, args: &[HostValue]) -> Result<HostValue, InvokeError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| InvokeError::Unknown(format!("{}.{}", self.module, name)))?;
        function(args)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleExports")
            .field("module", &self.module)
            .field("functions", &self.names())
            .finish()
    }
}

/// A native module that can be loaded into a host.
///
/// Register implementations at compile time:
///
/// ```ignore
/// #[derive(Default)]
/// struct Greeter;
///
/// impl NativeModule for Greeter {
///     fn name(&self) -> &'static str { "greeter" }
///
///     fn init(&self, exports: &mut ModuleExports, bridge: &BridgeHandle) {
///         exports.set("hello", |_| Ok("hello".into()));
///     }
/// }
///
/// inventory::submit! {
///     ModuleRegistration::new::<Greeter>()
/// }
/// ```
pub trait NativeModule: Send + Sync + Default + 'static {
    fn name(&self) -> &'static str;

    /// Populate the module's exports. Called once per load.
    fn init(&self, exports: &mut ModuleExports, bridge: &BridgeHandle);
}

/// Registration entry for a [`NativeModule`].
/// Uses function pointers to avoid non-const Box::new in statics.
pub struct ModuleRegistration {
    pub name_fn: fn() -> &'static str,
    pub init_fn: fn(&mut ModuleExports, &BridgeHandle),
}

impl ModuleRegistration {
    pub const fn new<T: NativeModule>() -> Self {
        Self {
            name_fn: || T::default().name(),
            init_fn: |exports, bridge| T::default().init(exports, bridge),
        }
    }
}

inventory::collect!(ModuleRegistration);

/// Names of every module linked into this binary, sorted.
pub fn registered_modules() -> Vec<&'static str> {
    let mut names: Vec<_> = inventory::iter::<ModuleRegistration>
        .into_iter()
        .map(|registration| (registration.name_fn)())
        .collect();
    names.sort_unstable();
    names
}

/// Instantiate a registered module against `bridge`.
pub fn load_module(name: &str, bridge: &BridgeHandle) -> Option<ModuleExports> {
    let registration = inventory::iter::<ModuleRegistration>
        .into_iter()
        .find(|registration| (registration.name_fn)() == name)?;

    let mut exports = ModuleExports::new(name);
    (registration.init_fn)(&mut exports, bridge);
    tracing::debug!("[{}] Module loaded with {} export(s)", name, exports.len());
    Some(exports)
}

/// Built-in `hostloop` module: main-thread checks and dispatch for host callables.
#[derive(Default)]
struct BridgeModule;

impl NativeModule for BridgeModule {
    fn name(&self) -> &'static str {
        "hostloop"
    }

    fn init(&self, exports: &mut ModuleExports, bridge: &BridgeHandle) {
        let handle = bridge.clone();
        exports.set("isMainThread", move |_| Ok(HostValue::Bool(handle.is_main_thread())));

        // runOnMain(callable, ...args)
        let handle = bridge.clone();
        exports.set("runOnMain", move |args| {
            let (target, rest) = split_callable("runOnMain", args)?;
            handle
                .run_on_main(move || invoke_on_main(&target, &rest))
                .map_err(|e| InvokeError::Unavailable(e.to_string()))?;
            Ok(HostValue::Undefined)
        });

        // onIdle(callable, ...args)
        let handle = bridge.clone();
        exports.set("onIdle", move |args| {
            let (target, rest) = split_callable("onIdle", args)?;
            handle
                .on_idle(move || invoke_on_main(&target, &rest))
                .map_err(|e| InvokeError::Unavailable(e.to_string()))?;
            Ok(HostValue::Undefined)
        });
    }
}

inventory::submit! {
    ModuleRegistration::new::<BridgeModule>()
}

fn split_callable(
    export: &str,
    args: &[HostValue],
) -> Result<(CallbackTarget, Vec<HostValue>), InvokeError> {
    match args.split_first() {
        Some((HostValue::Callable(target), rest)) => Ok((target.clone(), rest.to_vec())),
        _ => Err(InvokeError::InvalidArguments {
            target: format!("hostloop.{}", export),
            message: "first argument must be a function".to_string(),
        }),
    }
}

fn invoke_on_main(target: &CallbackTarget, args: &[HostValue]) {
    let context = ExecutionContext::current();
    match with_host(|host| host.invoke(target, args, context.as_ref())) {
        Some(Ok(_)) => {}
        Some(Err(e)) => tracing::warn!("[{}] Host callback failed: {}", target.name(), e),
        None => tracing::warn!("[{}] No host on this thread, callback dropped", target.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_module_is_registered() {
        assert!(registered_modules().contains(&"hostloop"));
    }

    #[test]
    fn test_exports_call_unknown_name() {
        let mut exports = ModuleExports::new("demo");
        exports.set("one", |_| Ok(HostValue::Number(1.0)));
        assert_eq!(exports.call("one", &[]).unwrap(), HostValue::Number(1.0));
        assert!(matches!(
            exports.call("two", &[]),
            Err(InvokeError::Unknown(name)) if name == "demo.two"
        ));
    }

    #[test]
    fn test_split_callable_requires_function_first() {
        let target = CallbackTarget::new(7, 1, "cb");
        let (found, rest) =
            split_callable("runOnMain", &[HostValue::Callable(target.clone()), 1i64.into()]).unwrap();
        assert_eq!(found, target);
        assert_eq!(rest, vec![HostValue::Number(1.0)]);

        assert!(matches!(
            split_callable("runOnMain", &["nope".into()]),
            Err(InvokeError::InvalidArguments { .. })
        ));
    }
}
