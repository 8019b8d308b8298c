// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-process reference host.
//!
//! `LocalHost` keeps a registry of Rust closures addressed by
//! [`CallbackTarget`] and an optional `console` object whose methods record a
//! transcript and forward to `tracing`. Replacing the context bumps the epoch,
//! which frees every function and object of the previous context; handles
//! issued before that fail with [`InvokeError::Stale`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::console::ConsoleLevel;
use crate::core::ThreadToken;
use crate::host::{
    CallbackInvoker, CallbackTarget, ExecutionContext, HostValue, InvokeError, SinkHandles,
    SinkProvider,
};

type HostFn = Rc<dyn Fn(&[HostValue], Option<&ExecutionContext>) -> Result<HostValue, InvokeError>>;

/// One line written through the host's `console` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub message: String,
    pub epoch: u64,
}

/// One successful dispatch to a registered function.
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub target: CallbackTarget,
    pub arg_count: usize,
    pub context: Option<ExecutionContext>,
    pub thread: ThreadToken,
}

struct Registered {
    target: CallbackTarget,
    function: HostFn,
}

struct HostState {
    epoch: u64,
    next_id: u64,
    functions: HashMap<u64, Registered>,
    objects: HashMap<String, SinkHandles>,
    console_installed: bool,
    active_leases: usize,
    invocations: Vec<InvocationRecord>,
}

pub struct LocalHost {
    state: RefCell<HostState>,
    transcript: Rc<RefCell<Vec<ConsoleLine>>>,
}

impl LocalHost {
    /// Host with a `console` object installed.
    pub fn new() -> Rc<Self> {
        let host = Self::bare();
        host.install_console();
        host
    }

    /// Host with no objects at all.
    pub fn bare() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(HostState {
                epoch: 1,
                next_id: 1,
                functions: HashMap::new(),
                objects: HashMap::new(),
                console_installed: false,
                active_leases: 0,
                invocations: Vec::new(),
            }),
            transcript: Rc::new(RefCell::new(Vec::new())),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    /// Register a callable in the current context.
    pub fn register_function<F>(&self, name: &str, function: F) -> CallbackTarget
    where
        F: Fn(&[HostValue], Option<&ExecutionContext>) -> Result<HostValue, InvokeError> + 'static,
    {
        let mut state = self.state.borrow_mut();
        let target = CallbackTarget::new(state.next_id, state.epoch, name);
        state.next_id += 1;
        state.functions.insert(
            target.id(),
            Registered {
                target: target.clone(),
                function: Rc::new(function),
            },
        );
        tracing::trace!("Registered host function {}", target);
        target
    }

    /// Install (or reinstall) the `console` object for the current context.
    pub fn install_console(&self) {
        let epoch = self.epoch();
        let mut handles = SinkHandles::new("console", epoch);
        for level in ConsoleLevel::ALL {
            let transcript = Rc::clone(&self.transcript);
            let target = self.register_function(
                &format!("console.{}", level.as_str()),
                move |args, _context| {
                    let message = args
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(" ");
                    match level {
                        ConsoleLevel::Error => tracing::error!(target: "hostloop::console", "{}", message),
                        ConsoleLevel::Warn => tracing::warn!(target: "hostloop::console", "{}", message),
                        ConsoleLevel::Log | ConsoleLevel::Info => {
                            tracing::info!(target: "hostloop::console", "{}", message)
                        }
                    }
                    transcript.borrow_mut().push(ConsoleLine {
                        level,
                        message,
                        epoch,
                    });
                    Ok(HostValue::Undefined)
                },
            );
            handles = handles.with_method(level.as_str(), target);
        }

        let mut state = self.state.borrow_mut();
        state.objects.insert("console".to_string(), handles);
        state.console_installed = true;
    }

    /// Remove a named object from the current context.
    pub fn remove_object(&self, object: &str) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(handles) = state.objects.remove(object) else {
            return false;
        };
        for name in handles.method_names() {
            if let Some(target) = handles.get(name) {
                state.functions.remove(&target.id());
            }
        }
        if object == "console" {
            state.console_installed = false;
        }
        true
    }

    /// Tear down the current context and start a new one.
    ///
    /// Every function and object of the old context is freed. The console is
    /// reinstalled (with fresh handles) if it was present.
    pub fn replace_context(&self) -> u64 {
        let (epoch, reinstall) = {
            let mut state = self.state.borrow_mut();
            state.epoch += 1;
            state.functions.clear();
            state.objects.clear();
            (state.epoch, state.console_installed)
        };
        tracing::debug!("Host context replaced, now epoch {}", epoch);
        if reinstall {
            self.install_console();
        }
        epoch
    }

    /// Sink leases acquired and not yet released.
    pub fn active_leases(&self) -> usize {
        self.state.borrow().active_leases
    }

    pub fn console_output(&self) -> Vec<ConsoleLine> {
        self.transcript.borrow().clone()
    }

    pub fn console_messages(&self) -> Vec<String> {
        self.transcript
            .borrow()
            .iter()
            .map(|line| line.message.clone())
            .collect()
    }

    pub fn invocations(&self) -> Vec<InvocationRecord> {
        self.state.borrow().invocations.clone()
    }
}

impl CallbackInvoker for LocalHost {
    fn invoke(
        &self,
        target: &CallbackTarget,
        args: &[HostValue],
        context: Option<&ExecutionContext>,
    ) -> Result<HostValue, InvokeError> {
        // Borrow is released before calling out so the function may re-enter the host.
        let function = {
            let mut state = self.state.borrow_mut();
            if target.epoch() != state.epoch {
                return Err(InvokeError::Stale {
                    target: target.to_string(),
                    current_epoch: state.epoch,
                });
            }
            let function = match state.functions.get(&target.id()) {
                Some(registered) if registered.target == *target => Rc::clone(&registered.function),
                _ => return Err(InvokeError::Unknown(target.to_string())),
            };
            state.invocations.push(InvocationRecord {
                target: target.clone(),
                arg_count: args.len(),
                context: context.cloned(),
                thread: ThreadToken::current(),
            });
            function
        };
        function(args, context)
    }
}

impl SinkProvider for LocalHost {
    fn acquire_sink(&self, object: &str) -> Option<SinkHandles> {
        let mut state = self.state.borrow_mut();
        let handles = state.objects.get(object).cloned()?;
        state.active_leases += 1;
        Some(handles)
    }

    fn release_sink(&self, handles: &SinkHandles) {
        let mut state = self.state.borrow_mut();
        if state.active_leases == 0 {
            tracing::warn!("Release of '{}' sink without an active lease", handles.object());
            return;
        }
        state.active_leases -= 1;
    }
}
