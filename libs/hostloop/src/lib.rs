// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Cross-thread execution bridge.
//!
//! One thread is designated "main" by building an [`EventLoop`] on it. Any
//! other thread can then, through a [`BridgeHandle`]:
//!
//! - run a closure on the main thread ([`BridgeHandle::run_on_main`]),
//! - register a one-shot idle callback ([`BridgeHandle::on_idle`]),
//! - run work on the background pool and complete it on the main thread
//!   ([`BridgeHandle::schedule`]).
//!
//! Host callables (see [`host`]) are only ever touched on the main thread.

#![allow(clippy::type_complexity)]

// Re-exported for `inventory::submit!` in dependent crates
pub use inventory;

pub mod console;
pub mod core;
pub mod host;

pub use console::{Console, ConsoleLevel, SinkLease, CONSOLE_OBJECT};
pub use crate::core::{
    Baton, BatonState, BridgeConfig, BridgeError, BridgeHandle, CompletionPhase, EventLoop,
    EventLoopBuilder, MainThreadResult, PendingClosure, Result, ThreadIdentity, ThreadToken,
    WorkId, WorkPhase, PANIC_ERROR_CODE,
};
pub use host::{
    with_host, CallbackInvoker, CallbackTarget, ExecutionContext, Host, HostError, HostValue,
    InvokeError, LocalHost, ModuleExports, ModuleRegistration, NativeModule, SinkHandles,
    SinkProvider,
};
