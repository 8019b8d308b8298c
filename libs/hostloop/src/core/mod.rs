// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event_loop;
pub mod handle;
pub mod idle;
pub mod thread_identity;
pub mod work_queue;

pub use config::BridgeConfig;
pub use dispatcher::{MainThreadResult, PendingClosure};
pub use error::*;
pub use event_loop::{EventLoop, EventLoopBuilder};
pub use handle::BridgeHandle;
pub use thread_identity::{ThreadIdentity, ThreadToken};
pub use work_queue::{
    Baton, BatonState, CompletionPhase, WorkId, WorkPhase, PANIC_ERROR_CODE,
};
