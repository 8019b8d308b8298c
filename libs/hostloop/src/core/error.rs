// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::core::thread_identity::ThreadToken;
use crate::host::InvokeError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Main thread identity has not been resolved")]
    IdentityUnresolved,

    #[error("Operation requires the main thread {expected}, called from {actual}")]
    NotMainThread {
        expected: ThreadToken,
        actual: ThreadToken,
    },

    #[error("Main loop is closed, {0} dropped")]
    LoopClosed(&'static str),

    #[error("Dispatch queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Host invocation failed: {0}")]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
