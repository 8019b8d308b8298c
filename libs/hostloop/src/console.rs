// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Thread-safe façade over the host's `console` object.
//!
//! Any thread may call [`Console::log`] and friends; each call is marshalled
//! to the main thread and invoked through the sink handles leased from the
//! host. Handles are leased on the main thread when connecting, released
//! exactly once (on reconnect or when the last clone of the console drops),
//! and a handle left over from a replaced host context is reported instead of
//! invoked blindly.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{BridgeHandle, Result};
use crate::host::{with_host, HostValue, InvokeError, SinkHandles};

/// Object name the console attaches to by default.
pub const CONSOLE_OBJECT: &str = "console";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    pub const ALL: [ConsoleLevel; 4] = [
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
    ];

    /// Method name on the host object.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink handles leased from the host. Released on the main thread when dropped.
pub struct SinkLease {
    handles: Option<SinkHandles>,
    bridge: BridgeHandle,
}

impl SinkLease {
    fn new(handles: SinkHandles, bridge: BridgeHandle) -> Self {
        Self {
            handles: Some(handles),
            bridge,
        }
    }

    pub fn handles(&self) -> Option<&SinkHandles> {
        self.handles.as_ref()
    }
}

impl Drop for SinkLease {
    fn drop(&mut self) {
        let Some(handles) = self.handles.take() else {
            return;
        };
        let object = handles.object().to_string();
        let released = self.bridge.run_on_main(move || {
            if with_host(|host| host.release_sink(&handles)).is_none() {
                tracing::debug!("[{}] No host to release sink lease", handles.object());
            }
        });
        if let Err(e) = released {
            tracing::debug!("[{}] Sink lease not released: {}", object, e);
        }
    }
}

impl fmt::Debug for SinkLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkLease")
            .field("handles", &self.handles)
            .finish()
    }
}

struct ConsoleInner {
    bridge: BridgeHandle,
    object: String,
    lease: Mutex<Option<SinkLease>>,
}

impl ConsoleInner {
    fn reconnect_on_main(&self) {
        let mut slot = self.lease.lock();
        // Release the old lease before acquiring so it can never be reused.
        drop(slot.take());

        match with_host(|host| host.acquire_sink(&self.object)) {
            Some(Some(handles)) => {
                tracing::debug!(
                    "[{}] Console connected (epoch {})",
                    self.object,
                    handles.epoch()
                );
                *slot = Some(SinkLease::new(handles, self.bridge.clone()));
            }
            Some(None) => {
                tracing::warn!("[{}] Host has no such object, console disconnected", self.object)
            }
            None => tracing::warn!("[{}] No host on the main thread, console disconnected", self.object),
        }
    }

    fn emit_on_main(&self, level: ConsoleLevel, message: String) {
        // Lock is released before invoking; the host may log through us again.
        let target = {
            let slot = self.lease.lock();
            slot.as_ref()
                .and_then(SinkLease::handles)
                .and_then(|handles| handles.get(level.as_str()).cloned())
        };

        let Some(target) = target else {
            tracing::debug!("[{}] Not connected, {} message dropped", self.object, level);
            return;
        };

        match with_host(|host| host.invoke(&target, &[HostValue::String(message)], None)) {
            Some(Ok(_)) => {}
            Some(Err(InvokeError::Stale { target, current_epoch })) => tracing::warn!(
                "[{}] Handle {} is stale (host epoch {}), call reconnect()",
                self.object,
                target,
                current_epoch
            ),
            Some(Err(e)) => tracing::error!("[{}] {} failed: {}", self.object, level, e),
            None => tracing::warn!("[{}] No host on the main thread, {} message dropped", self.object, level),
        }
    }
}

/// Cloneable, `Send + Sync` logger routed to the host's console.
#[derive(Clone)]
pub struct Console {
    inner: Arc<ConsoleInner>,
}

impl Console {
    /// Attach to the host's `console` object.
    pub fn connect(bridge: BridgeHandle) -> Result<Self> {
        Self::connect_to(bridge, CONSOLE_OBJECT)
    }

    /// Attach to an arbitrary host object exposing `log`/`info`/`warn`/`error`.
    pub fn connect_to(bridge: BridgeHandle, object: &str) -> Result<Self> {
        let console = Self {
            inner: Arc::new(ConsoleInner {
                bridge,
                object: object.to_string(),
                lease: Mutex::new(None),
            }),
        };
        console.reconnect()?;
        Ok(console)
    }

    /// Release the current handles and lease fresh ones.
    ///
    /// Runs on the main thread (synchronously when called there). Calling it
    /// repeatedly leaves exactly one live lease.
    pub fn reconnect(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner.bridge.run_on_main(move || inner.reconnect_on_main())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lease.lock().is_some()
    }

    /// Handles of the current lease.
    pub fn handles(&self) -> Option<SinkHandles> {
        self.inner
            .lease
            .lock()
            .as_ref()
            .and_then(SinkLease::handles)
            .cloned()
    }

    pub fn log(&self, message: impl Into<String>) -> Result<()> {
        self.emit(ConsoleLevel::Log, message.into())
    }

    pub fn info(&self, message: impl Into<String>) -> Result<()> {
        self.emit(ConsoleLevel::Info, message.into())
    }

    pub fn warn(&self, message: impl Into<String>) -> Result<()> {
        self.emit(ConsoleLevel::Warn, message.into())
    }

    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.emit(ConsoleLevel::Error, message.into())
    }

    pub fn emit(&self, level: ConsoleLevel, message: String) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .bridge
            .run_on_main(move || inner.emit_on_main(level, message))
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("object", &self.inner.object)
            .field("connected", &self.is_connected())
            .finish()
    }
}
