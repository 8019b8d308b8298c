// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Native `logger` module.
//!
//! Exports `log`, `info`, `warn` and `error`, each writing its first argument
//! to the host console through the bridge. The exports are safe to call from
//! any thread; the write itself always happens on the main thread.

use hostloop::host::{ModuleExports, ModuleRegistration, NativeModule};
use hostloop::{BridgeHandle, Console, ConsoleLevel, HostValue, InvokeError};

pub const MODULE_NAME: &str = "logger";

#[derive(Default)]
pub struct LoggerModule;

impl NativeModule for LoggerModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn init(&self, exports: &mut ModuleExports, bridge: &BridgeHandle) {
        let console = match Console::connect(bridge.clone()) {
            Ok(console) => console,
            Err(e) => {
                tracing::warn!("[{}] Console unavailable: {}", MODULE_NAME, e);
                return;
            }
        };

        for level in ConsoleLevel::ALL {
            let console = console.clone();
            exports.set(level.as_str(), move |args| write(&console, level, args));
        }
    }
}

inventory::submit! {
    ModuleRegistration::new::<LoggerModule>()
}

fn write(console: &Console, level: ConsoleLevel, args: &[HostValue]) -> Result<HostValue, InvokeError> {
    // Called with no arguments the export is a no-op.
    let Some(first) = args.first() else {
        return Ok(HostValue::Undefined);
    };

    console
        .emit(level, first.to_string())
        .map_err(|e| InvokeError::Unavailable(e.to_string()))?;
    Ok(HostValue::Undefined)
}
