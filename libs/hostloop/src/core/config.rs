// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bridge configuration via `hostloop.yaml`.

use serde::Deserialize;
use std::path::Path;

use crate::core::{BridgeError, Result};

pub const ENV_WORKER_THREADS: &str = "HOSTLOOP_WORKER_THREADS";
pub const ENV_WORKER_THREAD_NAME: &str = "HOSTLOOP_WORKER_THREAD_NAME";
pub const ENV_DISPATCH_QUEUE_CAPACITY: &str = "HOSTLOOP_DISPATCH_QUEUE_CAPACITY";

/// Runtime settings for an [`EventLoop`](crate::core::EventLoop).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Number of background worker threads running `doWork`.
    pub worker_threads: usize,

    /// Prefix for worker thread names (`{prefix}-{index}`).
    pub worker_thread_name: String,

    /// Upper bound on off-main dispatches waiting for the main loop.
    /// `None` means unbounded.
    pub dispatch_queue_capacity: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            worker_thread_name: "hostloop-worker".to_string(),
            dispatch_queue_capacity: None,
        }
    }
}

impl BridgeConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "hostloop.yaml";

    /// Load configuration from a directory. Returns error if the file is
    /// missing, cannot be parsed, or fails validation.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            BridgeError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config = Self::from_yaml_str(&content).map_err(|e| match e {
            BridgeError::Configuration(msg) => {
                BridgeError::Configuration(format!("{}: {}", config_path.display(), msg))
            }
            other => other,
        })?;

        tracing::info!("Loaded bridge config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a directory, returning defaults if the file is
    /// missing or invalid.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default();
        }

        match Self::load(dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| BridgeError::Configuration(format!("Failed to parse: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOSTLOOP_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `HOSTLOOP_*` overrides from an arbitrary lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_WORKER_THREADS) {
            self.worker_threads = parse_count(ENV_WORKER_THREADS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WORKER_THREAD_NAME) {
            self.worker_thread_name = raw;
        }
        if let Some(raw) = lookup(ENV_DISPATCH_QUEUE_CAPACITY) {
            self.dispatch_queue_capacity = match raw.trim() {
                "" | "unbounded" => None,
                value => Some(parse_count(ENV_DISPATCH_QUEUE_CAPACITY, value)?),
            };
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(BridgeError::Configuration(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.worker_thread_name.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "worker_thread_name must not be empty".to_string(),
            ));
        }
        if self.dispatch_queue_capacity == Some(0) {
            return Err(BridgeError::Configuration(
                "dispatch_queue_capacity must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|e| {
        BridgeError::Configuration(format!("{} must be a non-negative integer, got '{}': {}", key, raw, e))
    })
}
