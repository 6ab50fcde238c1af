// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the orchestrator binary.

use crate::dispatch::{EngineUnavailableBehavior, EngineUnavailablePolicy};
use crate::error::ConfigError;

/// Fully resolved orchestrator configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub redis_url: String,
    pub catalog_path: String,
    pub object_store_dir: String,
    pub event_batch_size: usize,
    pub event_block_ms: u64,
    pub sweep_interval_seconds: u64,
    pub stale_task_threshold_seconds: i64,
    pub engine_unavailable_behavior: EngineUnavailableBehavior,
    pub engine_wait_timeout_seconds: i64,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis_url: required("DALSTON_REDIS_URL")?,
            catalog_path: env_or("DALSTON_CATALOG_PATH", "catalog.yaml"),
            object_store_dir: env_or("DALSTON_OBJECT_STORE_DIR", "./data/objects"),
            event_batch_size: parsed_or("DALSTON_EVENT_BATCH_SIZE", 32)?,
            event_block_ms: parsed_or("DALSTON_EVENT_BLOCK_MS", 5_000)?,
            sweep_interval_seconds: parsed_or("DALSTON_SWEEP_INTERVAL_SECONDS", 30)?,
            stale_task_threshold_seconds: parsed_or("DALSTON_STALE_TASK_THRESHOLD_SECONDS", 300)?,
            engine_unavailable_behavior: engine_unavailable_behavior("DALSTON_ENGINE_UNAVAILABLE_BEHAVIOR")?,
            engine_wait_timeout_seconds: parsed_or("DALSTON_ENGINE_WAIT_TIMEOUT_SECONDS", 120)?,
        })
    }

    pub fn engine_unavailable_policy(&self) -> EngineUnavailablePolicy {
        EngineUnavailablePolicy {
            behavior: self.engine_unavailable_behavior,
            wait_timeout_seconds: self.engine_wait_timeout_seconds,
        }
    }
}

fn engine_unavailable_behavior(name: &'static str) -> Result<EngineUnavailableBehavior, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(EngineUnavailableBehavior::Wait),
        Ok(value) => match value.as_str() {
            "fail_fast" => Ok(EngineUnavailableBehavior::FailFast),
            "wait" => Ok(EngineUnavailableBehavior::Wait),
            _ => Err(ConfigError::InvalidValue { name, value }),
        },
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn env_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}
