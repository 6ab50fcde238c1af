// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the worker binary.

use crate::error::ConfigError;
use dalston_core::Stage;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub redis_url: String,
    pub object_store_dir: String,
    pub engine_id: String,
    pub stage: Stage,
    pub poll_block_ms: u64,
    pub claim_min_idle_ms: u64,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let stage_str = required("DALSTON_WORKER_STAGE")?;
        let stage = stage_str
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name: "DALSTON_WORKER_STAGE", value: stage_str })?;

        Ok(Self {
            redis_url: required("DALSTON_REDIS_URL")?,
            object_store_dir: env_or("DALSTON_OBJECT_STORE_DIR", "./data/objects"),
            engine_id: required("DALSTON_ENGINE_ID")?,
            stage,
            poll_block_ms: parsed_or("DALSTON_WORKER_POLL_BLOCK_MS", 5_000)?,
            claim_min_idle_ms: parsed_or("DALSTON_WORKER_CLAIM_MIN_IDLE_MS", 60_000)?,
        })
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
