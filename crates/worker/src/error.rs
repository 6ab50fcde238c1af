// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for the worker's claim/process/publish loop and its environment.

use dalston_core::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] dalston_store::StoreError),
    #[error("failed to (de)serialize payload: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("engine failed to process task {task_id}: {source}")]
    Engine {
        task_id: TaskId,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
