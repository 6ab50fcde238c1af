// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for job intake, scheduling, and reconciliation.

use dalston_core::{JobId, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] dalston_store::StoreError),
    #[error(transparent)]
    NoCapableEngine(#[from] dalston_selector::NoCapableEngine),
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("task {0} is not ready to dispatch (unsatisfied dependencies)")]
    TaskNotReady(TaskId),
    #[error("invalid job parameters: {0}")]
    InvalidParameters(String),
    #[error("failed to serialize task payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no instance of engine '{engine_id}' is registered and ENGINE_UNAVAILABLE_BEHAVIOR is fail_fast")]
    EngineUnavailable { engine_id: dalston_core::EngineId },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
