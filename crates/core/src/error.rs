// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error types for job/task lifecycle operations.

use crate::id::{EngineId, JobId, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("no engine registered for stage {stage} supporting language {language:?}")]
    NoCapableEngine { stage: String, language: Option<String> },

    #[error("engine {engine_id} does not support required capability: {capability}")]
    EngineCapabilityMismatch {
        engine_id: EngineId,
        capability: String,
    },

    #[error("invalid job parameters: {0}")]
    InvalidParameters(String),

    #[error("job {0} is already in a terminal state")]
    AlreadyTerminal(JobId),
}
