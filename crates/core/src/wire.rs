// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level DTOs exchanged over Redis Streams: durable events, per-engine
//! dispatch messages, and the blobs referenced by their URIs.

use crate::id::{EngineId, InstanceId, JobId, TaskId};
use crate::stage::Stage;
use crate::stage_output::StageOutput;
use serde::{Deserialize, Serialize};

/// A durable, ordered record appended to `dalston:events`. The orchestrator's
/// reconciler is the sole consumer; everything it learns about task progress
/// comes from this stream, never from Pub/Sub alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DurableEvent {
    TaskStarted {
        task_id: TaskId,
        job_id: JobId,
        engine_id: EngineId,
        instance_id: InstanceId,
        at: chrono::DateTime<chrono::Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        job_id: JobId,
        engine_id: EngineId,
        instance_id: InstanceId,
        output: StageOutput,
        at: chrono::DateTime<chrono::Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        job_id: JobId,
        engine_id: EngineId,
        instance_id: InstanceId,
        error: String,
        retryable: bool,
        at: chrono::DateTime<chrono::Utc>,
    },
    JobCancelled {
        job_id: JobId,
        at: chrono::DateTime<chrono::Utc>,
    },
}

impl DurableEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            DurableEvent::TaskStarted { job_id, .. }
            | DurableEvent::TaskCompleted { job_id, .. }
            | DurableEvent::TaskFailed { job_id, .. }
            | DurableEvent::JobCancelled { job_id, .. } => job_id,
        }
    }
}

/// Dispatch message placed on an engine's per-engine queue
/// (`dalston:queue:{engine_id}`). References blobs by URI rather than
/// embedding audio/large payloads inline in the stream entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDispatch {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub stage: Stage,
    pub channel: Option<u8>,
    pub input: TaskInputBlob,
    pub config: std::collections::HashMap<String, serde_json::Value>,
    pub timeout_seconds: u64,
    pub attempt: u32,
}

/// Pointer to a task's input payload(s) in object storage, plus whatever
/// upstream stage outputs this stage needs to see directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInputBlob {
    pub audio_uri: String,
    #[serde(default)]
    pub upstream_outputs: Vec<StageOutput>,
}

/// What an engine posts back on success, before it is wrapped into a
/// [`DurableEvent::TaskCompleted`] by the worker loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutputBlob {
    pub task_id: TaskId,
    pub output: StageOutput,
}

/// Heartbeat/registration payload an engine instance publishes to
/// `dalston:batch:engine:{instance_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRegistryRecord {
    pub engine_id: EngineId,
    pub instance_id: InstanceId,
    pub capabilities: crate::engine::EngineCapabilities,
    pub status: crate::engine::InstanceStatus,
    pub current_task: Option<TaskId>,
    pub at: chrono::DateTime<chrono::Utc>,
}
