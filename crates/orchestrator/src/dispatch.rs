// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch a single ready task: validate it against the catalog and the
//! live registry, write its input blob, persist its metadata, and push it
//! onto its engine's queue. Mirrors the original orchestrator's
//! `queue_task` step for step.

use chrono::{DateTime, Utc};
use dalston_catalog::EngineCatalog;
use dalston_core::{Stage, StageOutput, Task, TaskDispatch, TaskInputBlob, TaskStatus};
use dalston_store::{MetadataStore, ObjectStore, TaskQueue};

use crate::error::SchedulerError;

/// What to do with a task when its engine has no registered instance at
/// dispatch time, read from `ENGINE_UNAVAILABLE_BEHAVIOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineUnavailableBehavior {
    /// Reject the dispatch immediately rather than queue work no instance
    /// can currently claim.
    FailFast,
    /// Queue the task anyway and mark it as waiting for an engine; the
    /// sweeper fails it once `wait_timeout_seconds` elapses.
    Wait,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineUnavailablePolicy {
    pub behavior: EngineUnavailableBehavior,
    pub wait_timeout_seconds: i64,
}

impl EngineUnavailablePolicy {
    pub const fn fail_fast() -> Self {
        Self { behavior: EngineUnavailableBehavior::FailFast, wait_timeout_seconds: 0 }
    }

    pub const fn wait(wait_timeout_seconds: i64) -> Self {
        Self { behavior: EngineUnavailableBehavior::Wait, wait_timeout_seconds }
    }
}

/// Push `task` onto its engine's queue, after validating it can actually run.
///
/// `upstream_outputs` carries the stage outputs this task's dependencies
/// produced (empty for `prepare`, which has none). `audio_uri` is always the
/// job's originally submitted media, not an upstream URI: every stage that
/// needs prepared per-channel audio gets it via `upstream_outputs`'s
/// `PrepareOutput` entry instead.
pub async fn dispatch_task(
    metadata: &dyn MetadataStore,
    object_store: &dyn ObjectStore,
    task_queue: &dyn TaskQueue,
    catalog: &EngineCatalog,
    task: &mut Task,
    upstream_outputs: Vec<StageOutput>,
    audio_uri: String,
    now: DateTime<Utc>,
    policy: &EngineUnavailablePolicy,
) -> Result<(), SchedulerError> {
    if task.stage == Stage::Transcribe {
        if let Some(lang) = task.config.get("language").and_then(|v| v.as_str()) {
            if let Some(reason) = catalog.validate_language_support(Stage::Transcribe, lang) {
                return Err(SchedulerError::InvalidParameters(reason));
            }
        }
    }

    let running = metadata.get_engine_instances(&task.engine_id).await?;
    match running.iter().find(|i| i.is_available(now)) {
        None => match policy.behavior {
            EngineUnavailableBehavior::FailFast => {
                tracing::warn!(
                    task_id = %task.id,
                    engine_id = %task.engine_id,
                    "no available instance for engine at dispatch time, rejecting (fail_fast)"
                );
                return Err(SchedulerError::EngineUnavailable { engine_id: task.engine_id.clone() });
            }
            EngineUnavailableBehavior::Wait => {
                task.mark_waiting_for_engine(now, policy.wait_timeout_seconds);
                tracing::warn!(
                    task_id = %task.id,
                    engine_id = %task.engine_id,
                    wait_deadline = ?task.wait_deadline,
                    "no available instance for engine at dispatch time, enqueuing and waiting (engine-needed)"
                );
            }
        },
        Some(instance) => {
            task.clear_waiting_for_engine();
            if let Some(lang) = task.config.get("language").and_then(|v| v.as_str()) {
                if !instance.capabilities.languages.supports(lang) {
                    return Err(SchedulerError::InvalidParameters(format!(
                        "running instance of engine '{}' does not support language '{lang}'",
                        task.engine_id
                    )));
                }
            }
        }
    }

    let input_uri = object_store.make_uri(&task.job_id, &task.id, "input.json");
    let blob = TaskInputBlob { audio_uri, upstream_outputs };
    object_store.put(&input_uri, &serde_json::to_vec(&blob)?).await?;

    task.input_uri = Some(input_uri.clone());
    task.status = TaskStatus::Queued;
    task.touch(now);
    metadata.put_task(task).await?;

    let dispatch = TaskDispatch {
        task_id: task.id.clone(),
        job_id: task.job_id.clone(),
        stage: task.stage,
        channel: task.channel,
        input: blob,
        config: task.config.clone(),
        timeout_seconds: task.timeout_seconds,
        attempt: task.retry_count,
    };
    task_queue.enqueue(&task.engine_id, &dispatch).await?;

    tracing::info!(
        task_id = %task.id,
        job_id = %task.job_id,
        stage = %task.stage,
        engine_id = %task.engine_id,
        "task dispatched"
    );

    Ok(())
}
