// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier and state machine.

use crate::id::{EngineId, JobId, TaskId};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Status of one stage's task within a job's DAG.
///
/// Invariant: a dispatch message exists on a queue iff the task is in
/// `{Queued, Running}`. A task may become `Ready` only when every task in
/// `depends_on` is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One stage's work for one job, as placed in the DAG by the builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub stage: Stage,
    /// Per-channel fan-out discriminator (e.g. `Some(0)` for `transcribe_ch0`).
    #[serde(default)]
    pub channel: Option<u8>,
    pub engine_id: EngineId,
    pub status: TaskStatus,
    pub input_uri: Option<String>,
    pub output_uri: Option<String>,
    pub depends_on: HashSet<TaskId>,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    /// Set when the scheduler parks this task instead of dispatching it
    /// because no instance of `engine_id` is currently registered, under
    /// the `wait` engine-unavailable policy.
    #[serde(default)]
    pub waiting_since: Option<chrono::DateTime<chrono::Utc>>,
    /// `waiting_since` plus the configured wait timeout; past this point the
    /// sweeper should fail the task rather than keep waiting.
    #[serde(default)]
    pub wait_deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Task {
    /// Stable name used in wire keys and logs, e.g. `transcribe_ch0`.
    pub fn qualified_stage_name(&self) -> String {
        match self.channel {
            Some(ch) => format!("{}_ch{}", self.stage.as_str(), ch),
            None => self.stage.as_str().to_string(),
        }
    }

    /// True once all dependency tasks have completed.
    pub fn dependencies_satisfied(&self, completed: &HashSet<TaskId>) -> bool {
        self.depends_on.iter().all(|dep| completed.contains(dep))
    }

    pub fn touch(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.updated_at = now;
    }

    /// Park this task pending an engine instance, under the `wait` policy.
    pub fn mark_waiting_for_engine(&mut self, now: chrono::DateTime<chrono::Utc>, timeout_seconds: i64) {
        self.waiting_since = Some(now);
        self.wait_deadline = Some(now + chrono::Duration::seconds(timeout_seconds));
    }

    pub fn clear_waiting_for_engine(&mut self) {
        self.waiting_since = None;
        self.wait_deadline = None;
    }

    pub fn wait_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.wait_deadline.is_some_and(|deadline| now >= deadline)
    }
}
