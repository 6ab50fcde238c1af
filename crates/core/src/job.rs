// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, parameters, and state machine.

use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal and in-flight states of a job. A job reaches a terminal state
/// (`Completed`, `Failed`, `Cancelled`) exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Speaker-detection mode requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerDetection {
    None,
    Diarize,
    PerChannel,
}

/// Timestamp granularity requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampGranularity {
    Segment,
    Word,
}

/// Job parameters as supplied at submission. `language` of `"auto"` means
/// "no hard language requirement" throughout the selector and DAG builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub speaker_detection: SpeakerDetection,
    #[serde(default)]
    pub word_timestamps: bool,
    #[serde(default)]
    pub timestamp_granularity: Option<TimestampGranularity>,
    #[serde(default)]
    pub vocabulary: Vec<String>,
    #[serde(default)]
    pub pii_detect: bool,
    #[serde(default)]
    pub audio_redact: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Explicit engine preference per stage, keyed by stage name.
    #[serde(default)]
    pub engine_preference: std::collections::HashMap<String, String>,
}

fn default_language() -> String {
    "auto".to_string()
}

impl Default for SpeakerDetection {
    fn default() -> Self {
        SpeakerDetection::None
    }
}

impl JobParameters {
    /// Whether the request has a hard language requirement, or is "auto".
    pub fn requested_language(&self) -> Option<&str> {
        if self.language.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(&self.language)
        }
    }
}

/// A transcription job submission and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: JobStatus,
    /// URI of the submitted media, as uploaded by the (out-of-scope) API
    /// layer. This is the `prepare` task's sole input.
    pub audio_uri: String,
    pub parameters: JobParameters,
    /// Populated once the DAG builder has run for this job.
    #[serde(default)]
    pub task_ids: Vec<crate::id::TaskId>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: JobId,
        audio_uri: impl Into<String>,
        parameters: JobParameters,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id,
            created_at: now,
            status: JobStatus::Pending,
            audio_uri: audio_uri.into(),
            parameters,
            task_ids: Vec::new(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_language_has_no_hard_requirement() {
        let params = JobParameters {
            language: "auto".to_string(),
            ..minimal_params()
        };
        assert_eq!(params.requested_language(), None);
    }

    #[test]
    fn explicit_language_is_a_hard_requirement() {
        let params = JobParameters {
            language: "en".to_string(),
            ..minimal_params()
        };
        assert_eq!(params.requested_language(), Some("en"));
    }

    #[test]
    fn job_status_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Cancelling.is_terminal());
    }

    fn minimal_params() -> JobParameters {
        JobParameters {
            language: "auto".to_string(),
            speaker_detection: SpeakerDetection::None,
            word_timestamps: false,
            timestamp_granularity: None,
            vocabulary: Vec::new(),
            pii_detect: false,
            audio_redact: false,
            webhook_url: None,
            engine_preference: Default::default(),
        }
    }
}
