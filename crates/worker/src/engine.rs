// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The callback surface a real speech-processing engine implements. The
//! worker loop owns everything around this boundary (claiming, downloading,
//! uploading, publishing); the engine only ever sees a typed input and
//! returns a typed output or an error.

use async_trait::async_trait;
use dalston_core::{Stage, StageOutput, TaskId};
use std::collections::HashMap;

/// Everything an engine needs to process one task, already resolved from the
/// dispatch message's blob pointers.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub task_id: TaskId,
    pub stage: Stage,
    pub channel: Option<u8>,
    pub audio_uri: String,
    pub upstream_outputs: Vec<StageOutput>,
    pub config: HashMap<String, serde_json::Value>,
}

/// What an engine hands back on success. `artifacts` names additional blobs
/// the worker should persist alongside the typed `data` (e.g. a redacted
/// audio file), keyed by name to URI.
#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    pub data: Option<StageOutput>,
    pub artifacts: HashMap<String, String>,
}

/// Whether a [`WorkerError::Engine`](crate::error::WorkerError::Engine) should
/// be retried by the reconciler or failed outright. Engines that hit a
/// transient condition (OOM, model server hiccup) should report retryable;
/// malformed input should not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryable {
    Yes,
    No,
}

/// One speech-processing engine's business logic. Implementations are
/// expected to be expensive to construct (model load) and cheap, synchronous
/// from the framework's point of view, to invoke per task — the worker loop
/// blocks on `process` exactly as spec.md describes the batch runner doing.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Stable identifier this engine registers under, e.g. `faster-whisper`.
    fn engine_id(&self) -> &str;

    fn stages(&self) -> &[Stage];

    async fn process(&self, input: TaskInput) -> Result<TaskOutput, (anyhow::Error, Retryable)>;
}

/// A no-op engine used by tests and local smoke runs: echoes back a minimal
/// typed output per stage without touching any audio.
pub struct StubEngine {
    id: String,
    stages: Vec<Stage>,
}

impl StubEngine {
    pub fn new(id: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self { id: id.into(), stages }
    }
}

#[async_trait]
impl Engine for StubEngine {
    fn engine_id(&self) -> &str {
        &self.id
    }

    fn stages(&self) -> &[Stage] {
        &self.stages
    }

    async fn process(&self, input: TaskInput) -> Result<TaskOutput, (anyhow::Error, Retryable)> {
        use dalston_core::stage_output::*;

        let data = match input.stage {
            Stage::Prepare => StageOutput::Prepare(PrepareOutput {
                audio_uri: input.audio_uri.clone(),
                channel_uris: vec![],
                duration_seconds: 0.0,
                sample_rate: 16_000,
                channels: 1,
                original_metadata: serde_json::Value::Null,
            }),
            Stage::Transcribe => StageOutput::Transcribe(TranscribeOutput {
                segments: vec![],
                full_text: String::new(),
                detected_language: "en".to_string(),
                granularity_achieved: dalston_core::TimestampGranularity::Segment,
                alignment_method: AlignmentMethod::None,
            }),
            Stage::Align => StageOutput::Align(AlignOutput {
                segments: vec![],
                alignment_confidence: None,
                unaligned_word_ratio: 0.0,
                skipped: true,
                skip_reason: Some("stub engine".to_string()),
            }),
            Stage::Diarize => StageOutput::Diarize(DiarizeOutput {
                turns: vec![],
                speakers: vec![],
                overlap_ratio: 0.0,
                skipped: true,
                skip_reason: Some("stub engine".to_string()),
            }),
            Stage::PiiDetect => StageOutput::PiiDetect(PiiDetectOutput {
                entities: vec![],
                redacted_text: String::new(),
            }),
            Stage::AudioRedact => StageOutput::AudioRedact(AudioRedactOutput {
                redacted_audio_uri: input.audio_uri.clone(),
                mode: RedactionMode::Silence,
                redaction_map: vec![],
            }),
            Stage::Merge => StageOutput::Merge(MergeOutput::default()),
        };

        Ok(TaskOutput {
            data: Some(data),
            artifacts: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_engine_produces_typed_output_per_stage() {
        let engine = StubEngine::new("stub", vec![Stage::Transcribe]);
        let input = TaskInput {
            task_id: TaskId::new("t1"),
            stage: Stage::Transcribe,
            channel: None,
            audio_uri: "mem://job1/audio.wav".into(),
            upstream_outputs: vec![],
            config: HashMap::new(),
        };
        let out = engine.process(input).await.unwrap();
        assert!(matches!(out.data, Some(StageOutput::Transcribe(_))));
    }
}
