// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed stage output payloads.
//!
//! Stage outputs are a tagged sum type, not a loose JSON map: deserializers
//! dispatch on the `stage` tag and callers `match` on [`StageOutput`] rather
//! than probing fields by name.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareOutput {
    pub audio_uri: String,
    #[serde(default)]
    pub channel_uris: Vec<String>,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    #[serde(default)]
    pub original_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub words: Option<Vec<Word>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    None,
    Native,
    PostHoc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeOutput {
    pub segments: Vec<Segment>,
    pub full_text: String,
    pub detected_language: String,
    pub granularity_achieved: crate::job::TimestampGranularity,
    pub alignment_method: AlignmentMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignOutput {
    pub segments: Vec<Segment>,
    pub alignment_confidence: Option<f64>,
    pub unaligned_word_ratio: f64,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizeOutput {
    pub turns: Vec<SpeakerTurn>,
    pub speakers: Vec<String>,
    pub overlap_ratio: f64,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Name,
    Address,
    Phone,
    Email,
    Financial,
    Medical,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub category: PiiCategory,
    pub char_start: usize,
    pub char_end: usize,
    pub audio_start: f64,
    pub audio_end: f64,
    #[serde(default)]
    pub speaker: Option<String>,
    pub redacted_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiDetectOutput {
    pub entities: Vec<PiiEntity>,
    pub redacted_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    Silence,
    Beep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionSpan {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRedactOutput {
    pub redacted_audio_uri: String,
    pub mode: RedactionMode,
    pub redaction_map: Vec<RedactionSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub words: Option<Vec<Word>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeOutput {
    pub transcript: String,
    #[serde(default)]
    pub speakers: Vec<String>,
    pub segments: Vec<MergedSegment>,
    #[serde(default)]
    pub word_timestamps: bool,
    #[serde(default)]
    pub pipeline_warnings: Vec<String>,
}

/// Sum type over every stage's typed output, dispatching on the `stage` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Prepare(PrepareOutput),
    Transcribe(TranscribeOutput),
    Align(AlignOutput),
    Diarize(DiarizeOutput),
    PiiDetect(PiiDetectOutput),
    AudioRedact(AudioRedactOutput),
    Merge(MergeOutput),
}

impl StageOutput {
    pub fn stage(&self) -> crate::stage::Stage {
        use crate::stage::Stage;
        match self {
            StageOutput::Prepare(_) => Stage::Prepare,
            StageOutput::Transcribe(_) => Stage::Transcribe,
            StageOutput::Align(_) => Stage::Align,
            StageOutput::Diarize(_) => Stage::Diarize,
            StageOutput::PiiDetect(_) => Stage::PiiDetect,
            StageOutput::AudioRedact(_) => Stage::AudioRedact,
            StageOutput::Merge(_) => Stage::Merge,
        }
    }
}
