// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The streaming transcription seam. Distinct from
//! [`dalston_core` batch task processing][engine]: a real-time engine is
//! handed raw utterance samples directly and returns text, with no object
//! storage or durable event log in the loop — durability for real-time
//! sessions is the transcript delivered over the socket, not a replayable
//! record.
//!
//! [engine]: https://docs.rs/dalston-core

use async_trait::async_trait;
use dalston_core::stage_output::Word;

/// One utterance (or partial prefix of one, for interim results) ready to
/// transcribe.
pub struct TranscribeRequest<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
    pub language: &'a str,
    pub vocabulary: &'a [String],
    /// `false` for an interim/partial result requested mid-utterance.
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamingResult {
    pub text: String,
    pub words: Option<Vec<Word>>,
    pub detected_language: String,
}

#[async_trait]
pub trait StreamingEngine: Send + Sync {
    fn engine_id(&self) -> &str;
    async fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<StreamingResult, anyhow::Error>;
}

/// Produces empty transcripts; exercises the session/VAD plumbing without a
/// real model attached.
pub struct StubStreamingEngine {
    pub id: String,
}

#[async_trait]
impl StreamingEngine for StubStreamingEngine {
    fn engine_id(&self) -> &str {
        &self.id
    }

    async fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<StreamingResult, anyhow::Error> {
        Ok(StreamingResult {
            text: String::new(),
            words: if request.is_final { Some(Vec::new()) } else { None },
            detected_language: if request.language == "auto" {
                "en".to_string()
            } else {
                request.language.to_string()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_engine_resolves_auto_language() {
        let engine = StubStreamingEngine { id: "stub".to_string() };
        let result = engine
            .transcribe(TranscribeRequest {
                samples: &[0.0, 0.1],
                sample_rate: 16_000,
                language: "auto",
                vocabulary: &[],
                is_final: true,
            })
            .await
            .unwrap();
        assert_eq!(result.detected_language, "en");
        assert_eq!(result.words, Some(Vec::new()));
    }
}
