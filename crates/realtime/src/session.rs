// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection session state: chunks incoming audio to the VAD, buffers
//! the current utterance, and turns VAD/engine events into the
//! [`ServerMessage`] sequence the caller writes back to the socket.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dalston_core::{AudioEncoding, ClientMessage, ServerMessage, SessionConfig, SessionId};

use crate::assembler::TranscriptAssembler;
use crate::audio::decode_frame;
use crate::engine::{StreamingEngine, TranscribeRequest};
use crate::error::RealtimeError;
use crate::vad::{Action, StateMachine, VadConfig};

/// ~100ms at the session's configured sample rate, the unit the VAD reasons
/// about.
const CHUNK_MS: u64 = 100;

/// Emit an interim partial result at most this often while speech continues.
const INTERIM_INTERVAL_CHUNKS: u32 = 5;

pub struct Session {
    session_id: SessionId,
    config: SessionConfig,
    engine: Arc<dyn StreamingEngine>,
    vad: StateMachine,
    chunk_samples: usize,
    chunk_duration: Duration,
    pending: Vec<f32>,
    utterance: Vec<f32>,
    lookback: VecDeque<f32>,
    lookback_capacity: usize,
    chunks_since_interim: u32,
    started_at_offset: f64,
    samples_seen: u64,
    assembler: TranscriptAssembler,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        config: SessionConfig,
        vad_config: VadConfig,
        engine: Arc<dyn StreamingEngine>,
    ) -> Self {
        let chunk_samples = ((config.sample_rate as u64 * CHUNK_MS) / 1000).max(1) as usize;
        let lookback_capacity =
            ((config.sample_rate as f64 * vad_config.lookback.as_secs_f64()).round() as usize).max(1);
        Self {
            session_id,
            config,
            engine,
            vad: StateMachine::new(vad_config),
            chunk_samples,
            chunk_duration: Duration::from_millis(CHUNK_MS),
            pending: Vec::new(),
            utterance: Vec::new(),
            lookback: VecDeque::with_capacity(lookback_capacity),
            lookback_capacity,
            chunks_since_interim: 0,
            started_at_offset: 0.0,
            samples_seen: 0,
            assembler: TranscriptAssembler::new(),
        }
    }

    pub fn begin_message(&self) -> ServerMessage {
        ServerMessage::SessionBegin {
            session_id: self.session_id.clone(),
        }
    }

    /// Decode one binary audio frame and advance the session, returning
    /// whatever server messages it produces (zero, one, or more).
    pub async fn on_audio_frame(&mut self, bytes: &[u8]) -> Result<Vec<ServerMessage>, RealtimeError> {
        let samples = decode_frame(self.encoding(), bytes)?;
        self.on_samples(&samples).await
    }

    pub async fn on_client_message(&mut self, message: ClientMessage) -> Result<Vec<ServerMessage>, RealtimeError> {
        match message {
            ClientMessage::ConfigUpdate { vocabulary } => {
                if let Some(vocabulary) = vocabulary {
                    self.config.vocabulary = vocabulary;
                }
                Ok(Vec::new())
            }
            ClientMessage::Flush => self.flush().await,
            ClientMessage::End => {
                let mut out = self.flush().await?;
                out.push(ServerMessage::SessionEnd {
                    session_id: self.session_id.clone(),
                    total_duration: self.offset_seconds(),
                    total_speech_duration: self.assembler.total_speech_duration(),
                    transcript: self.assembler.full_transcript(),
                    segments: self.assembler.segments(),
                });
                Ok(out)
            }
        }
    }

    fn encoding(&self) -> AudioEncoding {
        self.config.encoding
    }

    fn offset_seconds(&self) -> f64 {
        self.samples_seen as f64 / self.config.sample_rate as f64
    }

    async fn on_samples(&mut self, samples: &[f32]) -> Result<Vec<ServerMessage>, RealtimeError> {
        let mut out = Vec::new();
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= self.chunk_samples {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_samples).collect();
            self.samples_seen += chunk.len() as u64;

            if self.vad.state() == crate::vad::State::Silence {
                for &s in &chunk {
                    if self.lookback.len() == self.lookback_capacity {
                        self.lookback.pop_front();
                    }
                    self.lookback.push_back(s);
                }
            }

            let probability = self.probe(&chunk);
            let action = self.vad.on_chunk(probability, self.chunk_duration);

            match action {
                Action::None => {
                    if self.vad.state() == crate::vad::State::Speech {
                        self.utterance.extend_from_slice(&chunk);
                        self.chunks_since_interim += 1;
                        if self.config.interim_results && self.chunks_since_interim >= INTERIM_INTERVAL_CHUNKS {
                            self.chunks_since_interim = 0;
                            if let Some(msg) = self.interim_result().await? {
                                out.push(msg);
                            }
                        }
                    }
                }
                Action::SpeechStart => {
                    self.started_at_offset = self.offset_seconds() - self.chunk_duration.as_secs_f64();
                    self.utterance.clear();
                    self.utterance.extend(self.lookback.iter().copied());
                    self.utterance.extend_from_slice(&chunk);
                    self.chunks_since_interim = 0;
                    out.push(ServerMessage::VadSpeechStart {
                        offset_seconds: self.started_at_offset,
                    });
                }
                Action::SpeechEnd => {
                    out.push(ServerMessage::VadSpeechEnd {
                        offset_seconds: self.offset_seconds(),
                    });
                    if let Some(msg) = self.finalize().await? {
                        out.push(msg);
                    }
                }
                Action::Discard => {
                    out.push(ServerMessage::VadSpeechEnd {
                        offset_seconds: self.offset_seconds(),
                    });
                    self.utterance.clear();
                }
                Action::ForcedEndpoint => {
                    if let Some(msg) = self.finalize().await? {
                        out.push(msg);
                    }
                    self.started_at_offset = self.offset_seconds();
                }
            }
        }

        Ok(out)
    }

    async fn flush(&mut self) -> Result<Vec<ServerMessage>, RealtimeError> {
        if self.utterance.is_empty() {
            return Ok(Vec::new());
        }
        match self.finalize().await? {
            Some(msg) => Ok(vec![msg]),
            None => Ok(Vec::new()),
        }
    }

    async fn interim_result(&self) -> Result<Option<ServerMessage>, RealtimeError> {
        let result = self
            .engine
            .transcribe(TranscribeRequest {
                samples: &self.utterance,
                sample_rate: self.config.sample_rate,
                language: &self.config.language,
                vocabulary: &self.config.vocabulary,
                is_final: false,
            })
            .await?;
        if result.text.is_empty() {
            return Ok(None);
        }
        Ok(Some(ServerMessage::TranscriptPartial {
            text: result.text,
            start: self.started_at_offset,
            end: self.offset_seconds(),
        }))
    }

    async fn finalize(&mut self) -> Result<Option<ServerMessage>, RealtimeError> {
        if self.utterance.is_empty() {
            return Ok(None);
        }
        let end = self.offset_seconds();
        let result = self
            .engine
            .transcribe(TranscribeRequest {
                samples: &self.utterance,
                sample_rate: self.config.sample_rate,
                language: &self.config.language,
                vocabulary: &self.config.vocabulary,
                is_final: true,
            })
            .await?;
        self.utterance.clear();
        self.chunks_since_interim = 0;
        self.assembler.add_segment(self.started_at_offset, end, result.text.clone());
        Ok(Some(ServerMessage::TranscriptFinal {
            text: result.text,
            start: self.started_at_offset,
            end,
            words: if self.config.word_timestamps { result.words } else { None },
        }))
    }

    /// Speech probability for one chunk. `EnergyVad` is driven here rather
    /// than stored on the session, since its only state is the threshold.
    fn probe(&self, chunk: &[f32]) -> f32 {
        use crate::vad::{EnergyVad, SpeechDetector};
        let mut detector = EnergyVad::new(0.02);
        detector.speech_probability(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoEngine;

    #[async_trait]
    impl StreamingEngine for EchoEngine {
        fn engine_id(&self) -> &str {
            "echo"
        }

        async fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<crate::engine::StreamingResult, anyhow::Error> {
            Ok(crate::engine::StreamingResult {
                text: format!("{} samples", request.samples.len()),
                words: Some(Vec::new()),
                detected_language: "en".to_string(),
            })
        }
    }

    fn loud_chunk(n: usize) -> Vec<f32> {
        vec![0.9; n]
    }

    fn quiet_chunk(n: usize) -> Vec<f32> {
        vec![0.0; n]
    }

    fn session() -> Session {
        let config = SessionConfig {
            language: "en".to_string(),
            engine_id: None,
            word_timestamps: true,
            vocabulary: vec![],
            sample_rate: 16_000,
            encoding: AudioEncoding::PcmF32le,
            interim_results: false,
        };
        let vad_config = VadConfig {
            threshold: 0.5,
            min_speech_duration: Duration::from_millis(150),
            min_silence_duration: Duration::from_millis(200),
            max_utterance_duration: Duration::from_secs(10),
            lookback: Duration::from_millis(200),
        };
        Session::new(SessionId::new("sess-1"), config, vad_config, Arc::new(EchoEngine))
    }

    #[tokio::test]
    async fn speech_then_silence_emits_start_end_and_transcript() {
        let mut sess = session();
        let chunk = 1_600; // 100ms @ 16kHz

        let mut messages = Vec::new();
        messages.extend(sess.on_samples(&loud_chunk(chunk)).await.unwrap());
        messages.extend(sess.on_samples(&loud_chunk(chunk)).await.unwrap());
        messages.extend(sess.on_samples(&quiet_chunk(chunk)).await.unwrap());
        messages.extend(sess.on_samples(&quiet_chunk(chunk)).await.unwrap());
        messages.extend(sess.on_samples(&quiet_chunk(chunk)).await.unwrap());

        assert!(matches!(messages[0], ServerMessage::VadSpeechStart { .. }));
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::VadSpeechEnd { .. })));
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::TranscriptFinal { .. })));
    }

    #[tokio::test]
    async fn end_message_flushes_pending_utterance_and_closes_session() {
        let mut sess = session();
        let chunk = 1_600;
        sess.on_samples(&loud_chunk(chunk)).await.unwrap();
        sess.on_samples(&loud_chunk(chunk)).await.unwrap();

        let messages = sess.on_client_message(ClientMessage::End).await.unwrap();
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::TranscriptFinal { .. })));
        assert!(matches!(messages.last(), Some(ServerMessage::SessionEnd { .. })));
    }

    #[tokio::test]
    async fn session_end_transcript_equals_concatenation_of_final_texts() {
        let mut sess = session();
        let chunk = 1_600;
        let mut finals = Vec::new();

        // first utterance
        sess.on_samples(&loud_chunk(chunk)).await.unwrap();
        sess.on_samples(&loud_chunk(chunk)).await.unwrap();
        for m in sess.on_samples(&quiet_chunk(chunk)).await.unwrap() {
            if let ServerMessage::TranscriptFinal { text, .. } = m {
                finals.push(text);
            }
        }
        sess.on_samples(&quiet_chunk(chunk)).await.unwrap();
        sess.on_samples(&quiet_chunk(chunk)).await.unwrap();

        // second utterance
        sess.on_samples(&loud_chunk(chunk)).await.unwrap();
        sess.on_samples(&loud_chunk(chunk)).await.unwrap();

        let messages = sess.on_client_message(ClientMessage::End).await.unwrap();
        for m in &messages {
            if let ServerMessage::TranscriptFinal { text, .. } = m {
                finals.push(text.clone());
            }
        }

        let end = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::SessionEnd { transcript, segments, .. } => Some((transcript.clone(), segments.clone())),
                _ => None,
            })
            .unwrap();

        assert_eq!(end.1.len(), 2, "one segment per finalized utterance");
        assert_eq!(end.0, finals.join(" "));
    }
}
