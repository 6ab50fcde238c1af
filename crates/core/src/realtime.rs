// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time streaming session wire protocol and configuration.
//!
//! These types are shared between the router and the realtime worker so both
//! sides of the WebSocket agree on message shapes without hand-parsing JSON.

use crate::id::SessionId;
use serde::{Deserialize, Serialize};

/// Client-supplied configuration for a streaming session, sent as the first
/// message after the socket upgrades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_language")]
    pub language: String,
    pub engine_id: Option<crate::id::EngineId>,
    #[serde(default)]
    pub word_timestamps: bool,
    #[serde(default)]
    pub vocabulary: Vec<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub encoding: AudioEncoding,
    #[serde(default = "default_interim_results")]
    pub interim_results: bool,
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_interim_results() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    #[default]
    PcmS16le,
    PcmF32le,
    Mulaw,
    Alaw,
}

/// Messages the router/worker sends to the client over the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionBegin {
        session_id: SessionId,
    },
    VadSpeechStart {
        offset_seconds: f64,
    },
    VadSpeechEnd {
        offset_seconds: f64,
    },
    TranscriptPartial {
        text: String,
        start: f64,
        end: f64,
    },
    TranscriptFinal {
        text: String,
        start: f64,
        end: f64,
        #[serde(default)]
        words: Option<Vec<crate::stage_output::Word>>,
    },
    SessionEnd {
        session_id: SessionId,
        total_duration: f64,
        total_speech_duration: f64,
        transcript: String,
        segments: Vec<TranscriptSegment>,
    },
    Error {
        code: ErrorCode,
        message: String,
        recoverable: bool,
    },
}

/// One finalized utterance as reported in `session.end`, distinct from
/// [`crate::stage_output::Segment`] which also carries per-word timing that
/// the end-of-session summary doesn't need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Closed set of machine-readable error codes a realtime session can report.
/// Kept closed (rather than a free-form string) so clients can switch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    InvalidMessage,
    NoCapacity,
    InvalidAudio,
    EngineUnavailable,
    SessionTimeout,
}

/// Control messages a client sends over the same socket as raw audio frames.
/// Binary frames on the socket are always raw audio and never take this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConfigUpdate {
        #[serde(default)]
        vocabulary: Option<Vec<String>>,
    },
    Flush,
    End,
}

/// Deployment strategy for the real-time router in front of engine instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    /// Router proxies raw frames through to a chosen engine's own socket.
    Proxy,
    /// Router terminates the client socket, runs VAD itself, and steers
    /// utterance-sized chunks to engines over their batch dispatch queues.
    Steer,
}

/// Live registration of one real-time worker process, distinct from the
/// batch [`crate::engine::EngineInstance`] registry: a real-time worker
/// serves many concurrent sessions rather than claiming one task at a time,
/// so its availability is a capacity count, not a single current-task slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeWorkerRecord {
    pub engine_id: crate::id::EngineId,
    pub instance_id: crate::id::InstanceId,
    /// Where the router should steer/proxy a chosen session to.
    pub endpoint: String,
    pub languages: crate::engine::LanguageSupport,
    pub max_sessions: u32,
    pub active_sessions: u32,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
}

/// Heartbeat considered stale past this age, mirroring the batch registry's
/// [`crate::engine::HEARTBEAT_TIMEOUT_SECONDS`].
pub const REALTIME_HEARTBEAT_TIMEOUT_SECONDS: i64 = 30;

impl RealtimeWorkerRecord {
    pub fn has_capacity(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let age = (now - self.last_heartbeat).num_seconds();
        age < REALTIME_HEARTBEAT_TIMEOUT_SECONDS && self.active_sessions < self.max_sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_defaults_to_auto_language_and_16k() {
        let json = serde_json::json!({});
        let cfg: SessionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.language, "auto");
        assert_eq!(cfg.sample_rate, 16_000);
        assert!(cfg.interim_results);
        assert_eq!(cfg.encoding, AudioEncoding::PcmS16le);
    }

    #[test]
    fn server_message_tag_round_trips() {
        let msg = ServerMessage::VadSpeechStart { offset_seconds: 1.5 };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "vad_speech_start");
        let parsed: ServerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, msg);
    }
}
