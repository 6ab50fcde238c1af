// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Real-time streaming transcription: audio decode, voice-activity
//! detection, per-session state, worker registry/selection, and the
//! WebSocket wire handling shared by the router and the streaming worker.

pub mod assembler;
pub mod audio;
pub mod batch_bridge;
pub mod engine;
pub mod env;
pub mod error;
pub mod router;
pub mod server;
pub mod session;
pub mod vad;

pub use assembler::TranscriptAssembler;
pub use batch_bridge::BatchBridgeEngine;
pub use engine::{StreamingEngine, StreamingResult, StubStreamingEngine, TranscribeRequest};
pub use env::{RouterEnvConfig, WorkerEnvConfig};
pub use error::{ConfigError, RealtimeError};
pub use router::Router;
pub use session::Session;
pub use vad::{EnergyVad, SpeechDetector, StateMachine, VadConfig};
