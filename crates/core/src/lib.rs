// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Core data model shared across Dalston's orchestrator, workers, and
//! selector: job/task identifiers and state machines, engine capability
//! declarations, typed stage output payloads, and the durable-event/dispatch
//! wire types that cross Redis Streams.

pub mod engine;
pub mod error;
pub mod id;
pub mod job;
pub mod realtime;
pub mod stage;
pub mod stage_output;
pub mod task;
pub mod wire;

pub use engine::{CatalogEntry, EngineCapabilities, EngineInstance, InstanceStatus, LanguageSupport};
pub use error::CoreError;
pub use id::{EngineId, IdGen, InstanceId, JobId, SequentialIdGen, SessionId, ShortId, TaskId, UuidIdGen};
pub use job::{Job, JobParameters, JobStatus, SpeakerDetection, TimestampGranularity};
pub use realtime::{
    AudioEncoding, ClientMessage, ErrorCode, RealtimeWorkerRecord, RouterMode, ServerMessage, SessionConfig,
    TranscriptSegment,
};
pub use stage::Stage;
pub use stage_output::StageOutput;
pub use task::{Task, TaskStatus};
pub use wire::{DurableEvent, EngineRegistryRecord, TaskDispatch, TaskInputBlob, TaskOutputBlob};
