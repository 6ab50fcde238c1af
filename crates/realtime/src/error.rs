// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for audio decode, VAD, session handling, and worker selection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("unsupported or malformed audio frame: {0}")]
    InvalidAudio(String),
    #[error("malformed control message: {0}")]
    InvalidMessage(String),
    #[error("store error: {0}")]
    Store(#[from] dalston_store::StoreError),
    #[error("failed to (de)serialize message: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no real-time worker with capacity for language '{0}'")]
    NoCapacity(String),
    #[error(transparent)]
    Transcribe(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
