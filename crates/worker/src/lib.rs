// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Per-process batch engine worker: registration, heartbeat, and the
//! claim/process/publish loop, independently testable against the store
//! fakes with a [`StubEngine`](engine::StubEngine).

pub mod engine;
pub mod env;
pub mod error;
pub mod heartbeat;
pub mod runner;

pub use engine::{Engine, Retryable, StubEngine, TaskInput, TaskOutput};
pub use env::EnvConfig;
pub use error::{ConfigError, WorkerError};
pub use heartbeat::{Heartbeat, InstanceState};
pub use runner::Runner;
