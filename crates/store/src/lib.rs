// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for Dalston: job/task metadata, blob storage, the durable
//! event log, and per-engine dispatch queues, each behind a trait so the
//! orchestrator and workers can run against in-memory fakes in tests.

mod error;
pub mod fake;
pub mod redis_store;
mod retry;
mod traits;

pub use error::StoreError;
pub use retry::with_backoff;
pub use traits::{EventLog, MetadataStore, ObjectStore, TaskQueue};

pub use fake::{FakeEventLog, FakeMetadataStore, FakeObjectStore, FakeTaskQueue};
pub use redis_store::{FsObjectStore, RedisEventLog, RedisMetadataStore, RedisTaskQueue};
