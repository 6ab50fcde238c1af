// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage seams. Production code depends on these traits, never directly on
//! Redis or the filesystem, so the orchestrator/worker/selector can be tested
//! against in-memory fakes.

use crate::error::StoreError;
use async_trait::async_trait;
use dalston_core::{EngineId, EngineInstance, InstanceId, Job, JobId, RealtimeWorkerRecord, Task, TaskId};

/// Job and task metadata. Backed by Redis hashes in production
/// (`dalston:job:{id}`, `dalston:task:{id}`), in-memory maps in tests.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put_job(&self, job: &Job) -> Result<(), StoreError>;
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;
    /// Every job currently tracked, for the sweeper's scan pass. Not used on
    /// any request hot path.
    async fn get_all_jobs(&self) -> Result<Vec<Job>, StoreError>;
    /// Remove a terminal job's metadata record once its TTL has expired.
    async fn delete_job(&self, id: &JobId) -> Result<(), StoreError>;
    async fn put_task(&self, task: &Task) -> Result<(), StoreError>;
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;
    async fn get_tasks_for_job(&self, job_id: &JobId) -> Result<Vec<Task>, StoreError>;
    /// Remove a task's metadata record, alongside its owning job's reap.
    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError>;
    async fn put_engine_instance(&self, instance: &EngineInstance) -> Result<(), StoreError>;
    async fn get_engine_instances(&self, engine_id: &EngineId) -> Result<Vec<EngineInstance>, StoreError>;
    async fn get_all_engine_instances(&self) -> Result<Vec<EngineInstance>, StoreError>;
    async fn remove_engine_instance(&self, instance_id: &InstanceId) -> Result<(), StoreError>;

    /// Upsert a real-time worker's registration/heartbeat, keyed by instance.
    async fn put_realtime_worker(&self, record: &RealtimeWorkerRecord) -> Result<(), StoreError>;
    /// Every registered real-time worker, for the router's selection pass.
    async fn get_realtime_workers(&self) -> Result<Vec<RealtimeWorkerRecord>, StoreError>;
    async fn remove_realtime_worker(&self, instance_id: &InstanceId) -> Result<(), StoreError>;
}

/// Content-addressable-ish blob storage for audio and stage output payloads
/// referenced by URI. Backed by the filesystem in the reference deployment,
/// any object store implementing this trait in production.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), StoreError>;
    async fn get(&self, uri: &str) -> Result<Vec<u8>, StoreError>;
    async fn delete(&self, uri: &str) -> Result<(), StoreError>;
    /// Mint a URI for one of a task's blobs, keyed `jobs/{job_id}/tasks/{task_id}/{name}`.
    fn make_uri(&self, job_id: &JobId, task_id: &TaskId, name: &str) -> String;
}

/// The durable, ordered, append-only record of everything that happened to
/// every task. Backed by a single Redis Stream (`dalston:events`) read
/// through one consumer group; this is the orchestrator's source of truth,
/// Pub/Sub notifications are best-effort and never authoritative.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event, returning its stream entry ID.
    async fn append(&self, event: &dalston_core::DurableEvent) -> Result<String, StoreError>;

    /// Read up to `count` new entries for `consumer`, blocking up to
    /// `block_ms` milliseconds if none are immediately available.
    async fn read_new(
        &self,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, dalston_core::DurableEvent)>, StoreError>;

    /// Acknowledge an entry as processed, removing it from the pending list.
    async fn ack(&self, entry_id: &str) -> Result<(), StoreError>;

    /// Reclaim entries idle longer than `min_idle_ms`, for recovery after a
    /// consumer crash.
    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<(String, dalston_core::DurableEvent)>, StoreError>;
}

/// Per-engine durable dispatch queue, backed by a Redis Stream keyed
/// `dalston:queue:{engine_id}`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a dispatch for `engine_id`. A second enqueue under the same
    /// idempotency key (task id + attempt) is a no-op: it does not append a
    /// new stream entry, and returns `Ok(())` the same as a fresh enqueue.
    async fn enqueue(
        &self,
        engine_id: &EngineId,
        dispatch: &dalston_core::TaskDispatch,
    ) -> Result<(), StoreError>;

    async fn read_new(
        &self,
        engine_id: &EngineId,
        consumer: &InstanceId,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, dalston_core::TaskDispatch)>, StoreError>;

    async fn ack(&self, engine_id: &EngineId, entry_id: &str) -> Result<(), StoreError>;

    async fn claim_stale(
        &self,
        engine_id: &EngineId,
        consumer: &InstanceId,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<(String, dalston_core::TaskDispatch)>, StoreError>;
}
