// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed implementations of the store traits.
//!
//! Metadata lives in hashes (`dalston:job:{id}`, `dalston:task:{id}`), the
//! durable event log and per-engine dispatch queues are Redis Streams read
//! through a single consumer group each. A crashed reader's pending entries
//! are recovered via `claim_stale`, called periodically by the sweeper.

use crate::error::StoreError;
use crate::traits::{EventLog, MetadataStore, ObjectStore, TaskQueue};
use async_trait::async_trait;
use dalston_core::{
    DurableEvent, EngineId, EngineInstance, InstanceId, Job, JobId, RealtimeWorkerRecord, Task, TaskDispatch, TaskId,
};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

pub const EVENTS_STREAM_KEY: &str = "dalston:events";
pub const EVENTS_GROUP: &str = "orchestrator";
const FIELD_PAYLOAD: &str = "payload";

fn queue_key(engine_id: &EngineId) -> String {
    format!("dalston:queue:{engine_id}")
}

fn job_key(id: &JobId) -> String {
    format!("dalston:job:{id}")
}

fn task_key(id: &TaskId) -> String {
    format!("dalston:task:{id}")
}

fn instance_registry_key(engine_id: &EngineId) -> String {
    format!("dalston:batch:engines:{engine_id}")
}

const REALTIME_WORKERS_KEY: &str = "dalston:realtime:workers";

/// Keyed by attempt, not just task id: a retried dispatch for the same task
/// carries an incremented `attempt`, matching the `retry:{task_id}:{attempt}`
/// idempotency key spec.md describes for reconciler-initiated retries.
fn dedup_key(engine_id: &EngineId, task_id: &TaskId, attempt: u32) -> String {
    format!("dalston:queue:dedup:{engine_id}:{task_id}:{attempt}")
}

/// Ensure a consumer group exists on a stream, tolerating `BUSYGROUP` when it
/// already does (and the stream itself, via `MKSTREAM`).
async fn ensure_group(conn: &mut ConnectionManager, stream: &str, group: &str) -> Result<(), StoreError> {
    let res: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
    match res {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[derive(Clone)]
pub struct RedisMetadataStore {
    conn: ConnectionManager,
}

impl RedisMetadataStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MetadataStore for RedisMetadataStore {
    async fn put_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(job)?;
        conn.set(job_key(&job.id), payload).await?;
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(job_key(id)).await?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn get_all_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("dalston:job:*").await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(raw) = raw {
                jobs.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(jobs)
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(job_key(id)).await?;
        Ok(())
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(task)?;
        conn.hset("dalston:job_tasks", task.job_id.as_str(), task.id.as_str())
            .await?;
        conn.set(task_key(&task.id), payload).await?;
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(task_key(id)).await?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(task_key(id)).await?;
        Ok(())
    }

    async fn get_tasks_for_job(&self, job_id: &JobId) -> Result<Vec<Task>, StoreError> {
        let mut conn = self.conn.clone();
        let job = self.get_job(job_id).await?;
        let mut tasks = Vec::new();
        if let Some(job) = job {
            for task_id in &job.task_ids {
                let raw: Option<String> = conn.get(task_key(task_id)).await?;
                if let Some(raw) = raw {
                    tasks.push(serde_json::from_str(&raw)?);
                }
            }
        }
        Ok(tasks)
    }

    async fn put_engine_instance(&self, instance: &EngineInstance) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(instance)?;
        conn.hset(
            instance_registry_key(&instance.engine_id),
            instance.instance_id.as_str(),
            payload,
        )
        .await?;
        Ok(())
    }

    async fn get_engine_instances(&self, engine_id: &EngineId) -> Result<Vec<EngineInstance>, StoreError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, String)> = conn.hgetall(instance_registry_key(engine_id)).await?;
        entries
            .into_iter()
            .map(|(_, payload)| serde_json::from_str(&payload).map_err(StoreError::from))
            .collect()
    }

    async fn get_all_engine_instances(&self) -> Result<Vec<EngineInstance>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("dalston:batch:engines:*").await?;
        let mut all = Vec::new();
        for key in keys {
            let entries: Vec<(String, String)> = conn.hgetall(&key).await?;
            for (_, payload) in entries {
                all.push(serde_json::from_str(&payload)?);
            }
        }
        Ok(all)
    }

    async fn remove_engine_instance(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("dalston:batch:engines:*").await?;
        for key in keys {
            let _: i64 = conn.hdel(&key, instance_id.as_str()).await?;
        }
        Ok(())
    }

    async fn put_realtime_worker(&self, record: &RealtimeWorkerRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        conn.hset(REALTIME_WORKERS_KEY, record.instance_id.as_str(), payload).await?;
        Ok(())
    }

    async fn get_realtime_workers(&self) -> Result<Vec<RealtimeWorkerRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, String)> = conn.hgetall(REALTIME_WORKERS_KEY).await?;
        entries
            .into_iter()
            .map(|(_, payload)| serde_json::from_str(&payload).map_err(StoreError::from))
            .collect()
    }

    async fn remove_realtime_worker(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.hdel(REALTIME_WORKERS_KEY, instance_id.as_str()).await?;
        Ok(())
    }
}

/// Filesystem-backed object store. The reference deployment's blobs (audio,
/// stage outputs) live under a root directory, one file per URI path.
pub struct FsObjectStore {
    root: std::path::PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, uri: &str) -> std::path::PathBuf {
        self.root.join(uri.trim_start_matches("file://"))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(uri);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn get(&self, uri: &str) -> Result<Vec<u8>, StoreError> {
        Ok(tokio::fs::read(self.path_for(uri)).await?)
    }

    async fn delete(&self, uri: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(uri)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn make_uri(&self, job_id: &JobId, task_id: &TaskId, name: &str) -> String {
        format!("file://jobs/{job_id}/tasks/{task_id}/{name}")
    }
}

#[derive(Clone)]
pub struct RedisEventLog {
    conn: ConnectionManager,
}

impl RedisEventLog {
    pub async fn new(mut conn: ConnectionManager) -> Result<Self, StoreError> {
        ensure_group(&mut conn, EVENTS_STREAM_KEY, EVENTS_GROUP).await?;
        Ok(Self { conn })
    }
}

fn decode_entries<T: serde::de::DeserializeOwned>(
    reply: StreamReadReply,
) -> Result<Vec<(String, T)>, StoreError> {
    let mut out = Vec::new();
    for key in reply.keys {
        for id in key.ids {
            let payload: String = id
                .map
                .get(FIELD_PAYLOAD)
                .and_then(|v| match v {
                    redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
                    redis::Value::SimpleString(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            let event: T = serde_json::from_str(&payload)?;
            out.push((id.id, event));
        }
    }
    Ok(out)
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn append(&self, event: &DurableEvent) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        let id: String = conn
            .xadd(EVENTS_STREAM_KEY, "*", &[(FIELD_PAYLOAD, payload)])
            .await?;
        Ok(id)
    }

    async fn read_new(
        &self,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, DurableEvent)>, StoreError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(EVENTS_GROUP, consumer)
            .count(count)
            .block(block_ms as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[EVENTS_STREAM_KEY], &[">"], &opts)
            .await?;
        decode_entries(reply)
    }

    async fn ack(&self, entry_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(EVENTS_STREAM_KEY, EVENTS_GROUP, &[entry_id]).await?;
        Ok(())
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<(String, DurableEvent)>, StoreError> {
        let mut conn = self.conn.clone();
        let (_cursor, entries): (String, Vec<redis::streams::StreamId>) = conn
            .xautoclaim(EVENTS_STREAM_KEY, EVENTS_GROUP, consumer, min_idle_ms, "0")
            .await
            .map(|reply: redis::streams::StreamAutoClaimReply| {
                (reply.cursor, reply.claimed)
            })?;
        let mut out = Vec::new();
        for id in entries.into_iter().take(count) {
            let payload: String = id
                .map
                .get(FIELD_PAYLOAD)
                .and_then(|v| match v {
                    redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
                    redis::Value::SimpleString(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            let event: DurableEvent = serde_json::from_str(&payload)?;
            out.push((id.id, event));
        }
        Ok(out)
    }
}

#[derive(Clone)]
pub struct RedisTaskQueue {
    conn: ConnectionManager,
}

impl RedisTaskQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn ensure_group_for(&self, engine_id: &EngineId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        ensure_group(&mut conn, &queue_key(engine_id), "workers").await
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, engine_id: &EngineId, dispatch: &TaskDispatch) -> Result<(), StoreError> {
        self.ensure_group_for(engine_id).await?;
        let mut conn = self.conn.clone();

        let key = dedup_key(engine_id, &dispatch.task_id, dispatch.attempt);
        let reserved: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(24 * 60 * 60)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !reserved {
            tracing::debug!(task_id = %dispatch.task_id, attempt = dispatch.attempt, "duplicate enqueue, leaving existing entry in place");
            return Ok(());
        }

        let payload = serde_json::to_string(dispatch)?;
        let _: String = conn
            .xadd(queue_key(engine_id), "*", &[(FIELD_PAYLOAD, payload)])
            .await?;
        Ok(())
    }

    async fn read_new(
        &self,
        engine_id: &EngineId,
        consumer: &InstanceId,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, TaskDispatch)>, StoreError> {
        self.ensure_group_for(engine_id).await?;
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group("workers", consumer.as_str())
            .count(count)
            .block(block_ms as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[queue_key(engine_id)], &[">"], &opts)
            .await?;
        decode_entries(reply)
    }

    async fn ack(&self, engine_id: &EngineId, entry_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(queue_key(engine_id), "workers", &[entry_id])
            .await?;
        Ok(())
    }

    async fn claim_stale(
        &self,
        engine_id: &EngineId,
        consumer: &InstanceId,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<(String, TaskDispatch)>, StoreError> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamAutoClaimReply = conn
            .xautoclaim(
                queue_key(engine_id),
                "workers",
                consumer.as_str(),
                min_idle_ms,
                "0",
            )
            .await?;
        let mut out = Vec::new();
        for id in reply.claimed.into_iter().take(count) {
            let payload: String = id
                .map
                .get(FIELD_PAYLOAD)
                .and_then(|v| match v {
                    redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
                    redis::Value::SimpleString(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            let dispatch: TaskDispatch = serde_json::from_str(&payload)?;
            out.push((id.id, dispatch));
        }
        Ok(out)
    }
}
