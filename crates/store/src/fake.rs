// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fakes for the store traits, used by orchestrator/worker/selector
//! unit tests instead of a live Redis instance.

use crate::error::StoreError;
use crate::traits::{EventLog, MetadataStore, ObjectStore, TaskQueue};
use async_trait::async_trait;
use dalston_core::{
    DurableEvent, EngineId, EngineInstance, InstanceId, Job, JobId, RealtimeWorkerRecord, Task, TaskDispatch, TaskId,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MetadataInner {
    jobs: HashMap<JobId, Job>,
    tasks: HashMap<TaskId, Task>,
    instances: HashMap<EngineId, HashMap<InstanceId, EngineInstance>>,
    realtime_workers: HashMap<InstanceId, RealtimeWorkerRecord>,
}

/// In-memory [`MetadataStore`].
#[derive(Clone, Default)]
pub struct FakeMetadataStore {
    inner: Arc<Mutex<MetadataInner>>,
}

#[async_trait]
impl MetadataStore for FakeMetadataStore {
    async fn put_job(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.lock().jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    async fn get_all_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.inner.lock().jobs.values().cloned().collect())
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), StoreError> {
        self.inner.lock().jobs.remove(id);
        Ok(())
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.lock().tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.lock().tasks.get(id).cloned())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        self.inner.lock().tasks.remove(id);
        Ok(())
    }

    async fn get_tasks_for_job(&self, job_id: &JobId) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .tasks
            .values()
            .filter(|t| &t.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn put_engine_instance(&self, instance: &EngineInstance) -> Result<(), StoreError> {
        self.inner
            .lock()
            .instances
            .entry(instance.engine_id.clone())
            .or_default()
            .insert(instance.instance_id.clone(), instance.clone());
        Ok(())
    }

    async fn get_engine_instances(&self, engine_id: &EngineId) -> Result<Vec<EngineInstance>, StoreError> {
        Ok(self
            .inner
            .lock()
            .instances
            .get(engine_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_all_engine_instances(&self) -> Result<Vec<EngineInstance>, StoreError> {
        Ok(self
            .inner
            .lock()
            .instances
            .values()
            .flat_map(|m| m.values().cloned())
            .collect())
    }

    async fn remove_engine_instance(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        for by_instance in inner.instances.values_mut() {
            by_instance.remove(instance_id);
        }
        Ok(())
    }

    async fn put_realtime_worker(&self, record: &RealtimeWorkerRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .realtime_workers
            .insert(record.instance_id.clone(), record.clone());
        Ok(())
    }

    async fn get_realtime_workers(&self) -> Result<Vec<RealtimeWorkerRecord>, StoreError> {
        Ok(self.inner.lock().realtime_workers.values().cloned().collect())
    }

    async fn remove_realtime_worker(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        self.inner.lock().realtime_workers.remove(instance_id);
        Ok(())
    }
}

/// In-memory [`ObjectStore`].
#[derive(Clone, Default)]
pub struct FakeObjectStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.lock().insert(uri.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, uri: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .get(uri)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(uri.to_string()))
    }

    async fn delete(&self, uri: &str) -> Result<(), StoreError> {
        self.blobs.lock().remove(uri);
        Ok(())
    }

    fn make_uri(&self, job_id: &JobId, task_id: &TaskId, name: &str) -> String {
        format!("mem://jobs/{job_id}/tasks/{task_id}/{name}")
    }
}

struct FakeStreamEntry<T> {
    id: String,
    payload: T,
    pending: Option<String>,
}

struct FakeStreamInner<T> {
    entries: VecDeque<FakeStreamEntry<T>>,
    next_id: AtomicU64,
}

impl<T> Default for FakeStreamInner<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

/// A single fake Redis Stream plus one consumer group, shared by [`FakeEventLog`]
/// and [`FakeTaskQueue`].
struct FakeStream<T> {
    inner: Mutex<FakeStreamInner<T>>,
}

impl<T: Clone> FakeStream<T> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(FakeStreamInner::default()),
        }
    }

    fn append(&self, payload: T) -> String {
        let mut inner = self.inner.lock();
        let id = inner.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{id}-0");
        inner.entries.push_back(FakeStreamEntry {
            id: id.clone(),
            payload,
            pending: None,
        });
        id
    }

    fn read_new(&self, consumer: &str, count: usize) -> Vec<(String, T)> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        for entry in inner.entries.iter_mut() {
            if entry.pending.is_none() {
                entry.pending = Some(consumer.to_string());
                out.push((entry.id.clone(), entry.payload.clone()));
                if out.len() >= count {
                    break;
                }
            }
        }
        out
    }

    fn ack(&self, entry_id: &str) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|e| e.id != entry_id);
    }

    /// Fakes don't model idle time; treat every still-pending entry as stale.
    fn claim_stale(&self, consumer: &str, count: usize) -> Vec<(String, T)> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        for entry in inner.entries.iter_mut() {
            if entry.pending.is_some() {
                entry.pending = Some(consumer.to_string());
                out.push((entry.id.clone(), entry.payload.clone()));
                if out.len() >= count {
                    break;
                }
            }
        }
        out
    }
}

/// In-memory [`EventLog`].
#[derive(Clone)]
pub struct FakeEventLog {
    stream: Arc<FakeStream<DurableEvent>>,
}

impl Default for FakeEventLog {
    fn default() -> Self {
        Self {
            stream: Arc::new(FakeStream::new()),
        }
    }
}

#[async_trait]
impl EventLog for FakeEventLog {
    async fn append(&self, event: &DurableEvent) -> Result<String, StoreError> {
        Ok(self.stream.append(event.clone()))
    }

    async fn read_new(
        &self,
        consumer: &str,
        count: usize,
        _block_ms: u64,
    ) -> Result<Vec<(String, DurableEvent)>, StoreError> {
        Ok(self.stream.read_new(consumer, count))
    }

    async fn ack(&self, entry_id: &str) -> Result<(), StoreError> {
        self.stream.ack(entry_id);
        Ok(())
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        _min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<(String, DurableEvent)>, StoreError> {
        Ok(self.stream.claim_stale(consumer, count))
    }
}

/// In-memory [`TaskQueue`], one fake stream per engine id.
#[derive(Clone, Default)]
pub struct FakeTaskQueue {
    streams: Arc<Mutex<HashMap<EngineId, Arc<FakeStream<TaskDispatch>>>>>,
    dedup: Arc<Mutex<HashSet<(EngineId, TaskId, u32)>>>,
}

impl FakeTaskQueue {
    fn stream_for(&self, engine_id: &EngineId) -> Arc<FakeStream<TaskDispatch>> {
        self.streams
            .lock()
            .entry(engine_id.clone())
            .or_insert_with(|| Arc::new(FakeStream::new()))
            .clone()
    }
}

#[async_trait]
impl TaskQueue for FakeTaskQueue {
    async fn enqueue(&self, engine_id: &EngineId, dispatch: &TaskDispatch) -> Result<(), StoreError> {
        let key = (engine_id.clone(), dispatch.task_id.clone(), dispatch.attempt);
        if !self.dedup.lock().insert(key) {
            return Ok(());
        }
        self.stream_for(engine_id).append(dispatch.clone());
        Ok(())
    }

    async fn read_new(
        &self,
        engine_id: &EngineId,
        consumer: &InstanceId,
        count: usize,
        _block_ms: u64,
    ) -> Result<Vec<(String, TaskDispatch)>, StoreError> {
        Ok(self.stream_for(engine_id).read_new(consumer.as_str(), count))
    }

    async fn ack(&self, engine_id: &EngineId, entry_id: &str) -> Result<(), StoreError> {
        self.stream_for(engine_id).ack(entry_id);
        Ok(())
    }

    async fn claim_stale(
        &self,
        engine_id: &EngineId,
        consumer: &InstanceId,
        _min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<(String, TaskDispatch)>, StoreError> {
        Ok(self
            .stream_for(engine_id)
            .claim_stale(consumer.as_str(), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalston_core::TaskInputBlob;

    fn dispatch(task_id: &str) -> TaskDispatch {
        TaskDispatch {
            task_id: TaskId::new(task_id),
            job_id: JobId::new("job1"),
            stage: dalston_core::Stage::Transcribe,
            channel: None,
            input: TaskInputBlob {
                audio_uri: "mem://job1/audio".into(),
                upstream_outputs: vec![],
            },
            config: Default::default(),
            timeout_seconds: 60,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_a_no_op_not_an_error() {
        let q = FakeTaskQueue::default();
        let engine = EngineId::new("faster-whisper");
        q.enqueue(&engine, &dispatch("t1")).await.unwrap();
        q.enqueue(&engine, &dispatch("t1")).await.unwrap();

        let consumer = InstanceId::new("w1");
        let entries = q.read_new(&engine, &consumer, 10, 0).await.unwrap();
        assert_eq!(entries.len(), 1, "duplicate enqueue must not append a second entry");
    }

    #[tokio::test]
    async fn read_new_does_not_redeliver_until_claimed_stale() {
        let q = FakeTaskQueue::default();
        let engine = EngineId::new("faster-whisper");
        q.enqueue(&engine, &dispatch("t1")).await.unwrap();

        let consumer = InstanceId::new("inst-1");
        let first = q.read_new(&engine, &consumer, 10, 0).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = q.read_new(&engine, &consumer, 10, 0).await.unwrap();
        assert!(second.is_empty());

        let reclaimed = q.claim_stale(&engine, &consumer, 0, 10).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
    }

    #[tokio::test]
    async fn ack_removes_entry_from_stream() {
        let q = FakeTaskQueue::default();
        let engine = EngineId::new("faster-whisper");
        q.enqueue(&engine, &dispatch("t1")).await.unwrap();
        let consumer = InstanceId::new("inst-1");
        let entries = q.read_new(&engine, &consumer, 10, 0).await.unwrap();
        q.ack(&engine, &entries[0].0).await.unwrap();
        let reclaimed = q.claim_stale(&engine, &consumer, 0, 10).await.unwrap();
        assert!(reclaimed.is_empty());
    }
}
