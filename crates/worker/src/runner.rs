// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's main loop: claim a dispatch, run it through the engine, and
//! publish the outcome. Grounded in spec.md §4.12's per-process sequence and
//! in the teacher's `handle_worker_wake`/dispatch separation — claiming and
//! processing are distinct steps, each independently retryable.

use std::sync::Arc;

use chrono::Utc;
use dalston_core::{DurableEvent, EngineId, InstanceId, JobStatus, TaskDispatch, TaskOutputBlob};
use dalston_store::{EventLog, MetadataStore, ObjectStore, TaskQueue};

use crate::engine::{Engine, TaskInput};
use crate::error::WorkerError;
use crate::heartbeat::InstanceState;

pub struct Runner {
    pub metadata: Arc<dyn MetadataStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub task_queue: Arc<dyn TaskQueue>,
    pub event_log: Arc<dyn EventLog>,
    pub engine: Arc<dyn Engine>,
    pub engine_id: EngineId,
    pub instance_id: InstanceId,
    pub state: Arc<InstanceState>,
}

impl Runner {
    /// One iteration: try a stale-reclaim first (bounded at 1), falling back
    /// to a blocking read for new work. Returns `true` if a dispatch was
    /// handled (so the caller can loop tightly instead of re-blocking).
    pub async fn tick(&self, min_idle_ms: u64, block_ms: u64) -> Result<bool, WorkerError> {
        let mut claimed = self
            .task_queue
            .claim_stale(&self.engine_id, &self.instance_id, min_idle_ms, 1)
            .await?;

        let (entry_id, dispatch) = if let Some(entry) = claimed.pop() {
            entry
        } else {
            let mut fresh = self
                .task_queue
                .read_new(&self.engine_id, &self.instance_id, 1, block_ms)
                .await?;
            match fresh.pop() {
                Some(entry) => entry,
                None => return Ok(false),
            }
        };

        self.handle(&entry_id, dispatch).await?;
        Ok(true)
    }

    async fn handle(&self, entry_id: &str, dispatch: TaskDispatch) -> Result<(), WorkerError> {
        let job = self.metadata.get_job(&dispatch.job_id).await?;
        if matches!(job.as_ref().map(|j| j.status), Some(JobStatus::Cancelling) | Some(JobStatus::Cancelled)) {
            tracing::info!(task_id = %dispatch.task_id, job_id = %dispatch.job_id, "job cancelled, skipping claimed dispatch");
            self.task_queue.ack(&self.engine_id, entry_id).await?;
            return Ok(());
        }

        *self.state.current_task.lock() = Some(dispatch.task_id.clone());

        let now = Utc::now();
        self.event_log
            .append(&DurableEvent::TaskStarted {
                task_id: dispatch.task_id.clone(),
                job_id: dispatch.job_id.clone(),
                engine_id: self.engine_id.clone(),
                instance_id: self.instance_id.clone(),
                at: now,
            })
            .await?;

        let input = TaskInput {
            task_id: dispatch.task_id.clone(),
            stage: dispatch.stage,
            channel: dispatch.channel,
            audio_uri: dispatch.input.audio_uri.clone(),
            upstream_outputs: dispatch.input.upstream_outputs.clone(),
            config: dispatch.config.clone(),
        };

        let outcome = self.engine.process(input).await;
        *self.state.current_task.lock() = None;

        match outcome {
            Ok(crate::engine::TaskOutput { data: Some(data), artifacts }) => {
                for (name, uri) in &artifacts {
                    tracing::debug!(task_id = %dispatch.task_id, artifact = %name, uri = %uri, "engine produced artifact");
                }

                let output_uri = self.object_store.make_uri(&dispatch.job_id, &dispatch.task_id, "output.json");
                let blob = TaskOutputBlob {
                    task_id: dispatch.task_id.clone(),
                    output: data.clone(),
                };
                self.object_store.put(&output_uri, &serde_json::to_vec(&blob)?).await?;

                self.event_log
                    .append(&DurableEvent::TaskCompleted {
                        task_id: dispatch.task_id.clone(),
                        job_id: dispatch.job_id.clone(),
                        engine_id: self.engine_id.clone(),
                        instance_id: self.instance_id.clone(),
                        output: data,
                        at: Utc::now(),
                    })
                    .await?;

                tracing::info!(task_id = %dispatch.task_id, stage = %dispatch.stage, "task completed");
            }
            Ok(crate::engine::TaskOutput { data: None, .. }) => {
                tracing::warn!(task_id = %dispatch.task_id, "engine returned no output data");
                self.fail(&dispatch, "engine returned no output data".to_string(), false).await?;
            }
            Err((err, retryable)) => {
                tracing::warn!(task_id = %dispatch.task_id, error = %err, "engine failed task");
                self.fail(&dispatch, err.to_string(), retryable == crate::engine::Retryable::Yes)
                    .await?;
            }
        }

        // A dispatch is ACKed regardless of outcome: durability of the
        // outcome lives in the event log, not in stream redelivery.
        self.task_queue.ack(&self.engine_id, entry_id).await?;
        Ok(())
    }

    async fn fail(&self, dispatch: &TaskDispatch, error: String, retryable: bool) -> Result<(), WorkerError> {
        self.event_log
            .append(&DurableEvent::TaskFailed {
                task_id: dispatch.task_id.clone(),
                job_id: dispatch.job_id.clone(),
                engine_id: self.engine_id.clone(),
                instance_id: self.instance_id.clone(),
                error,
                retryable,
                at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;
    use crate::heartbeat::InstanceState;
    use dalston_core::{Job, JobId, JobParameters, Stage, TaskId, TaskInputBlob};
    use dalston_store::{FakeEventLog, FakeMetadataStore, FakeObjectStore, FakeTaskQueue};

    fn params() -> JobParameters {
        JobParameters {
            language: "auto".into(),
            speaker_detection: dalston_core::SpeakerDetection::None,
            word_timestamps: false,
            timestamp_granularity: None,
            vocabulary: vec![],
            pii_detect: false,
            audio_redact: false,
            webhook_url: None,
            engine_preference: Default::default(),
        }
    }

    fn dispatch() -> TaskDispatch {
        TaskDispatch {
            task_id: TaskId::new("t1"),
            job_id: JobId::new("job1"),
            stage: Stage::Transcribe,
            channel: None,
            input: TaskInputBlob {
                audio_uri: "mem://job1/audio.wav".into(),
                upstream_outputs: vec![],
            },
            config: Default::default(),
            timeout_seconds: 60,
            attempt: 1,
        }
    }

    fn runner(
        metadata: Arc<FakeMetadataStore>,
        object_store: Arc<FakeObjectStore>,
        task_queue: Arc<FakeTaskQueue>,
        event_log: Arc<FakeEventLog>,
    ) -> Runner {
        Runner {
            metadata,
            object_store,
            task_queue,
            event_log,
            engine: Arc::new(StubEngine::new("stub", vec![Stage::Transcribe])),
            engine_id: EngineId::new("stub"),
            instance_id: InstanceId::new("stub-i1"),
            state: Arc::new(InstanceState::default()),
        }
    }

    #[tokio::test]
    async fn processes_dispatch_and_publishes_completion() {
        let metadata = Arc::new(FakeMetadataStore::default());
        let object_store = Arc::new(FakeObjectStore::default());
        let task_queue = Arc::new(FakeTaskQueue::default());
        let event_log = Arc::new(FakeEventLog::default());

        let job = Job::new(JobId::new("job1"), "mem://job1/audio.wav", params(), Utc::now());
        metadata.put_job(&job).await.unwrap();
        task_queue.enqueue(&EngineId::new("stub"), &dispatch()).await.unwrap();

        let runner = runner(metadata, object_store, task_queue.clone(), event_log.clone());
        let handled = runner.tick(0, 0).await.unwrap();
        assert!(handled);

        let events = event_log.read_new("test", 10, 0).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].1, DurableEvent::TaskStarted { .. }));
        assert!(matches!(events[1].1, DurableEvent::TaskCompleted { .. }));
    }

    #[tokio::test]
    async fn skips_claimed_dispatch_for_cancelled_job() {
        let metadata = Arc::new(FakeMetadataStore::default());
        let object_store = Arc::new(FakeObjectStore::default());
        let task_queue = Arc::new(FakeTaskQueue::default());
        let event_log = Arc::new(FakeEventLog::default());

        let mut job = Job::new(JobId::new("job1"), "mem://job1/audio.wav", params(), Utc::now());
        job.status = JobStatus::Cancelled;
        metadata.put_job(&job).await.unwrap();
        task_queue.enqueue(&EngineId::new("stub"), &dispatch()).await.unwrap();

        let runner = runner(metadata, object_store, task_queue, event_log.clone());
        let handled = runner.tick(0, 0).await.unwrap();
        assert!(handled);

        let events = event_log.read_new("test", 10, 0).await.unwrap();
        assert!(events.is_empty());
    }
}
