// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic recovery pass: the safety net for dual-write inconsistency
//! between the durable event log and the object store. Grounded in the
//! teacher's `lifecycle::reconcile` shape — a reconciliation pass kept
//! separate from the main event loop rather than folded into it.

use chrono::{DateTime, Utc};
use dalston_core::{DurableEvent, EngineId, Task, TaskOutputBlob};
use dalston_store::{EventLog, MetadataStore, ObjectStore};

use crate::error::SchedulerError;

/// How long a terminal job's metadata is kept before being reaped.
pub const JOB_METADATA_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

pub struct Sweeper<'a> {
    pub metadata: &'a dyn MetadataStore,
    pub object_store: &'a dyn ObjectStore,
    pub event_log: &'a dyn EventLog,
    pub stale_task_threshold_seconds: i64,
}

impl<'a> Sweeper<'a> {
    /// Run one sweep: recover stranded tasks, then reap expired terminal jobs.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let jobs = self.metadata.get_all_jobs().await?;
        for job in &jobs {
            if job.status.is_terminal() {
                continue;
            }
            let tasks = self.metadata.get_tasks_for_job(&job.id).await?;
            for task in tasks {
                if task.wait_expired(now) {
                    self.fail_expired_wait(&task, now).await?;
                    continue;
                }
                // Pending/Ready tasks with nothing dispatched yet aren't
                // stranded, they're just waiting on dependencies.
                if !task.status.is_dispatched() {
                    continue;
                }
                let age = (now - task.updated_at).num_seconds();
                if age > self.stale_task_threshold_seconds {
                    self.recover_stranded_task(&task, now).await?;
                }
            }
        }

        for job in &jobs {
            if !job.status.is_terminal() {
                continue;
            }
            let age = (now - job.created_at).num_seconds();
            if age > JOB_METADATA_TTL_SECONDS {
                self.reap_job(job, now).await?;
            }
        }

        Ok(())
    }

    /// A task dispatched under the `wait` policy whose engine never showed up
    /// in time: fail it rather than leave it queued forever.
    async fn fail_expired_wait(&self, task: &Task, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        tracing::warn!(task_id = %task.id, engine_id = %task.engine_id, "wait-for-engine deadline expired, failing task");
        self.event_log
            .append(&DurableEvent::TaskFailed {
                task_id: task.id.clone(),
                job_id: task.job_id.clone(),
                engine_id: task.engine_id.clone(),
                instance_id: dalston_core::InstanceId::new("sweeper"),
                error: format!("no instance of engine '{}' registered before wait deadline", task.engine_id),
                retryable: true,
                at: now,
            })
            .await?;
        Ok(())
    }

    async fn recover_stranded_task(&self, task: &Task, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let output_uri = self
            .object_store
            .make_uri(&task.job_id, &task.id, "output.json");

        if let Ok(bytes) = self.object_store.get(&output_uri).await {
            if let Ok(blob) = serde_json::from_slice::<TaskOutputBlob>(&bytes) {
                tracing::warn!(task_id = %task.id, "sweeper found completed output for stranded task, synthesizing event");
                self.event_log
                    .append(&DurableEvent::TaskCompleted {
                        task_id: task.id.clone(),
                        job_id: task.job_id.clone(),
                        engine_id: task.engine_id.clone(),
                        instance_id: dalston_core::InstanceId::new("sweeper"),
                        output: blob.output,
                        at: now,
                    })
                    .await?;
                return Ok(());
            }
        }

        if self.has_active_claim(&task.engine_id, task).await? {
            return Ok(());
        }

        tracing::warn!(task_id = %task.id, "sweeper found no output and no active claim, failing task");
        self.event_log
            .append(&DurableEvent::TaskFailed {
                task_id: task.id.clone(),
                job_id: task.job_id.clone(),
                engine_id: task.engine_id.clone(),
                instance_id: dalston_core::InstanceId::new("sweeper"),
                error: "sweeper: stranded task, no output and no active worker claim".to_string(),
                retryable: true,
                at: now,
            })
            .await?;
        Ok(())
    }

    async fn has_active_claim(&self, engine_id: &EngineId, task: &Task) -> Result<bool, SchedulerError> {
        let instances = self.metadata.get_engine_instances(engine_id).await?;
        Ok(instances
            .iter()
            .any(|i| i.current_task.as_ref() == Some(&task.id) && i.is_available(chrono::Utc::now())))
    }

    async fn reap_job(&self, job: &dalston_core::Job, _now: DateTime<Utc>) -> Result<(), SchedulerError> {
        for task_id in &job.task_ids {
            self.metadata.delete_task(task_id).await?;
        }
        self.metadata.delete_job(&job.id).await?;
        tracing::info!(job_id = %job.id, "reaped expired terminal job metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalston_core::{
        EngineCapabilities, EngineInstance, InstanceId, InstanceStatus, Job, JobId, JobParameters, JobStatus,
        LanguageSupport, PerformanceHints, SpeakerDetection, Stage, StageOutput, TaskId, TaskStatus,
    };
    use dalston_core::stage_output::MergeOutput;
    use dalston_store::{FakeEventLog, FakeMetadataStore, FakeObjectStore};
    use std::collections::HashSet;

    fn params() -> JobParameters {
        JobParameters {
            language: "auto".into(),
            speaker_detection: SpeakerDetection::None,
            word_timestamps: false,
            timestamp_granularity: None,
            vocabulary: vec![],
            pii_detect: false,
            audio_redact: false,
            webhook_url: None,
            engine_preference: Default::default(),
        }
    }

    fn stranded_task(updated_at: DateTime<Utc>) -> Task {
        Task {
            id: TaskId::new("t1"),
            job_id: JobId::new("job1"),
            stage: Stage::Merge,
            channel: None,
            engine_id: EngineId::new("merger"),
            status: TaskStatus::Running,
            input_uri: None,
            output_uri: None,
            depends_on: HashSet::new(),
            config: Default::default(),
            retry_count: 0,
            max_retries: 2,
            timeout_seconds: 60,
            waiting_since: None,
            wait_deadline: None,
            created_at: updated_at,
            updated_at,
        }
    }

    #[tokio::test]
    async fn recovers_stranded_task_with_a_completed_output_on_disk() {
        let metadata = FakeMetadataStore::default();
        let object_store = FakeObjectStore::default();
        let event_log = FakeEventLog::default();
        let now = chrono::Utc::now();
        let old = now - chrono::Duration::seconds(600);

        let mut job = Job::new(JobId::new("job1"), "mem://job1/raw.wav", params(), old);
        job.status = JobStatus::Running;
        let task = stranded_task(old);
        job.task_ids.push(task.id.clone());
        metadata.put_job(&job).await.unwrap();
        metadata.put_task(&task).await.unwrap();

        let output_uri = object_store.make_uri(&task.job_id, &task.id, "output.json");
        let blob = TaskOutputBlob {
            task_id: task.id.clone(),
            output: StageOutput::Merge(MergeOutput::default()),
        };
        object_store.put(&output_uri, &serde_json::to_vec(&blob).unwrap()).await.unwrap();

        let sweeper = Sweeper {
            metadata: &metadata,
            object_store: &object_store,
            event_log: &event_log,
            stale_task_threshold_seconds: 300,
        };
        sweeper.run(now).await.unwrap();

        let events = event_log.read_new("test", 10, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, DurableEvent::TaskCompleted { .. }));
    }

    #[tokio::test]
    async fn fails_stranded_task_with_no_output_and_no_claim() {
        let metadata = FakeMetadataStore::default();
        let object_store = FakeObjectStore::default();
        let event_log = FakeEventLog::default();
        let now = chrono::Utc::now();
        let old = now - chrono::Duration::seconds(600);

        let mut job = Job::new(JobId::new("job1"), "mem://job1/raw.wav", params(), old);
        job.status = JobStatus::Running;
        let task = stranded_task(old);
        job.task_ids.push(task.id.clone());
        metadata.put_job(&job).await.unwrap();
        metadata.put_task(&task).await.unwrap();

        let sweeper = Sweeper {
            metadata: &metadata,
            object_store: &object_store,
            event_log: &event_log,
            stale_task_threshold_seconds: 300,
        };
        sweeper.run(now).await.unwrap();

        let events = event_log.read_new("test", 10, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, DurableEvent::TaskFailed { .. }));
    }

    #[tokio::test]
    async fn skips_task_with_an_active_heartbeat_claim() {
        let metadata = FakeMetadataStore::default();
        let object_store = FakeObjectStore::default();
        let event_log = FakeEventLog::default();
        let now = chrono::Utc::now();
        let old = now - chrono::Duration::seconds(600);

        let mut job = Job::new(JobId::new("job1"), "mem://job1/raw.wav", params(), old);
        job.status = JobStatus::Running;
        let task = stranded_task(old);
        job.task_ids.push(task.id.clone());
        metadata.put_job(&job).await.unwrap();
        metadata.put_task(&task).await.unwrap();

        metadata
            .put_engine_instance(&EngineInstance {
                engine_id: task.engine_id.clone(),
                instance_id: InstanceId::new("merger-i1"),
                stage: Stage::Merge,
                stream_name: "dalston:queue:merger".into(),
                status: InstanceStatus::Processing,
                current_task: Some(task.id.clone()),
                last_heartbeat: now,
                registered_at: old,
                capabilities: EngineCapabilities {
                    engine_id: task.engine_id.clone(),
                    version: "1".into(),
                    stages: vec![Stage::Merge],
                    languages: LanguageSupport::Any,
                    supports_word_timestamps: false,
                    supports_streaming: false,
                    includes_diarization: false,
                    supports_vocabulary: false,
                    model_variants: vec![],
                    requires_gpu: false,
                    vram_gb: None,
                    performance: PerformanceHints { rtf_gpu: None, rtf_cpu: None },
                },
            })
            .await
            .unwrap();

        let sweeper = Sweeper {
            metadata: &metadata,
            object_store: &object_store,
            event_log: &event_log,
            stale_task_threshold_seconds: 300,
        };
        sweeper.run(now).await.unwrap();

        let events = event_log.read_new("test", 10, 0).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn fails_task_whose_wait_for_engine_deadline_has_passed() {
        let metadata = FakeMetadataStore::default();
        let object_store = FakeObjectStore::default();
        let event_log = FakeEventLog::default();
        let now = chrono::Utc::now();
        let old = now - chrono::Duration::seconds(600);

        let mut job = Job::new(JobId::new("job1"), "mem://job1/raw.wav", params(), old);
        job.status = JobStatus::Running;
        let mut task = stranded_task(old);
        task.status = TaskStatus::Queued;
        task.waiting_since = Some(old);
        task.wait_deadline = Some(old + chrono::Duration::seconds(120));
        job.task_ids.push(task.id.clone());
        metadata.put_job(&job).await.unwrap();
        metadata.put_task(&task).await.unwrap();

        let sweeper = Sweeper {
            metadata: &metadata,
            object_store: &object_store,
            event_log: &event_log,
            stale_task_threshold_seconds: 300,
        };
        sweeper.run(now).await.unwrap();

        let events = event_log.read_new("test", 10, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, DurableEvent::TaskFailed { .. }));
    }

    #[tokio::test]
    async fn reaps_expired_terminal_job_metadata() {
        let metadata = FakeMetadataStore::default();
        let object_store = FakeObjectStore::default();
        let event_log = FakeEventLog::default();
        let now = chrono::Utc::now();
        let long_ago = now - chrono::Duration::seconds(JOB_METADATA_TTL_SECONDS + 10);

        let mut job = Job::new(JobId::new("job1"), "mem://job1/raw.wav", params(), long_ago);
        job.status = JobStatus::Completed;
        metadata.put_job(&job).await.unwrap();

        let sweeper = Sweeper {
            metadata: &metadata,
            object_store: &object_store,
            event_log: &event_log,
            stale_task_threshold_seconds: 300,
        };
        sweeper.run(now).await.unwrap();

        assert!(metadata.get_job(&job.id).await.unwrap().is_none());
    }
}
