// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event loop: a single authoritative consumer over the durable event
//! log, driving task/job state transitions and dispatching newly-ready work.
//! Grounded in the shape of the teacher's `EventBus`/`EventReader`
//! (`send`/`recv`/`mark_processed`), adapted to read `DurableEvent`s off a
//! Redis Stream consumer group instead of a local WAL.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dalston_catalog::EngineCatalog;
use dalston_core::{
    DurableEvent, IdGen, Job, JobId, JobStatus, StageOutput, Task, TaskId, TaskOutputBlob, TaskStatus,
};
use dalston_dag::build_pipeline_tasks;
use dalston_store::{EventLog, MetadataStore, ObjectStore, TaskQueue};

use crate::dispatch::{dispatch_task, EngineUnavailablePolicy};
use crate::error::SchedulerError;
use crate::intake::select_pipeline_engines;

/// Consumer name this process registers under when reading the durable
/// event stream's consumer group.
pub const CONSUMER_NAME: &str = "reconciler";

pub struct Reconciler<'a> {
    pub metadata: &'a dyn MetadataStore,
    pub object_store: &'a dyn ObjectStore,
    pub task_queue: &'a dyn TaskQueue,
    pub event_log: &'a dyn EventLog,
    pub catalog: &'a EngineCatalog,
    pub id_gen: &'a dyn IdGen,
    pub engine_unavailable_policy: EngineUnavailablePolicy,
}

impl<'a> Reconciler<'a> {
    /// Read and process up to `count` new events, acknowledging each as it
    /// is handled. Processing is strictly sequential: one bad event does not
    /// block acknowledgement of the ones before it, but a failure on one
    /// event is logged and the entry is left un-acked for a future claim.
    pub async fn drain_new(&self, count: usize, block_ms: u64, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let entries = self.event_log.read_new(CONSUMER_NAME, count, block_ms).await?;
        let mut processed = 0;
        for (entry_id, event) in entries {
            match self.process_event(event, now).await {
                Ok(()) => {
                    self.event_log.ack(&entry_id).await?;
                    processed += 1;
                }
                Err(err) => {
                    tracing::error!(entry_id = %entry_id, error = %err, "failed to process event, leaving unacked");
                }
            }
        }
        Ok(processed)
    }

    pub async fn process_event(&self, event: DurableEvent, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        match event {
            DurableEvent::TaskStarted { task_id, .. } => self.on_task_started(task_id, now).await,
            DurableEvent::TaskCompleted { task_id, job_id, output, .. } => {
                self.on_task_completed(task_id, job_id, output, now).await
            }
            DurableEvent::TaskFailed { task_id, job_id, error, retryable, .. } => {
                self.on_task_failed(task_id, job_id, error, retryable, now).await
            }
            DurableEvent::JobCancelled { job_id, .. } => self.on_job_cancelled(job_id, now).await,
        }
    }

    async fn on_task_started(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut task = self.require_task(&task_id).await?;
        if task.status.is_terminal() {
            return Ok(());
        }
        task.status = TaskStatus::Running;
        task.touch(now);
        self.metadata.put_task(&task).await?;
        Ok(())
    }

    async fn on_task_completed(
        &self,
        task_id: TaskId,
        job_id: JobId,
        output: StageOutput,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let mut task = self.require_task(&task_id).await?;
        if task.status.is_terminal() {
            // Second delivery of the same completion: absorbed idempotently.
            return Ok(());
        }

        let output_uri = self.object_store.make_uri(&job_id, &task_id, "output.json");
        self.object_store
            .put(&output_uri, &serde_json::to_vec(&TaskOutputBlob { task_id: task_id.clone(), output: output.clone() })?)
            .await?;
        task.output_uri = Some(output_uri);
        task.status = TaskStatus::Completed;
        task.touch(now);
        self.metadata.put_task(&task).await?;

        if let StageOutput::Prepare(prepare_output) = &output {
            self.expand_pipeline(&job_id, &task.id, prepare_output, now).await?;
        }

        self.dispatch_ready_descendants(&job_id, now).await?;
        self.finalize_job_if_complete(&job_id, now).await?;
        Ok(())
    }

    async fn on_task_failed(
        &self,
        task_id: TaskId,
        job_id: JobId,
        error: String,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let mut task = self.require_task(&task_id).await?;
        if task.status.is_terminal() {
            return Ok(());
        }

        if retryable && task.retry_count < task.max_retries {
            task.retry_count += 1;
            task.touch(now);
            self.metadata.put_task(&task).await?;

            let job = self.require_job(&job_id).await?;
            if job.status == JobStatus::Cancelling || job.status == JobStatus::Cancelled {
                tracing::info!(task_id = %task.id, job_id = %job_id, "job cancelling, skipping retry dispatch");
                return Ok(());
            }
            let upstream = self.gather_upstream_outputs(&task).await?;
            let mut retrying = task.clone();
            dispatch_task(
                self.metadata,
                self.object_store,
                self.task_queue,
                self.catalog,
                &mut retrying,
                upstream,
                job.audio_uri.clone(),
                now,
                &self.engine_unavailable_policy,
            )
            .await?;
            tracing::warn!(task_id = %task.id, attempt = retrying.retry_count, %error, "task failed, retrying");
            return Ok(());
        }

        task.status = TaskStatus::Failed;
        task.touch(now);
        self.metadata.put_task(&task).await?;

        let mut job = self.require_job(&job_id).await?;
        if !job.status.is_terminal() {
            job.status = JobStatus::Failed;
            job.error = Some(error.clone());
            self.metadata.put_job(&job).await?;
        }
        tracing::error!(task_id = %task_id, job_id = %job_id, %error, "task failed permanently, job marked failed");
        Ok(())
    }

    async fn on_job_cancelled(&self, job_id: JobId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut job = self.require_job(&job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }
        job.status = JobStatus::Cancelled;
        let _ = now;
        self.metadata.put_job(&job).await?;
        tracing::info!(job_id = %job_id, "job cancelled");
        Ok(())
    }

    /// Build and dispatch everything downstream of `prepare`, now that its
    /// actual channel count and duration are known. The prepare task's
    /// output also supplies the `prepare`-stage output every downstream task
    /// needs (e.g. per-channel audio URIs).
    async fn expand_pipeline(
        &self,
        job_id: &JobId,
        prepare_task_id: &TaskId,
        prepare_output: &dalston_core::stage_output::PrepareOutput,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let mut job = self.require_job(job_id).await?;
        let selections = select_pipeline_engines(self.metadata, self.catalog, &job, now).await?;

        let new_tasks = build_pipeline_tasks(
            &job,
            prepare_task_id,
            &selections,
            prepare_output.channels,
            prepare_output.duration_seconds,
            self.id_gen,
            now,
        );

        for task in &new_tasks {
            job.task_ids.push(task.id.clone());
            self.metadata.put_task(task).await?;
        }
        self.metadata.put_job(&job).await?;
        Ok(())
    }

    /// Dispatch every non-terminal, not-yet-dispatched task in `job_id`
    /// whose full dependency set has completed.
    async fn dispatch_ready_descendants(&self, job_id: &JobId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let job = self.require_job(job_id).await?;
        if job.status == JobStatus::Cancelling || job.status == JobStatus::Cancelled {
            return Ok(());
        }

        let tasks = self.metadata.get_tasks_for_job(job_id).await?;
        let completed: HashSet<TaskId> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.clone())
            .collect();

        for task in tasks {
            if task.status != TaskStatus::Pending || !task.dependencies_satisfied(&completed) {
                continue;
            }
            let upstream = self.gather_upstream_outputs(&task).await?;
            let mut ready = task;
            dispatch_task(
                self.metadata,
                self.object_store,
                self.task_queue,
                self.catalog,
                &mut ready,
                upstream,
                job.audio_uri.clone(),
                now,
                &self.engine_unavailable_policy,
            )
            .await?;
        }
        Ok(())
    }

    /// Fetch the typed output of every dependency of `task`, in dependency
    /// order, for embedding in its `input.json`.
    async fn gather_upstream_outputs(&self, task: &Task) -> Result<Vec<StageOutput>, SchedulerError> {
        let mut outputs = Vec::with_capacity(task.depends_on.len());
        for dep_id in &task.depends_on {
            let dep = self.require_task(dep_id).await?;
            if let Some(uri) = &dep.output_uri {
                let bytes = self.object_store.get(uri).await?;
                let blob: TaskOutputBlob = serde_json::from_slice(&bytes)?;
                outputs.push(blob.output);
            }
        }
        Ok(outputs)
    }

    async fn finalize_job_if_complete(&self, job_id: &JobId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut job = self.require_job(job_id).await?;
        if job.status.is_terminal() || job.task_ids.is_empty() {
            return Ok(());
        }
        let tasks = self.metadata.get_tasks_for_job(job_id).await?;
        let all_known = tasks.len() >= job.task_ids.len();
        let all_completed = all_known && tasks.iter().all(|t| t.status == TaskStatus::Completed);
        if !all_completed {
            return Ok(());
        }

        job.status = JobStatus::Completed;
        self.metadata.put_job(&job).await?;
        if job.parameters.webhook_url.is_some() {
            // Webhook delivery is out of scope (spec.md Non-goals): log the
            // seam so an operator can see a job finished without the crate
            // making an outbound HTTP call itself.
            tracing::info!(job_id = %job_id, "job completed, webhook delivery enqueued (stub: out of scope)");
        }
        let _ = now;
        Ok(())
    }

    async fn require_task(&self, id: &TaskId) -> Result<Task, SchedulerError> {
        self.metadata
            .get_task(id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound(id.clone()))
    }

    async fn require_job(&self, id: &JobId) -> Result<Job, SchedulerError> {
        self.metadata
            .get_job(id)
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(id.clone()))
    }
}
