// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job submission: select the pipeline's engines, build the DAG's root
//! `prepare` task, and dispatch it. Everything downstream of `prepare` is
//! built later, once its output reports the real channel count (see
//! [`crate::reconciler`]).

use dalston_catalog::EngineCatalog;
use dalston_core::{IdGen, Job, JobStatus, SpeakerDetection, Stage};
use dalston_dag::{build_prepare_task, PipelineSelections};
use dalston_selector::{select_engine, should_add_alignment, should_add_diarization, EngineSelection, Requirements};
use dalston_store::{MetadataStore, ObjectStore, TaskQueue};

use crate::dispatch::{dispatch_task, EngineUnavailablePolicy};
use crate::error::SchedulerError;
use crate::registry::available_instances_for_stage;

fn engine_preference(job: &Job, stage: Stage) -> Option<dalston_core::EngineId> {
    job.parameters
        .engine_preference
        .get(stage.as_str())
        .map(dalston_core::EngineId::new)
}

async fn select_for_stage(
    metadata: &dyn MetadataStore,
    catalog: &EngineCatalog,
    job: &Job,
    stage: Stage,
    requirements: &Requirements,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<EngineSelection, SchedulerError> {
    let running = available_instances_for_stage(metadata, stage, now).await?;
    let preference = engine_preference(job, stage);
    Ok(select_engine(stage, requirements, &running, catalog, preference.as_ref())?)
}

/// Select the engine for every stage this job's pipeline needs, re-derived
/// fresh against current registry state (never cached), exactly as
/// `select_pipeline_engines` does in the original orchestrator.
pub async fn select_pipeline_engines(
    metadata: &dyn MetadataStore,
    catalog: &EngineCatalog,
    job: &Job,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<PipelineSelections, SchedulerError> {
    let language = job.parameters.requested_language();

    if let Some(lang) = language {
        if let Some(reason) = catalog.validate_language_support(Stage::Transcribe, lang) {
            return Err(SchedulerError::InvalidParameters(reason));
        }
    }

    let prepare = select_for_stage(metadata, catalog, job, Stage::Prepare, &Requirements::default(), now).await?;
    let transcribe_reqs = Requirements::language_only(language);
    let transcribe = select_for_stage(metadata, catalog, job, Stage::Transcribe, &transcribe_reqs, now).await?;

    let mut selections = PipelineSelections {
        prepare: Some(prepare),
        transcribe: Some(transcribe.clone()),
        ..Default::default()
    };

    if should_add_alignment(job.parameters.word_timestamps, &transcribe) {
        selections.align =
            Some(select_for_stage(metadata, catalog, job, Stage::Align, &transcribe_reqs, now).await?);
    }

    let wants_diarization = job.parameters.speaker_detection == SpeakerDetection::Diarize;
    if should_add_diarization(wants_diarization, &transcribe) {
        selections.diarize =
            Some(select_for_stage(metadata, catalog, job, Stage::Diarize, &Requirements::default(), now).await?);
    }

    if job.parameters.pii_detect {
        selections.pii_detect =
            Some(select_for_stage(metadata, catalog, job, Stage::PiiDetect, &transcribe_reqs, now).await?);

        if job.parameters.audio_redact {
            selections.audio_redact =
                Some(select_for_stage(metadata, catalog, job, Stage::AudioRedact, &Requirements::default(), now).await?);
        }
    }

    selections.merge = Some(select_for_stage(metadata, catalog, job, Stage::Merge, &Requirements::default(), now).await?);

    Ok(selections)
}

/// Accept a new job: select its engines, build and dispatch the `prepare`
/// task, and persist the job as `RUNNING`. Everything downstream is built by
/// the reconciler once `prepare` reports its channel count.
pub async fn submit_job(
    metadata: &dyn MetadataStore,
    object_store: &dyn ObjectStore,
    task_queue: &dyn TaskQueue,
    catalog: &EngineCatalog,
    mut job: Job,
    id_gen: &dyn IdGen,
    now: chrono::DateTime<chrono::Utc>,
    engine_unavailable_policy: &EngineUnavailablePolicy,
) -> Result<Job, SchedulerError> {
    let selections = select_pipeline_engines(metadata, catalog, &job, now).await?;
    let prepare_selection = selections
        .prepare
        .as_ref()
        .ok_or_else(|| SchedulerError::InvalidParameters("prepare stage has no selected engine".into()))?;

    let mut prepare_task = build_prepare_task(&job, prepare_selection, id_gen, now);
    job.task_ids.push(prepare_task.id.clone());
    job.status = JobStatus::Running;
    metadata.put_job(&job).await?;

    dispatch_task(
        metadata,
        object_store,
        task_queue,
        catalog,
        &mut prepare_task,
        vec![],
        job.audio_uri.clone(),
        now,
        engine_unavailable_policy,
    )
    .await?;

    tracing::info!(job_id = %job.id, task_id = %prepare_task.id, engine_id = %prepare_task.engine_id, "job submitted, prepare task dispatched");

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalston_core::{
        EngineCapabilities, EngineId, EngineInstance, InstanceId, InstanceStatus, JobId, JobParameters,
        LanguageSupport, PerformanceHints, SequentialIdGen, TaskStatus,
    };
    use dalston_store::{FakeMetadataStore, FakeObjectStore, FakeTaskQueue};

    fn params() -> JobParameters {
        JobParameters {
            language: "en".into(),
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

    fn instance(engine_id: &str, stage: Stage, languages: LanguageSupport) -> EngineInstance {
        let now = chrono::Utc::now();
        EngineInstance {
            engine_id: EngineId::new(engine_id),
            instance_id: InstanceId::new(format!("{engine_id}-i1")),
            stage,
            stream_name: format!("dalston:queue:{engine_id}"),
            status: InstanceStatus::Idle,
            current_task: None,
            last_heartbeat: now,
            registered_at: now,
            capabilities: EngineCapabilities {
                engine_id: EngineId::new(engine_id),
                version: "1".into(),
                stages: vec![stage],
                languages,
                supports_word_timestamps: false,
                supports_streaming: false,
                includes_diarization: false,
                supports_vocabulary: false,
                model_variants: vec![],
                requires_gpu: false,
                vram_gb: None,
                performance: PerformanceHints { rtf_gpu: Some(0.1), rtf_cpu: Some(0.5) },
            },
        }
    }

    async fn seed(metadata: &FakeMetadataStore) {
        for (id, stage, langs) in [
            ("ffmpeg-prepare", Stage::Prepare, LanguageSupport::Any),
            ("faster-whisper", Stage::Transcribe, LanguageSupport::Any),
            ("merger", Stage::Merge, LanguageSupport::Any),
        ] {
            metadata.put_engine_instance(&instance(id, stage, langs)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn submit_job_dispatches_prepare_task_and_marks_job_running() {
        let metadata = FakeMetadataStore::default();
        seed(&metadata).await;
        let object_store = FakeObjectStore::default();
        let task_queue = FakeTaskQueue::default();
        let catalog = EngineCatalog::parse("engines: {}").unwrap();
        let id_gen = SequentialIdGen::new("t");
        let now = chrono::Utc::now();

        let job = Job::new(JobId::new("job1"), "mem://job1/raw.wav", params(), now);
        let job = submit_job(&metadata, &object_store, &task_queue, &catalog, job, &id_gen, now, &EngineUnavailablePolicy::wait(60))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.task_ids.len(), 1);

        let prepare_id = &job.task_ids[0];
        let stored = metadata.get_task(prepare_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Queued);
        assert!(stored.input_uri.is_some());

        let engine = EngineId::new("ffmpeg-prepare");
        let consumer = InstanceId::new("worker-1");
        let entries = task_queue.read_new(&engine, &consumer, 10, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.task_id, *prepare_id);
    }

    #[tokio::test]
    async fn submit_job_fails_fast_when_catalog_has_no_engine_for_language() {
        let metadata = FakeMetadataStore::default();
        seed(&metadata).await;
        let object_store = FakeObjectStore::default();
        let task_queue = FakeTaskQueue::default();
        let catalog = EngineCatalog::parse(
            "engines:\n  faster-whisper:\n    stages: [transcribe]\n    languages: [en]\n",
        )
        .unwrap();
        let id_gen = SequentialIdGen::new("t");
        let now = chrono::Utc::now();

        let mut p = params();
        p.language = "hr".into();
        let job = Job::new(JobId::new("job2"), "mem://job2/raw.wav", p, now);
        let err = submit_job(&metadata, &object_store, &task_queue, &catalog, job, &id_gen, now, &EngineUnavailablePolicy::wait(60))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidParameters(_)));
    }
}
