// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure DAG construction: turn a job's parameters and its already-selected
//! engines into the ordered, dependency-annotated task list.
//!
//! Building happens in two passes because channel count isn't known until
//! the `prepare` stage has actually run:
//! 1. [`build_prepare_task`] — a single task, enqueued at job intake.
//! 2. [`build_pipeline_tasks`] — everything downstream, built once `prepare`
//!    completes and its output reports how many channels the audio has.
//!
//! Both functions are side-effect free: same inputs always produce the same
//! task list, so the graph shape is unit-testable without a running system.

use crate::timeout::calculate_task_timeout;
use dalston_core::{
    EngineId, IdGen, Job, JobId, JobParameters, SpeakerDetection, Stage, Task, TaskId, TaskStatus,
};
use dalston_selector::EngineSelection;
use std::collections::{HashMap, HashSet};

/// Default retries for every task; failures past this are terminal.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Engine chosen for each stage a job's pipeline will run. Stages the job
/// doesn't need are simply absent rather than `None`-valued, so the map's
/// keys alone describe which stages exist.
#[derive(Debug, Clone, Default)]
pub struct PipelineSelections {
    pub prepare: Option<EngineSelection>,
    pub transcribe: Option<EngineSelection>,
    pub align: Option<EngineSelection>,
    pub diarize: Option<EngineSelection>,
    pub pii_detect: Option<EngineSelection>,
    pub audio_redact: Option<EngineSelection>,
    pub merge: Option<EngineSelection>,
}

impl PipelineSelections {
    fn get(&self, stage: Stage) -> Option<&EngineSelection> {
        match stage {
            Stage::Prepare => self.prepare.as_ref(),
            Stage::Transcribe => self.transcribe.as_ref(),
            Stage::Align => self.align.as_ref(),
            Stage::Diarize => self.diarize.as_ref(),
            Stage::PiiDetect => self.pii_detect.as_ref(),
            Stage::AudioRedact => self.audio_redact.as_ref(),
            Stage::Merge => self.merge.as_ref(),
        }
    }
}

fn new_task(
    id_gen: &dyn IdGen,
    job_id: &JobId,
    stage: Stage,
    channel: Option<u8>,
    engine_id: EngineId,
    depends_on: HashSet<TaskId>,
    timeout_seconds: u64,
    now: chrono::DateTime<chrono::Utc>,
) -> Task {
    Task {
        id: TaskId::new(id_gen.next()),
        job_id: job_id.clone(),
        stage,
        channel,
        engine_id,
        status: TaskStatus::Pending,
        input_uri: None,
        output_uri: None,
        depends_on,
        config: HashMap::new(),
        retry_count: 0,
        max_retries: DEFAULT_MAX_RETRIES,
        timeout_seconds,
        waiting_since: None,
        wait_deadline: None,
        created_at: now,
        updated_at: now,
    }
}

/// Build the job's single `prepare` task. Always required, always
/// dependency-free: it is the DAG's root.
pub fn build_prepare_task(
    job: &Job,
    selection: &EngineSelection,
    id_gen: &dyn IdGen,
    now: chrono::DateTime<chrono::Utc>,
) -> Task {
    let timeout = calculate_task_timeout(None, None, None, true);
    new_task(
        id_gen,
        &job.id,
        Stage::Prepare,
        None,
        selection.engine_id.clone(),
        HashSet::new(),
        timeout,
        now,
    )
}

/// Build every task after `prepare`, given the engines already selected for
/// each stage and the channel count `prepare`'s output reported.
///
/// Per-channel speaker detection fans `transcribe` into one task per channel
/// (and `align`/`pii_detect` likewise, when present), with `merge` depending
/// on every branch. Any other mode produces one task per stage.
pub fn build_pipeline_tasks(
    job: &Job,
    prepare_task_id: &TaskId,
    selections: &PipelineSelections,
    channel_count: u16,
    audio_duration_s: f64,
    id_gen: &dyn IdGen,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<Task> {
    let per_channel = job.parameters.speaker_detection == SpeakerDetection::PerChannel
        && channel_count > 1;
    let channels: Vec<Option<u8>> = if per_channel {
        (0..channel_count as u8).map(Some).collect()
    } else {
        vec![None]
    };

    let mut tasks = Vec::new();
    let mut last_stage_ids: HashMap<Option<u8>, TaskId> = HashMap::new();

    if let Some(sel) = selections.get(Stage::Transcribe) {
        let timeout = calculate_task_timeout(
            Some(audio_duration_s),
            sel.capabilities.performance.rtf_gpu,
            sel.capabilities.performance.rtf_cpu,
            sel.capabilities.requires_gpu,
        );
        for &channel in &channels {
            let mut deps = HashSet::new();
            deps.insert(prepare_task_id.clone());
            let task = new_task(
                id_gen,
                &job.id,
                Stage::Transcribe,
                channel,
                sel.engine_id.clone(),
                deps,
                timeout,
                now,
            );
            last_stage_ids.insert(channel, task.id.clone());
            tasks.push(task);
        }
    }

    if let Some(sel) = selections.get(Stage::Align) {
        let timeout = calculate_task_timeout(
            Some(audio_duration_s),
            sel.capabilities.performance.rtf_gpu,
            sel.capabilities.performance.rtf_cpu,
            sel.capabilities.requires_gpu,
        );
        for &channel in &channels {
            let mut deps = HashSet::new();
            if let Some(prev) = last_stage_ids.get(&channel) {
                deps.insert(prev.clone());
            }
            let task = new_task(
                id_gen,
                &job.id,
                Stage::Align,
                channel,
                sel.engine_id.clone(),
                deps,
                timeout,
                now,
            );
            last_stage_ids.insert(channel, task.id.clone());
            tasks.push(task);
        }
    }

    // Diarize never fans out per channel: speaker turns are computed across
    // the whole conversation even when transcription was done per channel.
    let mut diarize_task_id = None;
    if let Some(sel) = selections.get(Stage::Diarize) {
        let timeout = calculate_task_timeout(
            Some(audio_duration_s),
            sel.capabilities.performance.rtf_gpu,
            sel.capabilities.performance.rtf_cpu,
            sel.capabilities.requires_gpu,
        );
        let deps = HashSet::from([prepare_task_id.clone()]);
        let task = new_task(id_gen, &job.id, Stage::Diarize, None, sel.engine_id.clone(), deps, timeout, now);
        diarize_task_id = Some(task.id.clone());
        tasks.push(task);
    }

    if let Some(sel) = selections.get(Stage::PiiDetect) {
        let timeout = calculate_task_timeout(
            Some(audio_duration_s),
            sel.capabilities.performance.rtf_gpu,
            sel.capabilities.performance.rtf_cpu,
            sel.capabilities.requires_gpu,
        );
        for &channel in &channels {
            let mut deps = HashSet::new();
            if let Some(prev) = last_stage_ids.get(&channel) {
                deps.insert(prev.clone());
            }
            let task = new_task(
                id_gen,
                &job.id,
                Stage::PiiDetect,
                channel,
                sel.engine_id.clone(),
                deps,
                timeout,
                now,
            );
            last_stage_ids.insert(channel, task.id.clone());
            tasks.push(task);
        }
    }

    let mut audio_redact_task_id = None;
    if let Some(sel) = selections.get(Stage::AudioRedact) {
        let timeout = calculate_task_timeout(
            Some(audio_duration_s),
            sel.capabilities.performance.rtf_gpu,
            sel.capabilities.performance.rtf_cpu,
            sel.capabilities.requires_gpu,
        );
        // Audio redaction needs PII spans from every pii_detect branch plus
        // the prepared audio itself.
        let mut deps: HashSet<TaskId> = last_stage_ids.values().cloned().collect();
        deps.insert(prepare_task_id.clone());
        let task = new_task(id_gen, &job.id, Stage::AudioRedact, None, sel.engine_id.clone(), deps, timeout, now);
        audio_redact_task_id = Some(task.id.clone());
        tasks.push(task);
    }

    if let Some(sel) = selections.get(Stage::Merge) {
        let timeout = calculate_task_timeout(None, None, None, true);
        let mut deps: HashSet<TaskId> = last_stage_ids.values().cloned().collect();
        deps.extend(diarize_task_id.clone());
        deps.extend(audio_redact_task_id.clone());
        let task = new_task(id_gen, &job.id, Stage::Merge, None, sel.engine_id.clone(), deps, timeout, now);
        tasks.push(task);
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalston_core::{EngineCapabilities, JobStatus, LanguageSupport, PerformanceHints, SequentialIdGen};

    fn selection(engine_id: &str, word_ts: bool, diar: bool) -> EngineSelection {
        EngineSelection {
            engine_id: EngineId::new(engine_id),
            capabilities: EngineCapabilities {
                engine_id: EngineId::new(engine_id),
                version: "1".into(),
                stages: vec![],
                languages: LanguageSupport::Any,
                supports_word_timestamps: word_ts,
                supports_streaming: false,
                includes_diarization: diar,
                supports_vocabulary: false,
                model_variants: vec![],
                requires_gpu: true,
                vram_gb: None,
                performance: PerformanceHints {
                    rtf_gpu: Some(0.1),
                    rtf_cpu: None,
                },
            },
            selection_reason: "test".into(),
        }
    }

    fn job(params: JobParameters) -> Job {
        Job {
            id: JobId::new("job1"),
            created_at: chrono::Utc::now(),
            status: JobStatus::Pending,
            audio_uri: "mem://job1/audio.wav".into(),
            parameters: params,
            task_ids: vec![],
            error: None,
        }
    }

    fn default_params() -> JobParameters {
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

    #[test]
    fn simple_pipeline_chains_transcribe_align_merge() {
        let id_gen = SequentialIdGen::new("t");
        let j = job(default_params());
        let now = chrono::Utc::now();
        let prepare_sel = selection("ffmpeg-prepare", false, false);
        let prepare = build_prepare_task(&j, &prepare_sel, &id_gen, now);

        let selections = PipelineSelections {
            transcribe: Some(selection("whisper", false, false)),
            align: Some(selection("aligner", false, false)),
            merge: Some(selection("merger", false, false)),
            ..Default::default()
        };

        let tasks = build_pipeline_tasks(&j, &prepare.id, &selections, 1, 120.0, &id_gen, now);
        assert_eq!(tasks.len(), 3);

        let transcribe = tasks.iter().find(|t| t.stage == Stage::Transcribe).unwrap();
        assert!(transcribe.depends_on.contains(&prepare.id));

        let align = tasks.iter().find(|t| t.stage == Stage::Align).unwrap();
        assert!(align.depends_on.contains(&transcribe.id));

        let merge = tasks.iter().find(|t| t.stage == Stage::Merge).unwrap();
        assert!(merge.depends_on.contains(&align.id));
    }

    #[test]
    fn native_word_timestamps_skips_alignment() {
        let id_gen = SequentialIdGen::new("t");
        let j = job(default_params());
        let now = chrono::Utc::now();
        let prepare_sel = selection("ffmpeg-prepare", false, false);
        let prepare = build_prepare_task(&j, &prepare_sel, &id_gen, now);

        // No align selection present at all -- selector decided it wasn't needed.
        let selections = PipelineSelections {
            transcribe: Some(selection("parakeet", true, false)),
            merge: Some(selection("merger", false, false)),
            ..Default::default()
        };

        let tasks = build_pipeline_tasks(&j, &prepare.id, &selections, 1, 60.0, &id_gen, now);
        assert!(tasks.iter().all(|t| t.stage != Stage::Align));
        let merge = tasks.iter().find(|t| t.stage == Stage::Merge).unwrap();
        let transcribe = tasks.iter().find(|t| t.stage == Stage::Transcribe).unwrap();
        assert!(merge.depends_on.contains(&transcribe.id));
    }

    #[test]
    fn per_channel_speaker_detection_fans_out_transcribe_and_align() {
        let id_gen = SequentialIdGen::new("t");
        let mut params = default_params();
        params.speaker_detection = SpeakerDetection::PerChannel;
        let j = job(params);
        let now = chrono::Utc::now();
        let prepare_sel = selection("ffmpeg-prepare", false, false);
        let prepare = build_prepare_task(&j, &prepare_sel, &id_gen, now);

        let selections = PipelineSelections {
            transcribe: Some(selection("whisper", false, false)),
            align: Some(selection("aligner", false, false)),
            merge: Some(selection("merger", false, false)),
            ..Default::default()
        };

        let tasks = build_pipeline_tasks(&j, &prepare.id, &selections, 2, 300.0, &id_gen, now);

        let transcribe_tasks: Vec<_> = tasks.iter().filter(|t| t.stage == Stage::Transcribe).collect();
        assert_eq!(transcribe_tasks.len(), 2);
        assert!(transcribe_tasks.iter().any(|t| t.channel == Some(0)));
        assert!(transcribe_tasks.iter().any(|t| t.channel == Some(1)));

        let align_tasks: Vec<_> = tasks.iter().filter(|t| t.stage == Stage::Align).collect();
        assert_eq!(align_tasks.len(), 2);

        let merge = tasks.iter().find(|t| t.stage == Stage::Merge).unwrap();
        assert_eq!(merge.depends_on.len(), 2);
        for align in &align_tasks {
            assert!(merge.depends_on.contains(&align.id));
        }
    }

    #[test]
    fn pii_pipeline_chains_through_audio_redact_into_merge() {
        let id_gen = SequentialIdGen::new("t");
        let mut params = default_params();
        params.pii_detect = true;
        params.audio_redact = true;
        let j = job(params);
        let now = chrono::Utc::now();
        let prepare_sel = selection("ffmpeg-prepare", false, false);
        let prepare = build_prepare_task(&j, &prepare_sel, &id_gen, now);

        let selections = PipelineSelections {
            transcribe: Some(selection("whisper", true, false)),
            pii_detect: Some(selection("presidio", false, false)),
            audio_redact: Some(selection("redactor", false, false)),
            merge: Some(selection("merger", false, false)),
            ..Default::default()
        };

        let tasks = build_pipeline_tasks(&j, &prepare.id, &selections, 1, 60.0, &id_gen, now);
        let pii = tasks.iter().find(|t| t.stage == Stage::PiiDetect).unwrap();
        let redact = tasks.iter().find(|t| t.stage == Stage::AudioRedact).unwrap();
        let merge = tasks.iter().find(|t| t.stage == Stage::Merge).unwrap();

        assert!(redact.depends_on.contains(&pii.id));
        assert!(merge.depends_on.contains(&redact.id));
    }
}
