// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dalston job` — submit a job and inspect its tasks, talking to the same
//! Redis/object-store backend the orchestrator reads and writes.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use dalston_core::{IdGen, Job, JobId, JobParameters, SpeakerDetection, TimestampGranularity, UuidIdGen};
use dalston_orchestrator::EngineUnavailablePolicy;
use dalston_store::{MetadataStore, ObjectStore, TaskQueue};

use crate::output::{print_json, print_table, OutputFormat};

#[derive(Args)]
pub struct JobArgs {
    #[command(subcommand)]
    pub command: JobCommand,
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// Submit a new job for the audio at `audio_uri`.
    Submit {
        /// URI of the already-uploaded source media (out of scope: upload itself).
        audio_uri: String,
        /// BCP-47 language code, or "auto" to let the first stage detect it.
        #[arg(long, default_value = "auto")]
        language: String,
        /// "none" | "diarize" | "per_channel"
        #[arg(long = "speaker-detection", default_value = "none")]
        speaker_detection: String,
        #[arg(long = "word-timestamps")]
        word_timestamps: bool,
        /// "segment" | "word", only meaningful with --word-timestamps.
        #[arg(long = "timestamp-granularity")]
        timestamp_granularity: Option<String>,
        #[arg(long = "vocabulary", value_delimiter = ',')]
        vocabulary: Vec<String>,
        #[arg(long = "pii-detect")]
        pii_detect: bool,
        #[arg(long = "audio-redact")]
        audio_redact: bool,
        #[arg(long = "webhook-url")]
        webhook_url: Option<String>,
    },
    /// Show a job and its tasks.
    Show { job_id: String },
    /// List jobs tracked by the metadata store.
    List,
}

fn parse_speaker_detection(value: &str) -> Result<SpeakerDetection> {
    match value {
        "none" => Ok(SpeakerDetection::None),
        "diarize" => Ok(SpeakerDetection::Diarize),
        "per_channel" | "per-channel" => Ok(SpeakerDetection::PerChannel),
        other => bail!("invalid --speaker-detection value '{other}' (expected none, diarize, or per_channel)"),
    }
}

fn parse_granularity(value: &str) -> Result<TimestampGranularity> {
    match value {
        "segment" => Ok(TimestampGranularity::Segment),
        "word" => Ok(TimestampGranularity::Word),
        other => bail!("invalid --timestamp-granularity value '{other}' (expected segment or word)"),
    }
}

pub async fn handle(
    command: JobCommand,
    metadata: &dyn MetadataStore,
    object_store: &dyn ObjectStore,
    task_queue: &dyn TaskQueue,
    catalog: &dalston_catalog::EngineCatalog,
    engine_unavailable_policy: &EngineUnavailablePolicy,
    format: OutputFormat,
) -> Result<()> {
    match command {
        JobCommand::Submit {
            audio_uri,
            language,
            speaker_detection,
            word_timestamps,
            timestamp_granularity,
            vocabulary,
            pii_detect,
            audio_redact,
            webhook_url,
        } => {
            let parameters = JobParameters {
                language,
                speaker_detection: parse_speaker_detection(&speaker_detection)?,
                word_timestamps,
                timestamp_granularity: timestamp_granularity.as_deref().map(parse_granularity).transpose()?,
                vocabulary,
                pii_detect,
                audio_redact,
                webhook_url,
                engine_preference: HashMap::new(),
            };
            let now = chrono::Utc::now();
            let job = Job::new(JobId::new(UuidIdGen.next()), audio_uri, parameters, now);
            let job = dalston_orchestrator::submit_job(
                metadata,
                object_store,
                task_queue,
                catalog,
                job,
                &UuidIdGen,
                now,
                engine_unavailable_policy,
            )
            .await
            .context("job submission failed")?;
            match format {
                OutputFormat::Json => print_json(&job)?,
                OutputFormat::Text => println!("submitted job {} (status: {})", job.id, job.status),
            }
        }
        JobCommand::Show { job_id } => {
            let job_id = JobId::new(job_id);
            let job = metadata
                .get_job(&job_id)
                .await?
                .with_context(|| format!("no such job: {job_id}"))?;
            let tasks = metadata.get_tasks_for_job(&job_id).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "job": job, "tasks": tasks }))?,
                OutputFormat::Text => {
                    println!("job {} — status: {}, language: {}", job.id, job.status, job.parameters.language);
                    if let Some(err) = &job.error {
                        println!("error: {err}");
                    }
                    let rows: Vec<Vec<String>> = tasks
                        .iter()
                        .map(|t| {
                            vec![
                                t.id.to_string(),
                                t.qualified_stage_name(),
                                t.engine_id.to_string(),
                                t.status.to_string(),
                            ]
                        })
                        .collect();
                    print_table(&["TASK", "STAGE", "ENGINE", "STATUS"], &rows);
                }
            }
        }
        JobCommand::List => {
            let jobs = metadata.get_all_jobs().await?;
            match format {
                OutputFormat::Json => print_json(&jobs)?,
                OutputFormat::Text => {
                    let rows: Vec<Vec<String>> = jobs
                        .iter()
                        .map(|j| vec![j.id.to_string(), j.status.to_string(), j.parameters.language.clone(), j.created_at.to_rfc3339()])
                        .collect();
                    print_table(&["JOB", "STATUS", "LANGUAGE", "CREATED"], &rows);
                }
            }
        }
    }
    Ok(())
}
