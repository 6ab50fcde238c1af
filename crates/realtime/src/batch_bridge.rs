// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridges `steer` mode to the batch transcription path: the router runs
//! VAD itself (see [`crate::session::Session`]) and, for each finalized
//! utterance, hands it to this [`StreamingEngine`] implementation instead of
//! a dedicated real-time model. It builds an ad-hoc single-task dispatch the
//! same way the orchestrator dispatches any other transcribe task, then
//! polls task metadata for the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dalston_catalog::EngineCatalog;
use dalston_core::stage_output::Word;
use dalston_core::{IdGen, JobId, Stage, StageOutput, Task, TaskId, TaskStatus};
use dalston_orchestrator::{dispatch_task, EngineUnavailablePolicy};
use dalston_selector::Requirements;
use dalston_store::{MetadataStore, ObjectStore, TaskQueue};

use crate::engine::{StreamingEngine, StreamingResult, TranscribeRequest};

pub struct BatchBridgeEngine {
    pub metadata: Arc<dyn MetadataStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub task_queue: Arc<dyn TaskQueue>,
    pub catalog: Arc<EngineCatalog>,
    pub id_gen: Arc<dyn IdGen>,
    /// Synthetic job namespace for this session's ad-hoc tasks; real-time
    /// utterances aren't part of any job DAG, but object URIs still need a
    /// job-scoped prefix.
    pub session_job_id: JobId,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// A live session has nowhere to queue work for later, so the bridge
    /// always fails fast rather than waiting on an engine.
    pub engine_unavailable_policy: EngineUnavailablePolicy,
}

#[async_trait]
impl StreamingEngine for BatchBridgeEngine {
    fn engine_id(&self) -> &str {
        "batch-bridge"
    }

    async fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<StreamingResult, anyhow::Error> {
        let now = chrono::Utc::now();
        let running: Vec<_> = self
            .metadata
            .get_all_engine_instances()
            .await?
            .into_iter()
            .filter(|i| i.is_available(now))
            .collect();

        let requirements = if request.language == "auto" {
            Requirements::default()
        } else {
            Requirements::language_only(Some(request.language))
        };
        let selection = dalston_selector::select_engine(Stage::Transcribe, &requirements, &running, &self.catalog, None)
            .map_err(|e| anyhow::anyhow!(e.explain()))?;

        let task_id = TaskId::new(self.id_gen.next());
        let audio_uri = self.object_store.make_uri(&self.session_job_id, &task_id, "audio.pcm");
        let bytes: Vec<u8> = request.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.object_store.put(&audio_uri, &bytes).await?;

        let mut config: HashMap<String, serde_json::Value> = HashMap::new();
        config.insert("language".to_string(), serde_json::json!(request.language));
        config.insert("sample_rate".to_string(), serde_json::json!(request.sample_rate));
        if !request.vocabulary.is_empty() {
            config.insert("vocabulary".to_string(), serde_json::json!(request.vocabulary));
        }

        let mut task = Task {
            id: task_id.clone(),
            job_id: self.session_job_id.clone(),
            stage: Stage::Transcribe,
            channel: None,
            engine_id: selection.engine_id.clone(),
            status: TaskStatus::Pending,
            input_uri: None,
            output_uri: None,
            depends_on: Default::default(),
            config,
            retry_count: 0,
            max_retries: 0,
            timeout_seconds: self.poll_timeout.as_secs(),
            waiting_since: None,
            wait_deadline: None,
            created_at: now,
            updated_at: now,
        };

        dispatch_task(
            self.metadata.as_ref(),
            self.object_store.as_ref(),
            self.task_queue.as_ref(),
            &self.catalog,
            &mut task,
            vec![],
            audio_uri,
            now,
            &self.engine_unavailable_policy,
        )
        .await?;

        self.await_result(&task_id).await
    }
}

impl BatchBridgeEngine {
    async fn await_result(&self, task_id: &TaskId) -> Result<StreamingResult, anyhow::Error> {
        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            if let Some(task) = self.metadata.get_task(task_id).await? {
                match task.status {
                    TaskStatus::Completed => {
                        let output_uri = task
                            .output_uri
                            .ok_or_else(|| anyhow::anyhow!("completed task {task_id} has no output_uri"))?;
                        let bytes = self.object_store.get(&output_uri).await?;
                        let output: StageOutput = serde_json::from_slice(&bytes)?;
                        return match output {
                            StageOutput::Transcribe(t) => {
                                let words: Vec<Word> = t
                                    .segments
                                    .into_iter()
                                    .flat_map(|s| s.words.unwrap_or_default())
                                    .collect();
                                Ok(StreamingResult {
                                    text: t.full_text,
                                    words: Some(words),
                                    detected_language: t.detected_language,
                                })
                            }
                            other => Err(anyhow::anyhow!(
                                "unexpected stage output '{:?}' for a transcribe task",
                                other.stage()
                            )),
                        };
                    }
                    TaskStatus::Failed | TaskStatus::Cancelled => {
                        return Err(anyhow::anyhow!("transcribe task {task_id} ended in status {}", task.status));
                    }
                    _ => {}
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow::anyhow!("timed out waiting for transcribe task {task_id}"));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalston_core::{
        EngineCapabilities, EngineInstance, EngineId, InstanceId, InstanceStatus, LanguageSupport, PerformanceHints,
        SequentialIdGen, TimestampGranularity,
    };
    use dalston_core::stage_output::{AlignmentMethod, Segment, TranscribeOutput};
    use dalston_store::{FakeMetadataStore, FakeObjectStore, FakeTaskQueue};

    fn instance() -> EngineInstance {
        let now = chrono::Utc::now();
        EngineInstance {
            engine_id: EngineId::new("faster-whisper"),
            instance_id: InstanceId::new("faster-whisper-1"),
            stage: Stage::Transcribe,
            stream_name: "dalston:queue:faster-whisper".to_string(),
            status: InstanceStatus::Idle,
            current_task: None,
            last_heartbeat: now,
            registered_at: now,
            capabilities: EngineCapabilities {
                engine_id: EngineId::new("faster-whisper"),
                version: "1".into(),
                stages: vec![Stage::Transcribe],
                languages: LanguageSupport::Any,
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

    #[tokio::test]
    async fn bridges_utterance_through_a_completed_task() {
        let metadata = Arc::new(FakeMetadataStore::default());
        let object_store = Arc::new(FakeObjectStore::default());
        let task_queue = Arc::new(FakeTaskQueue::default());
        metadata.put_engine_instance(&instance()).await.unwrap();

        let bridge = BatchBridgeEngine {
            metadata: metadata.clone(),
            object_store: object_store.clone(),
            task_queue: task_queue.clone(),
            catalog: Arc::new(EngineCatalog::parse("engines: {}").unwrap()),
            id_gen: Arc::new(SequentialIdGen::new("rt")),
            session_job_id: JobId::new("realtime-session-j1"),
            poll_interval: Duration::from_millis(5),
            poll_timeout: Duration::from_millis(200),
            engine_unavailable_policy: EngineUnavailablePolicy::fail_fast(),
        };

        // Simulate the worker completing the task shortly after dispatch.
        let metadata_for_worker = metadata.clone();
        let object_store_for_worker = object_store.clone();
        let task_queue_for_worker = task_queue.clone();
        tokio::spawn(async move {
            loop {
                let engine = EngineId::new("faster-whisper");
                let consumer = InstanceId::new("test-worker");
                let entries = task_queue_for_worker.read_new(&engine, &consumer, 1, 50).await.unwrap();
                if let Some((_, dispatch)) = entries.into_iter().next() {
                    let mut task = metadata_for_worker.get_task(&dispatch.task_id).await.unwrap().unwrap();
                    let output_uri = object_store_for_worker.make_uri(&task.job_id, &task.id, "output.json");
                    let output = StageOutput::Transcribe(TranscribeOutput {
                        segments: vec![Segment { start: 0.0, end: 1.0, text: "hello".into(), words: None }],
                        full_text: "hello".into(),
                        detected_language: "en".into(),
                        granularity_achieved: TimestampGranularity::Segment,
                        alignment_method: AlignmentMethod::None,
                    });
                    object_store_for_worker
                        .put(&output_uri, &serde_json::to_vec(&output).unwrap())
                        .await
                        .unwrap();
                    task.output_uri = Some(output_uri);
                    task.status = TaskStatus::Completed;
                    metadata_for_worker.put_task(&task).await.unwrap();
                    break;
                }
            }
        });

        let result = bridge
            .transcribe(TranscribeRequest {
                samples: &[0.0; 1600],
                sample_rate: 16_000,
                language: "en",
                vocabulary: &[],
                is_final: true,
            })
            .await
            .unwrap();

        assert_eq!(result.text, "hello");
        assert_eq!(result.detected_language, "en");
    }
}
