// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch engine worker process entrypoint. Registers an engine instance in
//! the registry, starts its heartbeat on an independent schedule, then runs
//! the claim/process/publish loop until SIGTERM/SIGINT.

use std::sync::Arc;

use dalston_core::{EngineCapabilities, EngineId, InstanceId, LanguageSupport, PerformanceHints, Stage};
use dalston_store::{FsObjectStore, RedisEventLog, RedisMetadataStore, RedisTaskQueue};
use dalston_worker::{EnvConfig, Heartbeat, InstanceState, Runner, StubEngine};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = std::env::var("DALSTON_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    dalston_telemetry::init(format, "info,dalston_worker=debug");

    let env = EnvConfig::from_env()?;
    let engine_id = EngineId::new(&env.engine_id);
    let instance_id = InstanceId::new(format!("{}-{}", env.engine_id, uuid::Uuid::new_v4()));
    info!(engine_id = %engine_id, instance_id = %instance_id, stage = %env.stage, "starting dalston-worker");

    let client = redis::Client::open(env.redis_url.as_str())?;
    let conn = redis::aio::ConnectionManager::new(client).await?;

    let metadata: Arc<dyn dalston_store::MetadataStore> = Arc::new(RedisMetadataStore::new(conn.clone()));
    let object_store: Arc<dyn dalston_store::ObjectStore> = Arc::new(FsObjectStore::new(&env.object_store_dir));
    let event_log: Arc<dyn dalston_store::EventLog> = Arc::new(RedisEventLog::new(conn.clone()).await?);
    let task_queue: Arc<dyn dalston_store::TaskQueue> = Arc::new(RedisTaskQueue::new(conn));

    // TODO: swap in a real engine implementation per DALSTON_ENGINE_ID once
    // one is wired up; every engine in the catalog is a separate binary/image
    // sharing this same worker loop.
    let engine: Arc<dyn dalston_worker::Engine> = Arc::new(StubEngine::new(env.engine_id.clone(), vec![env.stage]));

    let capabilities = EngineCapabilities {
        engine_id: engine_id.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stages: vec![env.stage],
        languages: LanguageSupport::Any,
        supports_word_timestamps: false,
        supports_streaming: false,
        includes_diarization: false,
        supports_vocabulary: false,
        model_variants: vec![],
        requires_gpu: false,
        vram_gb: None,
        performance: PerformanceHints { rtf_gpu: None, rtf_cpu: None },
    };

    let state = Arc::new(InstanceState::default());
    let heartbeat = Heartbeat {
        metadata: metadata.clone(),
        engine_id: engine_id.clone(),
        instance_id: instance_id.clone(),
        stage: env.stage,
        stream_name: format!("dalston:queue:{engine_id}"),
        capabilities,
        state: state.clone(),
        registered_at: chrono::Utc::now(),
    };
    heartbeat.register().await?;

    let heartbeat_handle = tokio::spawn(async move { heartbeat.run().await });

    let runner = Runner {
        metadata: metadata.clone(),
        object_store,
        task_queue,
        event_log,
        engine,
        engine_id,
        instance_id: instance_id.clone(),
        state,
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("worker ready");

    loop {
        tokio::select! {
            result = runner.tick(env.claim_min_idle_ms, env.poll_block_ms) => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "worker tick failed");
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    heartbeat_handle.abort();
    metadata.remove_engine_instance(&instance_id).await?;
    dalston_telemetry::shutdown();
    info!("worker stopped");
    Ok(())
}
