// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time streaming worker: registers capacity in the real-time registry,
//! heartbeats on a fixed schedule independent of active sessions, and serves
//! each accepted WebSocket connection end to end with its own VAD and
//! streaming engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dalston_core::realtime::REALTIME_HEARTBEAT_TIMEOUT_SECONDS;
use dalston_core::{EngineId, InstanceId, LanguageSupport, RealtimeWorkerRecord};
use dalston_realtime::{server, StreamingEngine, StubStreamingEngine, Session, WorkerEnvConfig};
use dalston_store::{MetadataStore, RedisMetadataStore};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = std::env::var("DALSTON_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    dalston_telemetry::init(format, "info,dalston_realtime=debug");

    let env = WorkerEnvConfig::from_env()?;
    let engine_id = EngineId::new(&env.engine_id);
    let instance_id = InstanceId::new(format!("{}-{}", env.engine_id, uuid::Uuid::new_v4()));
    info!(engine_id = %engine_id, instance_id = %instance_id, bind_addr = %env.bind_addr, "starting dalston-realtime-worker");

    let client = redis::Client::open(env.redis_url.as_str())?;
    let conn = redis::aio::ConnectionManager::new(client).await?;
    let metadata: Arc<dyn MetadataStore> = Arc::new(RedisMetadataStore::new(conn));

    // TODO: swap in a real streaming model per DALSTON_ENGINE_ID; every
    // real-time engine is a separate binary/image sharing this worker loop.
    let engine: Arc<dyn StreamingEngine> = Arc::new(StubStreamingEngine { id: env.engine_id.clone() });

    let active_sessions = Arc::new(AtomicU32::new(0));

    let heartbeat_metadata = metadata.clone();
    let heartbeat_engine_id = engine_id.clone();
    let heartbeat_instance_id = instance_id.clone();
    let heartbeat_endpoint = env.advertise_addr.clone();
    let heartbeat_sessions = active_sessions.clone();
    let max_sessions = env.max_sessions;
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(
            (REALTIME_HEARTBEAT_TIMEOUT_SECONDS / 3).max(1) as u64,
        ));
        loop {
            interval.tick().await;
            let record = RealtimeWorkerRecord {
                engine_id: heartbeat_engine_id.clone(),
                instance_id: heartbeat_instance_id.clone(),
                endpoint: heartbeat_endpoint.clone(),
                languages: LanguageSupport::Any,
                max_sessions,
                active_sessions: heartbeat_sessions.load(Ordering::Relaxed),
                last_heartbeat: chrono::Utc::now(),
            };
            if let Err(err) = heartbeat_metadata.put_realtime_worker(&record).await {
                warn!(error = %err, "real-time worker heartbeat publish failed");
            }
        }
    });

    let listener = TcpListener::bind(&env.bind_addr).await?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("real-time worker ready");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let engine = engine.clone();
                let active_sessions = active_sessions.clone();
                tokio::spawn(async move {
                    active_sessions.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = serve(stream, engine).await {
                        warn!(%peer, error = %err, "real-time session ended with error");
                    }
                    active_sessions.fetch_sub(1, Ordering::Relaxed);
                });
            }
            _ = sigterm.recv() => { info!("received SIGTERM, shutting down"); break; }
            _ = sigint.recv() => { info!("received SIGINT, shutting down"); break; }
        }
    }

    heartbeat_handle.abort();
    metadata.remove_realtime_worker(&instance_id).await?;
    dalston_telemetry::shutdown();
    info!("real-time worker stopped");
    Ok(())
}

async fn serve(stream: tokio::net::TcpStream, engine: Arc<dyn StreamingEngine>) -> Result<(), anyhow::Error> {
    // The router forwards the client's original query string when proxying;
    // a direct connection to this worker carries it itself either way.
    let query = Arc::new(std::sync::Mutex::new(String::new()));
    let query_cb = query.clone();
    let ws = tokio_tungstenite::accept_hdr_async(stream, move |req: &tokio_tungstenite::tungstenite::handshake::server::Request, resp| {
        if let Some(q) = req.uri().query() {
            *query_cb.lock().expect("query mutex poisoned") = q.to_string();
        }
        Ok(resp)
    })
    .await?;

    let query = query.lock().expect("query mutex poisoned").clone();
    let (session_id, config, vad_config) = server::parse_connection_params(&query);
    let session = Session::new(session_id, config, vad_config, engine);
    server::serve_session(ws, session).await.map_err(Into::into)
}
