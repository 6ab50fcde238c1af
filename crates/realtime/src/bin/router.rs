// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time router: accepts client WebSocket sessions, selects a capable
//! real-time worker from the live registry, and either proxies raw frames
//! straight through (`proxy` mode) or terminates the socket itself and
//! bridges finalized utterances onto the batch dispatch path (`steer` mode).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dalston_core::{JobId, RouterMode, UuidIdGen};
use dalston_orchestrator::EngineUnavailablePolicy;
use dalston_realtime::{server, BatchBridgeEngine, Router, RouterEnvConfig, Session};
use dalston_store::{FsObjectStore, MetadataStore, ObjectStore, RedisMetadataStore, RedisTaskQueue, TaskQueue};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = std::env::var("DALSTON_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    dalston_telemetry::init(format, "info,dalston_realtime=debug");

    let env = RouterEnvConfig::from_env()?;
    info!(bind_addr = %env.bind_addr, mode = ?env.mode, "starting dalston-realtime-router");

    let client = redis::Client::open(env.redis_url.as_str())?;
    let conn = redis::aio::ConnectionManager::new(client).await?;

    let metadata: Arc<dyn MetadataStore> = Arc::new(RedisMetadataStore::new(conn.clone()));
    let object_store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&env.object_store_dir));
    let task_queue: Arc<dyn TaskQueue> = Arc::new(RedisTaskQueue::new(conn));
    let catalog = Arc::new(dalston_catalog::EngineCatalog::load(&env.catalog_path)?);
    let router = Arc::new(Router::new(metadata.clone()));

    let listener = TcpListener::bind(&env.bind_addr).await?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("router ready");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let router = router.clone();
                let metadata = metadata.clone();
                let object_store = object_store.clone();
                let task_queue = task_queue.clone();
                let catalog = catalog.clone();
                let mode = env.mode;
                let poll_interval = Duration::from_millis(env.bridge_poll_interval_ms);
                let poll_timeout = Duration::from_millis(env.bridge_poll_timeout_ms);
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(
                        stream, mode, router, metadata, object_store, task_queue, catalog, poll_interval, poll_timeout,
                    )
                    .await
                    {
                        warn!(%peer, error = %err, "realtime connection ended with error");
                    }
                });
            }
            _ = sigterm.recv() => { info!("received SIGTERM, shutting down"); break; }
            _ = sigint.recv() => { info!("received SIGINT, shutting down"); break; }
        }
    }

    dalston_telemetry::shutdown();
    info!("router stopped");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: TcpStream,
    mode: RouterMode,
    router: Arc<Router>,
    metadata: Arc<dyn MetadataStore>,
    object_store: Arc<dyn ObjectStore>,
    task_queue: Arc<dyn TaskQueue>,
    catalog: Arc<dalston_catalog::EngineCatalog>,
    poll_interval: Duration,
    poll_timeout: Duration,
) -> Result<(), anyhow::Error> {
    let query = Arc::new(Mutex::new(String::new()));
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

    match mode {
        RouterMode::Proxy => {
            let now = chrono::Utc::now();
            let worker = router.select(&config.language, config.engine_id.as_ref(), now).await?;
            let worker_url = format!("ws://{}?{}", worker.endpoint, query);
            let (worker_ws, _) = tokio_tungstenite::connect_async(worker_url).await?;
            proxy(ws, worker_ws).await
        }
        RouterMode::Steer => {
            let bridge = BatchBridgeEngine {
                metadata,
                object_store,
                task_queue,
                catalog,
                id_gen: Arc::new(UuidIdGen),
                session_job_id: JobId::new(format!("realtime-{session_id}")),
                poll_interval,
                poll_timeout,
                engine_unavailable_policy: EngineUnavailablePolicy::fail_fast(),
            };
            let session = Session::new(session_id, config, vad_config, Arc::new(bridge));
            server::serve_session(ws, session).await.map_err(Into::into)
        }
    }
}

/// Relay frames bidirectionally until either side closes.
async fn proxy<A, B>(a: WebSocketStream<A>, b: WebSocketStream<B>) -> Result<(), anyhow::Error>
where
    A: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    B: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut a_sink, mut a_stream) = a.split();
    let (mut b_sink, mut b_stream) = b.split();

    loop {
        tokio::select! {
            msg = a_stream.next() => {
                match msg {
                    Some(Ok(m)) => {
                        let is_close = matches!(m, Message::Close(_));
                        b_sink.send(m).await?;
                        if is_close { break; }
                    }
                    _ => break,
                }
            }
            msg = b_stream.next() => {
                match msg {
                    Some(Ok(m)) => {
                        let is_close = matches!(m, Message::Close(_));
                        a_sink.send(m).await?;
                        if is_close { break; }
                    }
                    _ => break,
                }
            }
        }
    }

    Ok(())
}
