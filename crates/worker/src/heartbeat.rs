// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration and periodic heartbeat, run on an independent schedule from
//! task processing so a long-running `engine.process()` call never starves
//! it (spec.md §5: "Heartbeat emission ... must not be blocked by
//! processing").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dalston_core::{EngineCapabilities, EngineId, EngineInstance, InstanceId, InstanceStatus, Stage, TaskId};
use dalston_store::MetadataStore;
use parking_lot::Mutex;

/// Shared, mutable view of "what is this instance doing right now", read by
/// the heartbeat loop and written by the task loop. Never locked by anything
/// outside this process — the registry itself tolerates stale reads.
#[derive(Default)]
pub struct InstanceState {
    pub current_task: Mutex<Option<TaskId>>,
}

pub struct Heartbeat {
    pub metadata: Arc<dyn MetadataStore>,
    pub engine_id: EngineId,
    pub instance_id: InstanceId,
    pub stage: Stage,
    pub stream_name: String,
    pub capabilities: EngineCapabilities,
    pub state: Arc<InstanceState>,
    pub registered_at: chrono::DateTime<Utc>,
}

impl Heartbeat {
    pub async fn register(&self) -> Result<(), dalston_store::StoreError> {
        self.publish(InstanceStatus::Idle, Utc::now()).await
    }

    /// Runs until cancelled, emitting a fresh heartbeat record every
    /// [`dalston_core::engine::HEARTBEAT_INTERVAL_SECONDS`].
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(dalston_core::engine::HEARTBEAT_INTERVAL_SECONDS));
        loop {
            interval.tick().await;
            let now = Utc::now();
            let status = if self.state.current_task.lock().is_some() {
                InstanceStatus::Processing
            } else {
                InstanceStatus::Idle
            };
            if let Err(err) = self.publish(status, now).await {
                tracing::warn!(instance_id = %self.instance_id, error = %err, "heartbeat publish failed");
            }
        }
    }

    pub async fn unregister(&self) -> Result<(), dalston_store::StoreError> {
        self.metadata.remove_engine_instance(&self.instance_id).await
    }

    async fn publish(&self, status: InstanceStatus, now: chrono::DateTime<Utc>) -> Result<(), dalston_store::StoreError> {
        let current_task = self.state.current_task.lock().clone();
        self.metadata
            .put_engine_instance(&EngineInstance {
                engine_id: self.engine_id.clone(),
                instance_id: self.instance_id.clone(),
                stage: self.stage,
                stream_name: self.stream_name.clone(),
                status,
                current_task,
                last_heartbeat: now,
                registered_at: self.registered_at,
                capabilities: self.capabilities.clone(),
            })
            .await
    }
}
