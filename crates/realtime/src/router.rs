// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time worker selection: pick a worker with capacity for the session's
//! language out of the live [`RealtimeWorkerRecord`] registry. Mirrors
//! `dalston-selector`'s capability-first approach, but ranks only on language
//! specificity and load — a real-time worker either has a free session slot
//! or it doesn't, there's no per-task speed/format tradeoff to weigh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dalston_core::{EngineId, LanguageSupport, RealtimeWorkerRecord};
use dalston_store::MetadataStore;

use crate::error::RealtimeError;

pub struct Router {
    metadata: Arc<dyn MetadataStore>,
}

impl Router {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Choose a worker with free capacity for `language`, preferring a
    /// language-specific worker over a universal one, then the least loaded.
    pub async fn select(
        &self,
        language: &str,
        preferred_engine: Option<&EngineId>,
        now: DateTime<Utc>,
    ) -> Result<RealtimeWorkerRecord, RealtimeError> {
        let workers = self.metadata.get_realtime_workers().await?;
        let candidates: Vec<RealtimeWorkerRecord> = workers
            .into_iter()
            .filter(|w| w.has_capacity(now))
            .filter(|w| w.languages.supports(language))
            .filter(|w| preferred_engine.map_or(true, |e| &w.engine_id == e))
            .collect();

        candidates
            .into_iter()
            .max_by_key(|w| rank(w))
            .ok_or_else(|| RealtimeError::NoCapacity(language.to_string()))
    }
}

/// Higher is better: language specificity first, then available headroom.
fn rank(worker: &RealtimeWorkerRecord) -> (i32, i64) {
    let specific = matches!(worker.languages, LanguageSupport::Explicit(_)) as i32;
    let headroom = (worker.max_sessions - worker.active_sessions) as i64;
    (specific, headroom)
}
