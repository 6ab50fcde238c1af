// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin read-side view of the live engine registry, layered over
//! [`dalston_store::MetadataStore`]. Instances heartbeat themselves directly
//! into the store (see `dalston-worker`); the orchestrator only ever reads.

use dalston_core::{EngineInstance, Stage};
use dalston_store::{MetadataStore, StoreError};

/// Every registered instance for `stage` whose heartbeat is still fresh.
/// Offline/stale instances are filtered out here rather than left for the
/// selector to reason about, matching `BatchEngineState.is_available` being
/// applied before ranking in the original registry.
pub async fn available_instances_for_stage(
    store: &dyn MetadataStore,
    stage: Stage,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<EngineInstance>, StoreError> {
    let all = store.get_all_engine_instances().await?;
    Ok(all
        .into_iter()
        .filter(|i| i.stage == stage && i.is_available(now))
        .collect())
}
