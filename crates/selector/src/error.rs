// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dalston_core::{EngineId, Stage};
use thiserror::Error;

/// A running engine that was evaluated but didn't meet requirements, with a
/// human-readable reason, surfaced so operators can see why selection failed.
#[derive(Debug, Clone)]
pub struct CandidateMismatch {
    pub engine_id: EngineId,
    pub reason: String,
}

/// A catalog engine not currently running that could satisfy the request if
/// started.
#[derive(Debug, Clone)]
pub struct CatalogAlternative {
    pub engine_id: EngineId,
    pub image: String,
}

#[derive(Debug, Error)]
#[error("no running engine can handle stage '{stage}' (requirements: {requirements:?})")]
pub struct NoCapableEngine {
    pub stage: Stage,
    pub requirements: crate::Requirements,
    pub candidates: Vec<CandidateMismatch>,
    pub catalog_alternatives: Vec<CatalogAlternative>,
}

impl NoCapableEngine {
    /// Multi-line human-readable explanation, in the spirit of the original
    /// `NoCapableEngineError` message: what was required, what's running and
    /// why it doesn't match, and what could be started instead.
    pub fn explain(&self) -> String {
        let mut lines = vec![
            "No running engine can handle this job.".to_string(),
            format!("  Stage: {}", self.stage),
            format!("  Required: {:?}", self.requirements),
            String::new(),
        ];

        if self.candidates.is_empty() {
            lines.push(format!("  No engines running for stage '{}'.", self.stage));
        } else {
            lines.push(format!("  Running engines for '{}':", self.stage));
            for c in &self.candidates {
                lines.push(format!("    - {}: {}", c.engine_id, c.reason));
            }
        }

        if !self.catalog_alternatives.is_empty() {
            lines.push(String::new());
            lines.push("  Available in catalog (not running):".to_string());
            for alt in &self.catalog_alternatives {
                lines.push(format!("    - {} ({})", alt.engine_id, alt.image));
            }
        }

        lines.join("\n")
    }
}

#[derive(Debug, Error)]
#[error("engine {engine_id} does not support required capability: {capability}")]
pub struct EngineCapabilityMismatch {
    pub engine_id: EngineId,
    pub capability: String,
}
