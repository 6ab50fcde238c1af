// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine capability declarations, catalog entries, and live instance state.

use crate::id::{EngineId, InstanceId};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Languages an engine declares support for. `Any` means "supports every
/// language" (the universal/multilingual case in the selector's ranking).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LanguageSupport {
    Any,
    Explicit(Vec<String>),
}

impl LanguageSupport {
    pub fn supports(&self, language: &str) -> bool {
        match self {
            LanguageSupport::Any => true,
            LanguageSupport::Explicit(langs) => langs
                .iter()
                .any(|l| l.eq_ignore_ascii_case(language)),
        }
    }

    pub fn is_universal(&self) -> bool {
        matches!(self, LanguageSupport::Any)
    }

    pub fn explicit_count(&self) -> usize {
        match self {
            LanguageSupport::Any => 0,
            LanguageSupport::Explicit(langs) => langs.len(),
        }
    }
}

/// Performance hints used by the DAG builder's timeout calculation and the
/// selector's speed ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHints {
    /// Real-time factor on GPU (processing time per second of audio).
    #[serde(default)]
    pub rtf_gpu: Option<f64>,
    /// Real-time factor on CPU.
    #[serde(default)]
    pub rtf_cpu: Option<f64>,
}

impl PerformanceHints {
    /// Best available RTF, preferring GPU, for timeout/speed calculations.
    pub fn effective_rtf(&self, prefer_gpu: bool) -> f64 {
        const DEFAULT_RTF: f64 = 1.0;
        if prefer_gpu {
            self.rtf_gpu.or(self.rtf_cpu).unwrap_or(DEFAULT_RTF)
        } else {
            self.rtf_cpu.or(self.rtf_gpu).unwrap_or(DEFAULT_RTF)
        }
    }
}

/// Immutable per-instance capability declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    pub engine_id: EngineId,
    pub version: String,
    pub stages: Vec<Stage>,
    pub languages: LanguageSupport,
    #[serde(default)]
    pub supports_word_timestamps: bool,
    #[serde(default)]
    pub supports_streaming: bool,
    #[serde(default)]
    pub includes_diarization: bool,
    #[serde(default)]
    pub supports_vocabulary: bool,
    #[serde(default)]
    pub model_variants: Vec<String>,
    #[serde(default)]
    pub requires_gpu: bool,
    #[serde(default)]
    pub vram_gb: Option<f64>,
    #[serde(default)]
    pub performance: PerformanceHints,
}

/// Static deployable-engine declaration loaded from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub capabilities: EngineCapabilities,
    pub image: String,
}

/// Runtime health/placement status of a registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Idle,
    Processing,
    Offline,
}

/// Live heartbeat record for one running engine process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineInstance {
    pub engine_id: EngineId,
    pub instance_id: InstanceId,
    pub stage: Stage,
    pub stream_name: String,
    pub status: InstanceStatus,
    pub current_task: Option<crate::id::TaskId>,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub capabilities: EngineCapabilities,
}

/// Heartbeat considered stale (and the instance offline) past this age.
pub const HEARTBEAT_TIMEOUT_SECONDS: i64 = 60;

/// Cadence at which a live instance refreshes its heartbeat.
pub const HEARTBEAT_INTERVAL_SECONDS: u64 = 10;

impl EngineInstance {
    /// Derived availability: not explicitly offline, and heartbeat is fresh.
    pub fn is_available(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if self.status == InstanceStatus::Offline {
            return false;
        }
        let age = (now - self.last_heartbeat).num_seconds();
        age < HEARTBEAT_TIMEOUT_SECONDS
    }
}
