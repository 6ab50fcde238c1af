// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Static engine catalog: a YAML-declared list of engines that could be
//! started, used to validate job requirements before any engine instance is
//! actually running. The registry (live heartbeats, see `dalston-store`)
//! answers "what's running right now"; this crate answers "what could run".

mod error;

pub use error::CatalogError;

use dalston_core::{CatalogEntry, EngineCapabilities, EngineId, LanguageSupport, PerformanceHints, Stage};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    engines: HashMap<String, CatalogEngineYaml>,
}

#[derive(Debug, Deserialize)]
struct CatalogEngineYaml {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    stages: Vec<Stage>,
    #[serde(default)]
    languages: Option<LanguageSupport>,
    #[serde(default)]
    supports_word_timestamps: bool,
    #[serde(default)]
    supports_streaming: bool,
    #[serde(default)]
    includes_diarization: bool,
    #[serde(default)]
    supports_vocabulary: bool,
    #[serde(default)]
    model_variants: Vec<String>,
    #[serde(default)]
    requires_gpu: bool,
    #[serde(default)]
    vram_gb: Option<f64>,
    #[serde(default)]
    performance: PerformanceHints,
}

/// Static, in-memory catalog of deployable engines, loaded once at startup.
pub struct EngineCatalog {
    entries: HashMap<EngineId, CatalogEntry>,
}

impl EngineCatalog {
    /// Load a catalog from a YAML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading engine catalog");
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let parsed = Self::parse(&raw)?;
        info!(engine_count = parsed.entries.len(), "engine catalog loaded");
        Ok(parsed)
    }

    /// Parse a catalog from an in-memory YAML string (used by tests and by
    /// [`Self::load`]).
    pub fn parse(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let mut entries = HashMap::new();
        for (engine_id, raw) in file.engines {
            let engine_id = EngineId::new(engine_id);
            let image = raw
                .image
                .clone()
                .unwrap_or_else(|| format!("dalston/{engine_id}:latest"));
            let capabilities = EngineCapabilities {
                engine_id: engine_id.clone(),
                version: "catalog".to_string(),
                stages: raw.stages,
                languages: raw.languages.unwrap_or(LanguageSupport::Any),
                supports_word_timestamps: raw.supports_word_timestamps,
                supports_streaming: raw.supports_streaming,
                includes_diarization: raw.includes_diarization,
                supports_vocabulary: raw.supports_vocabulary,
                model_variants: raw.model_variants,
                requires_gpu: raw.requires_gpu,
                vram_gb: raw.vram_gb,
                performance: raw.performance,
            };
            entries.insert(engine_id, CatalogEntry { capabilities, image });
        }
        Ok(Self { entries })
    }

    pub fn get_engine(&self, engine_id: &EngineId) -> Option<&CatalogEntry> {
        self.entries.get(engine_id)
    }

    pub fn get_all_engines(&self) -> Vec<&CatalogEntry> {
        self.entries.values().collect()
    }

    pub fn get_engines_for_stage(&self, stage: Stage) -> Vec<&CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.capabilities.stages.contains(&stage))
            .collect()
    }

    pub fn find_engines_supporting_language(&self, stage: Stage, language: &str) -> Vec<&CatalogEntry> {
        self.get_engines_for_stage(stage)
            .into_iter()
            .filter(|e| e.capabilities.languages.supports(language))
            .collect()
    }

    /// `None` if some catalog engine supports `language` for `stage`,
    /// otherwise a human-readable reason suitable for rejecting a job at
    /// submission time.
    pub fn validate_language_support(&self, stage: Stage, language: &str) -> Option<String> {
        if !self.find_engines_supporting_language(stage, language).is_empty() {
            return None;
        }
        let available = self.get_engines_for_stage(stage);
        if available.is_empty() {
            return Some(format!("no engine in catalog handles stage '{stage}'"));
        }
        let ids: Vec<&str> = available.iter().map(|e| e.capabilities.engine_id.as_str()).collect();
        Some(format!(
            "no engine in catalog supports language '{language}' for stage '{stage}'. available engines: {ids:?}"
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, engine_id: &EngineId) -> bool {
        self.entries.contains_key(engine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
engines:
  faster-whisper:
    image: dalston/faster-whisper:1.2
    stages: [transcribe]
    languages: null
    supports_word_timestamps: true
    requires_gpu: true
    vram_gb: 4.0
    performance:
      rtf_gpu: 0.05
  whisper-hr:
    stages: [transcribe]
    languages: [hr, bs, sr]
  wav2vec2-align:
    stages: [align]
    languages: [en, hr]
"#;

    #[test]
    fn parses_engines_and_defaults_image() {
        let catalog = EngineCatalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 3);
        let entry = catalog.get_engine(&EngineId::new("whisper-hr")).unwrap();
        assert_eq!(entry.image, "dalston/whisper-hr:latest");
    }

    #[test]
    fn universal_language_engine_supports_any_language() {
        let catalog = EngineCatalog::parse(SAMPLE).unwrap();
        let hits = catalog.find_engines_supporting_language(Stage::Transcribe, "zz");
        assert!(hits.iter().any(|e| e.capabilities.engine_id == EngineId::new("faster-whisper")));
    }

    #[test]
    fn explicit_language_engine_excluded_when_unsupported() {
        let catalog = EngineCatalog::parse(SAMPLE).unwrap();
        let hits = catalog.find_engines_supporting_language(Stage::Transcribe, "hr");
        assert!(hits.iter().any(|e| e.capabilities.engine_id == EngineId::new("whisper-hr")));
        let align_hits = catalog.find_engines_supporting_language(Stage::Align, "fr");
        assert!(align_hits.is_empty());
    }

    #[test]
    fn validate_language_support_reports_missing_stage() {
        let catalog = EngineCatalog::parse(SAMPLE).unwrap();
        let err = catalog
            .validate_language_support(Stage::Diarize, "en")
            .unwrap();
        assert!(err.contains("no engine in catalog handles stage"));
    }

    #[test]
    fn validate_language_support_reports_missing_language() {
        let catalog = EngineCatalog::parse(SAMPLE).unwrap();
        let err = catalog
            .validate_language_support(Stage::Align, "fr")
            .unwrap();
        assert!(err.contains("no engine in catalog supports language"));
    }

    #[test]
    fn validate_language_support_ok_when_supported() {
        let catalog = EngineCatalog::parse(SAMPLE).unwrap();
        assert!(catalog.validate_language_support(Stage::Transcribe, "hr").is_none());
    }
}
