// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Capability-driven engine selection.
//!
//! Given the set of currently-running engine instances (from the live
//! registry) and the static catalog (what could be started), choose the best
//! engine for a pipeline stage: hard-filter by language/streaming, then rank
//! by `(language_safety, native_word_timestamps, native_diarization,
//! language_specificity, speed)`. Pure with respect to its inputs — no I/O —
//! so it is driven entirely by data the orchestrator already fetched.

mod error;

pub use error::{CandidateMismatch, CatalogAlternative, EngineCapabilityMismatch, NoCapableEngine};

use dalston_catalog::EngineCatalog;
use dalston_core::{EngineCapabilities, EngineId, EngineInstance, LanguageSupport, Stage};
use tracing::info;

/// Hard requirements a job places on the engine for one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requirements {
    pub language: Option<String>,
    pub streaming: bool,
}

impl Requirements {
    pub fn language_only(language: Option<&str>) -> Self {
        Self {
            language: language.map(|s| s.to_string()),
            streaming: false,
        }
    }
}

/// The chosen engine for a stage, plus why it was picked.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSelection {
    pub engine_id: EngineId,
    pub capabilities: EngineCapabilities,
    pub selection_reason: String,
}

fn meets_requirements(caps: &EngineCapabilities, requirements: &Requirements) -> bool {
    if let Some(lang) = &requirements.language {
        if !caps.languages.supports(lang) {
            return false;
        }
    }
    if requirements.streaming && !caps.supports_streaming {
        return false;
    }
    true
}

fn explain_mismatch(caps: &EngineCapabilities, requirements: &Requirements) -> String {
    let mut reasons = Vec::new();
    if let Some(lang) = &requirements.language {
        if !caps.languages.supports(lang) {
            reasons.push(format!(
                "language '{lang}' not supported (has: {:?})",
                caps.languages
            ));
        }
    }
    if requirements.streaming && !caps.supports_streaming {
        reasons.push("streaming not supported".to_string());
    }
    if reasons.is_empty() {
        "unknown".to_string()
    } else {
        reasons.join("; ")
    }
}

/// Ranking score, highest wins. Tuple order IS priority order:
/// 1. Safety when language is unknown (universal > multilingual > single)
/// 2. Native word timestamps (skips the align stage)
/// 3. Native diarization (skips the diarize stage)
/// 4. Language specificity (specialized beats universal, once language is known)
/// 5. Speed (lower RTF is better, so the score negates it)
fn score(caps: &EngineCapabilities, requirements: &Requirements) -> (i32, i32, i32, i32, i64) {
    let unknown_lang_safety = if requirements.language.is_some() {
        0
    } else {
        match &caps.languages {
            LanguageSupport::Any => 2,
            LanguageSupport::Explicit(langs) if langs.len() > 1 => 1,
            LanguageSupport::Explicit(_) => 0,
        }
    };

    let native_ts = caps.supports_word_timestamps as i32;
    let native_diar = caps.includes_diarization as i32;
    let specific = matches!(caps.languages, LanguageSupport::Explicit(_)) as i32;

    let rtf = caps.performance.rtf_gpu.unwrap_or(999.0);
    // Negated and scaled to an integer so the tuple totally orders without
    // relying on float Ord.
    let speed = -(rtf * 1_000_000.0) as i64;

    (unknown_lang_safety, native_ts, native_diar, specific, speed)
}

fn rank_and_select(
    capable: &[&EngineInstance],
    requirements: &Requirements,
) -> EngineSelection {
    let winner = capable
        .iter()
        .max_by_key(|inst| score(&inst.capabilities, requirements))
        .copied()
        .expect("capable must be non-empty");

    let mut reasons = Vec::new();
    if winner.capabilities.supports_word_timestamps {
        reasons.push("native word timestamps");
    }
    if winner.capabilities.includes_diarization {
        reasons.push("native diarization");
    }
    let ranked_note = format!("ranked first of {}", capable.len());
    if capable.len() > 1 {
        reasons.push(&ranked_note);
    }

    EngineSelection {
        engine_id: winner.engine_id.clone(),
        capabilities: winner.capabilities.clone(),
        selection_reason: if reasons.is_empty() {
            "best available".to_string()
        } else {
            reasons.join(", ")
        },
    }
}

fn catalog_alternatives(catalog: &EngineCatalog, stage: Stage) -> Vec<CatalogAlternative> {
    catalog
        .get_engines_for_stage(stage)
        .into_iter()
        .map(|entry| CatalogAlternative {
            engine_id: entry.capabilities.engine_id.clone(),
            image: entry.image.clone(),
        })
        .collect()
}

/// Select the best running engine for `stage` given `requirements`.
///
/// `running` should already be availability-filtered (see
/// [`dalston_core::EngineInstance::is_available`]) by the caller; this
/// function only applies stage/capability filtering and ranking.
pub fn select_engine(
    stage: Stage,
    requirements: &Requirements,
    running: &[EngineInstance],
    catalog: &EngineCatalog,
    user_preference: Option<&EngineId>,
) -> Result<EngineSelection, NoCapableEngine> {
    if let Some(preferred) = user_preference {
        let engine = running.iter().find(|e| &e.engine_id == preferred);
        return match engine {
            None => Err(NoCapableEngine {
                stage,
                requirements: requirements.clone(),
                candidates: vec![],
                catalog_alternatives: catalog_alternatives(catalog, stage),
            }),
            Some(engine) if !meets_requirements(&engine.capabilities, requirements) => {
                Err(NoCapableEngine {
                    stage,
                    requirements: requirements.clone(),
                    candidates: vec![CandidateMismatch {
                        engine_id: engine.engine_id.clone(),
                        reason: explain_mismatch(&engine.capabilities, requirements),
                    }],
                    catalog_alternatives: catalog_alternatives(catalog, stage),
                })
            }
            Some(engine) => Ok(EngineSelection {
                engine_id: engine.engine_id.clone(),
                capabilities: engine.capabilities.clone(),
                selection_reason: "user preference".to_string(),
            }),
        };
    }

    let candidates: Vec<&EngineInstance> = running.iter().filter(|e| e.stage == stage).collect();
    let capable: Vec<&EngineInstance> = candidates
        .iter()
        .filter(|e| meets_requirements(&e.capabilities, requirements))
        .copied()
        .collect();

    if capable.is_empty() {
        return Err(NoCapableEngine {
            stage,
            requirements: requirements.clone(),
            candidates: candidates
                .iter()
                .map(|e| CandidateMismatch {
                    engine_id: e.engine_id.clone(),
                    reason: explain_mismatch(&e.capabilities, requirements),
                })
                .collect(),
            catalog_alternatives: catalog_alternatives(catalog, stage),
        });
    }

    if capable.len() == 1 {
        let engine = capable[0];
        info!(%stage, engine_id = %engine.engine_id, reason = "only capable engine", "engine selected");
        return Ok(EngineSelection {
            engine_id: engine.engine_id.clone(),
            capabilities: engine.capabilities.clone(),
            selection_reason: "only capable engine".to_string(),
        });
    }

    let result = rank_and_select(&capable, requirements);
    info!(%stage, engine_id = %result.engine_id, reason = %result.selection_reason, candidates = candidates.len(), "engine selected");
    Ok(result)
}

/// Whether a word-level alignment stage should be inserted after transcribe:
/// the job wants word timestamps but the chosen transcriber doesn't natively
/// produce them.
pub fn should_add_alignment(wants_word_timestamps: bool, transcribe: &EngineSelection) -> bool {
    wants_word_timestamps && !transcribe.capabilities.supports_word_timestamps
}

/// Whether a diarize stage should be inserted: the job requested diarization
/// but the chosen transcriber doesn't natively produce speaker labels.
pub fn should_add_diarization(wants_diarization: bool, transcribe: &EngineSelection) -> bool {
    wants_diarization && !transcribe.capabilities.includes_diarization
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalston_core::{InstanceId, InstanceStatus, PerformanceHints};

    fn instance(engine_id: &str, stage: Stage, caps: EngineCapabilities) -> EngineInstance {
        let now = chrono::Utc::now();
        EngineInstance {
            engine_id: EngineId::new(engine_id),
            instance_id: InstanceId::new(format!("{engine_id}-inst")),
            stage,
            stream_name: format!("dalston:queue:{engine_id}"),
            status: InstanceStatus::Idle,
            current_task: None,
            last_heartbeat: now,
            registered_at: now,
            capabilities: caps,
        }
    }

    fn caps(languages: LanguageSupport, word_ts: bool, diar: bool, rtf_gpu: Option<f64>) -> EngineCapabilities {
        EngineCapabilities {
            engine_id: EngineId::new("x"),
            version: "1".into(),
            stages: vec![Stage::Transcribe],
            languages,
            supports_word_timestamps: word_ts,
            supports_streaming: false,
            includes_diarization: diar,
            supports_vocabulary: false,
            model_variants: vec![],
            requires_gpu: true,
            vram_gb: None,
            performance: PerformanceHints {
                rtf_gpu,
                rtf_cpu: None,
            },
        }
    }

    fn empty_catalog() -> EngineCatalog {
        EngineCatalog::parse("engines: {}").unwrap()
    }

    #[test]
    fn single_capable_engine_is_selected_directly() {
        let running = vec![instance(
            "parakeet",
            Stage::Transcribe,
            caps(LanguageSupport::Explicit(vec!["en".into()]), true, false, Some(0.03)),
        )];
        let result = select_engine(
            Stage::Transcribe,
            &Requirements::language_only(Some("en")),
            &running,
            &empty_catalog(),
            None,
        )
        .unwrap();
        assert_eq!(result.engine_id, EngineId::new("parakeet"));
        assert_eq!(result.selection_reason, "only capable engine");
    }

    #[test]
    fn ranking_prefers_native_word_timestamps() {
        let running = vec![
            instance("slow-basic", Stage::Transcribe, caps(LanguageSupport::Any, false, false, Some(0.8))),
            instance("fast-ts", Stage::Transcribe, caps(LanguageSupport::Any, true, false, Some(0.5))),
        ];
        let result = select_engine(
            Stage::Transcribe,
            &Requirements::default(),
            &running,
            &empty_catalog(),
            None,
        )
        .unwrap();
        assert_eq!(result.engine_id, EngineId::new("fast-ts"));
    }

    #[test]
    fn ranking_prefers_universal_language_when_language_unknown() {
        let running = vec![
            instance("single-lang", Stage::Transcribe, caps(LanguageSupport::Explicit(vec!["en".into()]), false, false, Some(0.01))),
            instance("universal", Stage::Transcribe, caps(LanguageSupport::Any, false, false, Some(0.5))),
        ];
        let result = select_engine(
            Stage::Transcribe,
            &Requirements::default(),
            &running,
            &empty_catalog(),
            None,
        )
        .unwrap();
        assert_eq!(result.engine_id, EngineId::new("universal"));
    }

    #[test]
    fn ranking_prefers_specific_language_when_language_known() {
        let running = vec![
            instance("universal", Stage::Transcribe, caps(LanguageSupport::Any, false, false, Some(0.01))),
            instance("hr-specific", Stage::Transcribe, caps(LanguageSupport::Explicit(vec!["hr".into()]), false, false, Some(0.5))),
        ];
        let result = select_engine(
            Stage::Transcribe,
            &Requirements::language_only(Some("hr")),
            &running,
            &empty_catalog(),
            None,
        )
        .unwrap();
        assert_eq!(result.engine_id, EngineId::new("hr-specific"));
    }

    #[test]
    fn no_capable_engine_reports_mismatches_and_catalog_alternatives() {
        let running = vec![instance(
            "en-only",
            Stage::Transcribe,
            caps(LanguageSupport::Explicit(vec!["en".into()]), false, false, None),
        )];
        let catalog = EngineCatalog::parse(
            "engines:\n  hr-engine:\n    stages: [transcribe]\n    languages: [hr]\n",
        )
        .unwrap();
        let err = select_engine(
            Stage::Transcribe,
            &Requirements::language_only(Some("hr")),
            &running,
            &catalog,
            None,
        )
        .unwrap_err();
        assert_eq!(err.candidates.len(), 1);
        assert!(err.candidates[0].reason.contains("language 'hr' not supported"));
        assert_eq!(err.catalog_alternatives.len(), 1);
        assert!(err.explain().contains("No running engine can handle this job"));
    }

    #[test]
    fn user_preference_for_unavailable_engine_fails() {
        let running = vec![instance(
            "en-only",
            Stage::Transcribe,
            caps(LanguageSupport::Explicit(vec!["en".into()]), false, false, None),
        )];
        let err = select_engine(
            Stage::Transcribe,
            &Requirements::default(),
            &running,
            &empty_catalog(),
            Some(&EngineId::new("does-not-exist")),
        )
        .unwrap_err();
        assert!(err.candidates.is_empty());
    }

    #[test]
    fn should_add_alignment_only_when_wanted_and_not_native() {
        let native = EngineSelection {
            engine_id: EngineId::new("x"),
            capabilities: caps(LanguageSupport::Any, true, false, None),
            selection_reason: "x".into(),
        };
        let non_native = EngineSelection {
            capabilities: caps(LanguageSupport::Any, false, false, None),
            ..native.clone()
        };
        assert!(!should_add_alignment(true, &native));
        assert!(should_add_alignment(true, &non_native));
        assert!(!should_add_alignment(false, &non_native));
    }

    #[test]
    fn should_add_diarization_only_when_wanted_and_not_native() {
        let native = EngineSelection {
            engine_id: EngineId::new("x"),
            capabilities: caps(LanguageSupport::Any, false, true, None),
            selection_reason: "x".into(),
        };
        let non_native = EngineSelection {
            capabilities: caps(LanguageSupport::Any, false, false, None),
            ..native.clone()
        };
        assert!(!should_add_diarization(true, &native));
        assert!(should_add_diarization(true, &non_native));
    }
}
