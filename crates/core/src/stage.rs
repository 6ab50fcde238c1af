// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline stage identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A coarse pipeline step. Per-channel fan-out (e.g. `transcribe_ch0`) is
/// represented by [`crate::task::Task::channel`], not by additional variants,
/// so the DAG builder stays a closed match over a small enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prepare,
    Transcribe,
    Align,
    Diarize,
    PiiDetect,
    AudioRedact,
    Merge,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Prepare,
        Stage::Transcribe,
        Stage::Align,
        Stage::Diarize,
        Stage::PiiDetect,
        Stage::AudioRedact,
        Stage::Merge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::Transcribe => "transcribe",
            Stage::Align => "align",
            Stage::Diarize => "diarize",
            Stage::PiiDetect => "pii_detect",
            Stage::AudioRedact => "audio_redact",
            Stage::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepare" => Ok(Stage::Prepare),
            "transcribe" => Ok(Stage::Transcribe),
            "align" => Ok(Stage::Align),
            "diarize" => Ok(Stage::Diarize),
            "pii_detect" => Ok(Stage::PiiDetect),
            "audio_redact" => Ok(Stage::AudioRedact),
            "merge" => Ok(Stage::Merge),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for stage in Stage::ALL {
            let parsed: Stage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn rejects_unknown_stage() {
        assert!("transmogrify".parse::<Stage>().is_err());
    }
}
