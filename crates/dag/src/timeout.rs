// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task timeout estimation from engine RTF and audio duration.

/// Minimum timeout for any task, regardless of duration estimate.
pub const MIN_TIMEOUT_SECONDS: u64 = 60;
/// Fallback RTF when an engine declares no performance hints at all.
const DEFAULT_RTF: f64 = 1.0;
/// Multiplies the RTF-estimated processing time to absorb cold starts, I/O,
/// and queue wait variance.
const SAFETY_FACTOR: f64 = 3.0;
/// Timeout used when duration is unknown (e.g. the prepare stage, before
/// the audio has even been decoded).
const UNKNOWN_DURATION_TIMEOUT_SECONDS: u64 = MIN_TIMEOUT_SECONDS * 5;

/// `audio_duration_s * rtf * 3`, floored at [`MIN_TIMEOUT_SECONDS`]. When
/// duration is unknown, returns a flat 5-minute timeout.
pub fn calculate_task_timeout(audio_duration_s: Option<f64>, rtf_gpu: Option<f64>, rtf_cpu: Option<f64>, use_gpu: bool) -> u64 {
    let Some(duration) = audio_duration_s.filter(|d| *d > 0.0) else {
        return UNKNOWN_DURATION_TIMEOUT_SECONDS;
    };

    let rtf = if use_gpu {
        rtf_gpu.or(rtf_cpu)
    } else {
        rtf_cpu.or(rtf_gpu)
    }
    .filter(|r| *r > 0.0)
    .unwrap_or(DEFAULT_RTF);

    let estimated = duration * rtf * SAFETY_FACTOR;
    (estimated as u64).max(MIN_TIMEOUT_SECONDS)
}
