// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accumulates the finalized utterances of one session into the transcript
//! and segment list reported in `session.end`.

use dalston_core::TranscriptSegment;

#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    segments: Vec<TranscriptSegment>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one VAD-endpointed utterance once its final transcript is in.
    pub fn add_segment(&mut self, start: f64, end: f64, text: String) {
        self.segments.push(TranscriptSegment { start, end, text });
    }

    /// Concatenation of every segment's text, space-joined, skipping blanks.
    /// Must equal the concatenation of every `transcript.final.text` emitted
    /// over the session.
    pub fn full_transcript(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Sum of each segment's own duration, i.e. speech time excluding the
    /// silence VAD trimmed between utterances.
    pub fn total_speech_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.end - s.start).sum()
    }

    pub fn segments(&self) -> Vec<TranscriptSegment> {
        self.segments.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_transcript_joins_segments_with_spaces_and_skips_blanks() {
        let mut asm = TranscriptAssembler::new();
        asm.add_segment(0.0, 2.0, "hello".to_string());
        asm.add_segment(2.5, 2.5, String::new());
        asm.add_segment(3.0, 4.5, "world".to_string());
        assert_eq!(asm.full_transcript(), "hello world");
        assert_eq!(asm.segments().len(), 3);
    }

    #[test]
    fn total_speech_duration_sums_segment_spans() {
        let mut asm = TranscriptAssembler::new();
        asm.add_segment(0.0, 2.0, "hello".to_string());
        asm.add_segment(3.0, 4.5, "world".to_string());
        assert_eq!(asm.total_speech_duration(), 3.5);
    }
}
