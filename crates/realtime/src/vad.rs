// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Voice-activity state machine. Drives the boundary between `silence` and
//! `speech` off a per-chunk speech probability, independent of whatever
//! produces that probability (energy threshold here; a learned VAD model
//! would implement the same [`SpeechDetector`] trait).

use std::time::Duration;

/// Produces a per-chunk speech probability in `[0.0, 1.0]`.
pub trait SpeechDetector: Send {
    fn speech_probability(&mut self, chunk: &[f32]) -> f32;
}

/// Simple RMS-energy detector: probability is 1.0 above threshold, 0.0 below.
/// Stands in for a learned VAD model behind the same trait.
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl SpeechDetector for EnergyVad {
    fn speech_probability(&mut self, chunk: &[f32]) -> f32 {
        if chunk.is_empty() {
            return 0.0;
        }
        let rms = (chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32).sqrt();
        if rms >= self.threshold {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Silence,
    Speech,
}

/// An action the state machine asks the caller to perform in response to a
/// transition. The machine itself never touches the network or an engine —
/// it only decides when to.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    /// Enter `speech`: the caller should emit `vad.speech_start` and prepend
    /// the lookback buffer to the accumulated audio.
    SpeechStart,
    /// Exit `speech` naturally (silence held long enough and speech duration
    /// met the minimum): caller should emit `vad.speech_end`, transcribe the
    /// accumulated audio, and reset.
    SpeechEnd,
    /// Exit `speech` but the utterance was too short to be worth
    /// transcribing: caller should discard the buffered audio silently.
    Discard,
    /// Speech has run past `max_utterance_duration`: caller should force an
    /// endpoint (transcribe what's buffered) but remain in `speech`.
    ForcedEndpoint,
}

pub struct VadConfig {
    pub threshold: f32,
    pub min_speech_duration: Duration,
    pub min_silence_duration: Duration,
    pub max_utterance_duration: Duration,
    pub lookback: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_duration: Duration::from_millis(250),
            min_silence_duration: Duration::from_millis(500),
            max_utterance_duration: Duration::from_secs(30),
            lookback: Duration::from_millis(300),
        }
    }
}

/// Per-session VAD state machine, fed one fixed-size chunk (spec.md: ~100 ms)
/// at a time via [`StateMachine::on_chunk`].
pub struct StateMachine {
    config: VadConfig,
    state: State,
    speech_elapsed: Duration,
    silence_elapsed: Duration,
}

impl StateMachine {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: State::Silence,
            speech_elapsed: Duration::ZERO,
            silence_elapsed: Duration::ZERO,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn lookback(&self) -> Duration {
        self.config.lookback
    }

    /// Advance the machine by one chunk of `chunk_duration`, given whether
    /// that chunk was classified as speech (`probability >= threshold`).
    pub fn on_chunk(&mut self, probability: f32, chunk_duration: Duration) -> Action {
        let is_speech = probability >= self.config.threshold;

        match self.state {
            State::Silence => {
                if is_speech {
                    self.state = State::Speech;
                    self.speech_elapsed = chunk_duration;
                    self.silence_elapsed = Duration::ZERO;
                    Action::SpeechStart
                } else {
                    Action::None
                }
            }
            State::Speech => {
                if is_speech {
                    self.speech_elapsed += chunk_duration;
                    self.silence_elapsed = Duration::ZERO;
                    if self.speech_elapsed >= self.config.max_utterance_duration {
                        self.speech_elapsed = Duration::ZERO;
                        return Action::ForcedEndpoint;
                    }
                    Action::None
                } else {
                    self.silence_elapsed += chunk_duration;
                    if self.silence_elapsed >= self.config.min_silence_duration {
                        let speech_was_long_enough = self.speech_elapsed >= self.config.min_speech_duration;
                        self.state = State::Silence;
                        self.speech_elapsed = Duration::ZERO;
                        self.silence_elapsed = Duration::ZERO;
                        if speech_was_long_enough {
                            Action::SpeechEnd
                        } else {
                            Action::Discard
                        }
                    } else {
                        Action::None
                    }
                }
            }
        }
    }
}
