// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decode the negotiated wire encodings into float32 samples at the
//! session's declared sample rate. No resampling is performed here — the
//! session is configured with the rate the client is actually sending;
//! mismatches are a client-side configuration error, not something this
//! layer silently corrects.

use dalston_core::AudioEncoding;

use crate::error::RealtimeError;

/// mu-law decompression table, ITU-T G.711.
fn mulaw_to_linear(byte: u8) -> f32 {
    const BIAS: i32 = 0x84;
    let byte = !byte;
    let sign = (byte & 0x80) != 0;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;
    let mut sample = ((mantissa as i32) << 3) + BIAS;
    sample <<= exponent;
    sample -= BIAS;
    let sample = if sign { -sample } else { sample };
    (sample as f32) / 32768.0
}

/// A-law decompression, ITU-T G.711.
fn alaw_to_linear(byte: u8) -> f32 {
    let byte = byte ^ 0x55;
    let sign = (byte & 0x80) != 0;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;
    let mut sample = ((mantissa as i32) << 4) + 8;
    if exponent != 0 {
        sample += 0x100;
    }
    if exponent > 1 {
        sample <<= exponent - 1;
    }
    let sample = if sign { -sample } else { sample };
    (sample as f32) / 32768.0
}

/// Decode one binary frame into float32 samples according to `encoding`.
pub fn decode_frame(encoding: AudioEncoding, bytes: &[u8]) -> Result<Vec<f32>, RealtimeError> {
    match encoding {
        AudioEncoding::PcmS16le => {
            if bytes.len() % 2 != 0 {
                return Err(RealtimeError::InvalidAudio(
                    "pcm_s16le frame length is not a multiple of 2".to_string(),
                ));
            }
            Ok(bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
                .collect())
        }
        AudioEncoding::PcmF32le => {
            if bytes.len() % 4 != 0 {
                return Err(RealtimeError::InvalidAudio(
                    "pcm_f32le frame length is not a multiple of 4".to_string(),
                ));
            }
            Ok(bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect())
        }
        AudioEncoding::Mulaw => Ok(bytes.iter().map(|&b| mulaw_to_linear(b)).collect()),
        AudioEncoding::Alaw => Ok(bytes.iter().map(|&b| alaw_to_linear(b)).collect()),
    }
}
