// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connection handling shared by the router (steer mode) and the
//! real-time worker: parse the connection's query-string parameters into a
//! [`SessionConfig`]/[`VadConfig`] pair, then drive a [`Session`] from the
//! socket until the client disconnects or sends `end`.

use std::collections::HashMap;
use std::time::Duration;

use dalston_core::{AudioEncoding, ClientMessage, EngineId, SessionConfig, SessionId};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::RealtimeError;
use crate::session::Session;
use crate::vad::VadConfig;

/// Parse the query string of a real-time connection URI into the session's
/// declared configuration. Unrecognized parameters are ignored rather than
/// rejected, so older clients stay compatible with new optional knobs.
pub fn parse_connection_params(query: &str) -> (SessionId, SessionConfig, VadConfig) {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    let get = |key: &str| params.get(key).cloned();
    let get_f64 = |key: &str, default: f64| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);
    let get_u32 = |key: &str, default: u32| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);
    let get_bool = |key: &str, default: bool| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);

    let session_id = get("session_id")
        .map(SessionId::new)
        .unwrap_or_else(|| SessionId::new(uuid::Uuid::new_v4().to_string()));

    let encoding = match get("encoding").as_deref() {
        Some("pcm_f32le") => AudioEncoding::PcmF32le,
        Some("mulaw") => AudioEncoding::Mulaw,
        Some("alaw") => AudioEncoding::Alaw,
        _ => AudioEncoding::PcmS16le,
    };

    let config = SessionConfig {
        language: get("language").unwrap_or_else(|| "auto".to_string()),
        engine_id: get("model").map(EngineId::new),
        word_timestamps: get_bool("word_timestamps", false),
        vocabulary: get("vocabulary")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default(),
        sample_rate: get_u32("sample_rate", 16_000),
        encoding,
        interim_results: get_bool("interim_results", true),
    };

    let enable_vad = get_bool("enable_vad", true);
    let vad_config = VadConfig {
        threshold: get_f64("vad_threshold", 0.5) as f32,
        min_speech_duration: Duration::from_millis(get_u32("min_speech_duration_ms", 250) as u64),
        min_silence_duration: Duration::from_millis(get_u32("min_silence_duration_ms", 500) as u64),
        max_utterance_duration: Duration::from_secs(get_u32("max_utterance_duration", 30) as u64),
        // With VAD disabled, treat the whole stream as one continuous
        // utterance: silence never ends it (a day-long duration is as close
        // to "never" as a bounded config value gets).
        lookback: if enable_vad {
            Duration::from_millis(300)
        } else {
            Duration::ZERO
        },
    };
    let vad_config = if enable_vad {
        vad_config
    } else {
        VadConfig {
            min_silence_duration: Duration::from_secs(86_400),
            ..vad_config
        }
    };

    (session_id, config, vad_config)
}

/// Drive one session end to end over an already-upgraded WebSocket. Returns
/// once the client disconnects, sends `end`, or the socket errors.
pub async fn serve_session<S>(
    ws: WebSocketStream<S>,
    mut session: Session,
) -> Result<(), RealtimeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut sink, mut stream) = ws.split();

    send(&mut sink, &session.begin_message()).await?;

    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| RealtimeError::InvalidMessage(e.to_string()))?;
        let outgoing = match message {
            Message::Binary(bytes) => session.on_audio_frame(&bytes).await?,
            Message::Text(text) => {
                let client_message: ClientMessage = serde_json::from_str(&text)
                    .map_err(|e| RealtimeError::InvalidMessage(e.to_string()))?;
                let is_end = matches!(client_message, ClientMessage::End);
                let out = session.on_client_message(client_message).await?;
                if is_end {
                    for msg in &out {
                        send(&mut sink, msg).await?;
                    }
                    break;
                }
                out
            }
            Message::Close(_) => break,
            _ => Vec::new(),
        };

        for msg in &outgoing {
            send(&mut sink, msg).await?;
        }
    }

    let _ = sink.close().await;
    Ok(())
}

async fn send<S>(
    sink: &mut futures_util::stream::SplitSink<WebSocketStream<S>, Message>,
    message: &dalston_core::ServerMessage,
) -> Result<(), RealtimeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let text = serde_json::to_string(message)?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| RealtimeError::InvalidMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_query_params() {
        let (session_id, config, vad) = parse_connection_params(
            "session_id=abc&language=hr&encoding=pcm_f32le&sample_rate=8000&word_timestamps=true&vad_threshold=0.3&min_speech_duration_ms=100",
        );
        assert_eq!(session_id.as_str(), "abc");
        assert_eq!(config.language, "hr");
        assert_eq!(config.encoding, AudioEncoding::PcmF32le);
        assert_eq!(config.sample_rate, 8_000);
        assert!(config.word_timestamps);
        assert!((vad.threshold - 0.3).abs() < 0.001);
        assert_eq!(vad.min_speech_duration, Duration::from_millis(100));
    }

    #[test]
    fn disabling_vad_yields_an_effectively_unbounded_silence_threshold() {
        let (_, _, vad) = parse_connection_params("enable_vad=false");
        assert!(vad.min_silence_duration > Duration::from_secs(3600));
    }

    #[test]
    fn missing_session_id_is_generated() {
        let (session_id, _, _) = parse_connection_params("");
        assert!(!session_id.as_str().is_empty());
    }
}
