//! Media-stream wire frames and normalized events
//!
//! The carrier frames JSON over WebSocket text messages, tagged by `event`.
//! Inbound media payloads are base64 μ-law; outbound media must respect
//! 20 ms pacing.

use serde::{Deserialize, Serialize};

use parley_core::AudioFrame;

/// Answering-machine detection verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmdResult {
    Human,
    Machine,
    NotSure,
}

/// Inbound wire frames as they appear on the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireInbound {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        start: StartMeta,
    },
    Media {
        media: MediaPayload,
    },
    Stop {},
    #[serde(rename = "playback.started")]
    PlaybackStarted {
        #[serde(default)]
        playback_id: String,
    },
    #[serde(rename = "playback.ended")]
    PlaybackEnded {
        #[serde(default)]
        playback_id: String,
    },
    #[serde(rename = "machine.detection.ended")]
    MachineDetectionEnded {
        result: AmdResult,
    },
    Hangup {
        #[serde(default)]
        cause: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartMeta {
    pub call_control_id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// base64 μ-law, 8 kHz mono, ≤20 ms
    pub payload: String,
}

/// Outbound wire frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireOutbound {
    Media { media: OutboundMedia },
    /// Drop all queued outbound audio at the carrier
    Clear,
    Dtmf { digit: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl WireOutbound {
    pub fn media(mulaw: &[u8]) -> Self {
        use base64::Engine as _;
        WireOutbound::Media {
            media: OutboundMedia {
                payload: base64::engine::general_purpose::STANDARD.encode(mulaw),
            },
        }
    }
}

/// Normalized events the session hands to the orchestrator, in arrival
/// order. Webhook-delivered control events are injected into the same
/// channel by the server so consumers see one ordered stream.
#[derive(Debug, Clone)]
pub enum CarrierEvent {
    Connected,
    Started {
        call_id: String,
        from: Option<String>,
        to: Option<String>,
    },
    /// Injected from the `call.answered` webhook
    Answered,
    Audio(AudioFrame),
    PlaybackStarted {
        playback_id: String,
    },
    PlaybackEnded {
        playback_id: String,
    },
    MachineDetection {
        result: AmdResult,
    },
    Hangup {
        cause: String,
    },
    Stopped,
}

/// Ordered egress commands consumed by the single writer task.
#[derive(Debug, Clone)]
pub enum Egress {
    /// One ≤20 ms μ-law frame, sent in order at the pacing cadence
    Media(Vec<u8>),
    /// Emitted as repeated `clear` wire frames to mask carrier race windows
    Clear,
    Dtmf(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_frame() {
        let json = r#"{"event":"start","start":{"call_control_id":"cc-123","from":"+15550100","to":"+15550199"}}"#;
        let frame: WireInbound = serde_json::from_str(json).unwrap();
        match frame {
            WireInbound::Start { start } => {
                assert_eq!(start.call_control_id, "cc-123");
                assert_eq!(start.from.as_deref(), Some("+15550100"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_frame() {
        let json = r#"{"event":"media","media":{"payload":"AAAA"}}"#;
        assert!(matches!(
            serde_json::from_str::<WireInbound>(json).unwrap(),
            WireInbound::Media { .. }
        ));
    }

    #[test]
    fn test_parse_dotted_event_names() {
        let json = r#"{"event":"machine.detection.ended","result":"machine"}"#;
        match serde_json::from_str::<WireInbound>(json).unwrap() {
            WireInbound::MachineDetectionEnded { result } => {
                assert_eq!(result, AmdResult::Machine)
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let json = r#"{"event":"playback.ended","playback_id":"pb-9"}"#;
        assert!(matches!(
            serde_json::from_str::<WireInbound>(json).unwrap(),
            WireInbound::PlaybackEnded { .. }
        ));
    }

    #[test]
    fn test_outbound_media_roundtrip() {
        use base64::Engine as _;
        let frame = WireOutbound::media(&[0xFFu8; 160]);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""event":"media"#));
        let payload = serde_json::from_str::<serde_json::Value>(&json).unwrap()["media"]["payload"]
            .as_str()
            .unwrap()
            .to_string();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        assert_eq!(decoded, vec![0xFFu8; 160]);
    }

    #[test]
    fn test_clear_serialization() {
        let json = serde_json::to_string(&WireOutbound::Clear).unwrap();
        assert_eq!(json, r#"{"event":"clear"}"#);
    }
}
