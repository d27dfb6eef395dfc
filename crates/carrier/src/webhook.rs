//! Carrier webhook control plane
//!
//! HTTPS-delivered call events. Any worker may receive any event for any
//! call; cross-worker effects are applied through the shared call-state
//! store, co-located effects are injected into the call's event stream.

use serde::{Deserialize, Serialize};

use crate::frames::AmdResult;

/// Envelope the carrier posts: `{"data": {"event_type": ..., "payload": ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub data: WebhookEvent,
}

/// Normalized webhook events the core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum WebhookEvent {
    #[serde(rename = "call.initiated")]
    CallInitiated {
        call_control_id: String,
        #[serde(default)]
        direction: Option<String>,
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },
    #[serde(rename = "call.answered")]
    CallAnswered { call_control_id: String },
    #[serde(rename = "call.machine.detection.ended")]
    MachineDetectionEnded {
        call_control_id: String,
        result: AmdResult,
    },
    #[serde(rename = "call.playback.started")]
    PlaybackStarted {
        call_control_id: String,
        #[serde(default)]
        playback_id: String,
    },
    #[serde(rename = "call.playback.ended")]
    PlaybackEnded {
        call_control_id: String,
        #[serde(default)]
        playback_id: String,
    },
    #[serde(rename = "call.hangup")]
    Hangup {
        call_control_id: String,
        #[serde(default)]
        hangup_cause: String,
    },
    #[serde(rename = "call.recording.saved")]
    RecordingSaved {
        call_control_id: String,
        #[serde(default)]
        recording_urls: Vec<String>,
    },
}

impl WebhookEvent {
    /// The call this event belongs to.
    pub fn call_id(&self) -> &str {
        match self {
            WebhookEvent::CallInitiated { call_control_id, .. }
            | WebhookEvent::CallAnswered { call_control_id }
            | WebhookEvent::MachineDetectionEnded { call_control_id, .. }
            | WebhookEvent::PlaybackStarted { call_control_id, .. }
            | WebhookEvent::PlaybackEnded { call_control_id, .. }
            | WebhookEvent::Hangup { call_control_id, .. }
            | WebhookEvent::RecordingSaved { call_control_id, .. } => call_control_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amd_webhook() {
        let json = r#"{"data":{"event_type":"call.machine.detection.ended","payload":{"call_control_id":"cc-1","result":"machine"}}}"#;
        let env: WebhookEnvelope = serde_json::from_str(json).unwrap();
        match env.data {
            WebhookEvent::MachineDetectionEnded { result, .. } => {
                assert_eq!(result, AmdResult::Machine)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_playback_ended() {
        let json = r#"{"data":{"event_type":"call.playback.ended","payload":{"call_control_id":"cc-2","playback_id":"pb-7"}}}"#;
        let env: WebhookEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.data.call_id(), "cc-2");
        assert!(matches!(
            env.data,
            WebhookEvent::PlaybackEnded { playback_id, .. } if playback_id == "pb-7"
        ));
    }

    #[test]
    fn test_parse_recording_saved() {
        let json = r#"{"data":{"event_type":"call.recording.saved","payload":{"call_control_id":"cc-3","recording_urls":["https://rec/1.wav"]}}}"#;
        let env: WebhookEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(env.data, WebhookEvent::RecordingSaved { .. }));
    }
}
