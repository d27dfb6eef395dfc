//! Call identity and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque carrier-assigned call identifier.
pub type CallId = String;

/// Direction of the call relative to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Why a call ended. Persisted verbatim in the call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Normal completion (flow reached an ending node)
    Completed,
    /// Remote party hung up
    UserHangup,
    /// Carrier transport dropped mid-call
    TransportFailure,
    /// Carrier answering-machine detection reported a machine
    VoicemailDetectedAmd,
    /// Transcript pattern matcher recognized a voicemail prompt
    VoicemailDetectedPattern,
    /// Dead-air monitor exhausted its check-in budget
    MaxCheckIns,
    /// Total call duration cap reached
    MaxDuration,
    /// Unrecoverable vendor failure after the apology utterance
    VendorFailure,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::UserHangup => "user_hangup",
            EndReason::TransportFailure => "transport_failure",
            EndReason::VoicemailDetectedAmd => "voicemail_detected_amd",
            EndReason::VoicemailDetectedPattern => "voicemail_detected_pattern",
            EndReason::MaxCheckIns => "max_check_ins",
            EndReason::MaxDuration => "max_duration",
            EndReason::VendorFailure => "vendor_failure",
        }
    }
}

/// Turn-floor state of one call. Exactly one instance per call; transitions
/// happen only inside the Turn Orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Nobody holds the floor
    #[default]
    Idle,
    /// User audio with transcript is arriving
    UserSpeaking,
    /// User turn committed, response generation in flight
    Thinking,
    /// Agent audio is playing or expected to play
    AgentSpeaking,
    /// Barge-in accepted; audio cleared, waiting for the user's full utterance
    Interrupted,
    /// Call is over; no further transitions
    Ended,
}

/// Root runtime entity for one call. Created when the carrier signals an
/// incoming/answered call, destroyed on hangup after the ledger flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    pub call_id: CallId,
    /// Agent configuration snapshot id (the snapshot itself is immutable
    /// for the call's lifetime and lives in parley-config)
    pub agent_id: String,
    pub direction: CallDirection,
    pub from: String,
    pub to: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
}

impl CallInfo {
    pub fn new(
        call_id: impl Into<CallId>,
        agent_id: impl Into<String>,
        direction: CallDirection,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            agent_id: agent_id.into(),
            direction,
            from: from.into(),
            to: to.into(),
            created_at: Utc::now(),
            started_at: None,
            answered_at: None,
            ended_at: None,
            end_reason: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn mark_answered(&mut self) {
        self.answered_at = Some(Utc::now());
    }

    pub fn mark_ended(&mut self, reason: EndReason) {
        self.ended_at = Some(Utc::now());
        self.end_reason = Some(reason);
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}
