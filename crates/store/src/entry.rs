//! Call-state entry and merge types

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bound on `recent_agent_texts`; the echo filter compares against at most
/// the last three agent utterances.
pub const RECENT_AGENT_TEXTS_CAP: usize = 3;

/// Cross-worker signals published per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlFlag {
    /// The media stream and vendor sessions are up
    SessionReady,
    /// All tracked carrier playbacks have ended
    AudioDone,
    /// AMD reported a machine; any in-flight greeting must abort
    AbortGreeting,
}

impl ControlFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlFlag::SessionReady => "session_ready",
            ControlFlag::AudioDone => "audio_done",
            ControlFlag::AbortGreeting => "abort_greeting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "session_ready" => Some(ControlFlag::SessionReady),
            "audio_done" => Some(ControlFlag::AudioDone),
            "abort_greeting" => Some(ControlFlag::AbortGreeting),
            _ => None,
        }
    }
}

/// Shared per-call runtime state. One producer per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStateEntry {
    pub user_has_spoken: bool,
    pub ai_has_responded: bool,
    pub greeting_in_flight: bool,
    pub voicemail_detected: bool,
    pub agent_generating_response: bool,
    pub current_playback_ids: HashSet<String>,
    pub agent_last_spoke_at: Option<DateTime<Utc>>,
    /// Unix epoch seconds of the expected playback end
    pub playback_expected_end: Option<f64>,
    pub interrupt_in_progress: bool,
    pub silence_greeting_triggered: bool,
    /// Last ≤3 agent utterances, oldest first
    pub recent_agent_texts: Vec<String>,
    pub comfort_noise_playback_id: Option<String>,
    pub session_ready: bool,
}

/// Field-level update. `None` means "leave this field alone".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallStateUpdate {
    pub user_has_spoken: Option<bool>,
    pub ai_has_responded: Option<bool>,
    pub greeting_in_flight: Option<bool>,
    pub voicemail_detected: Option<bool>,
    pub agent_generating_response: Option<bool>,
    pub agent_last_spoke_at: Option<DateTime<Utc>>,
    pub playback_expected_end: Option<f64>,
    pub interrupt_in_progress: Option<bool>,
    pub silence_greeting_triggered: Option<bool>,
    pub recent_agent_texts: Option<Vec<String>>,
    pub comfort_noise_playback_id: Option<Option<String>>,
    pub session_ready: Option<bool>,
}

impl CallStateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_has_spoken(mut self, v: bool) -> Self {
        self.user_has_spoken = Some(v);
        self
    }

    pub fn ai_has_responded(mut self, v: bool) -> Self {
        self.ai_has_responded = Some(v);
        self
    }

    pub fn greeting_in_flight(mut self, v: bool) -> Self {
        self.greeting_in_flight = Some(v);
        self
    }

    pub fn voicemail_detected(mut self, v: bool) -> Self {
        self.voicemail_detected = Some(v);
        self
    }

    pub fn agent_generating_response(mut self, v: bool) -> Self {
        self.agent_generating_response = Some(v);
        self
    }

    pub fn agent_last_spoke_now(mut self) -> Self {
        self.agent_last_spoke_at = Some(Utc::now());
        self
    }

    pub fn playback_expected_end(mut self, epoch_secs: f64) -> Self {
        self.playback_expected_end = Some(epoch_secs);
        self
    }

    pub fn interrupt_in_progress(mut self, v: bool) -> Self {
        self.interrupt_in_progress = Some(v);
        self
    }

    pub fn silence_greeting_triggered(mut self, v: bool) -> Self {
        self.silence_greeting_triggered = Some(v);
        self
    }

    pub fn recent_agent_texts(mut self, texts: Vec<String>) -> Self {
        self.recent_agent_texts = Some(texts);
        self
    }

    pub fn session_ready(mut self, v: bool) -> Self {
        self.session_ready = Some(v);
        self
    }

    /// Apply onto an entry, touching only the present fields.
    pub fn apply(&self, entry: &mut CallStateEntry) {
        if let Some(v) = self.user_has_spoken {
            entry.user_has_spoken = v;
        }
        if let Some(v) = self.ai_has_responded {
            entry.ai_has_responded = v;
        }
        if let Some(v) = self.greeting_in_flight {
            entry.greeting_in_flight = v;
        }
        if let Some(v) = self.voicemail_detected {
            entry.voicemail_detected = v;
        }
        if let Some(v) = self.agent_generating_response {
            entry.agent_generating_response = v;
        }
        if let Some(v) = self.agent_last_spoke_at {
            entry.agent_last_spoke_at = Some(v);
        }
        if let Some(v) = self.playback_expected_end {
            entry.playback_expected_end = Some(v);
        }
        if let Some(v) = self.interrupt_in_progress {
            entry.interrupt_in_progress = v;
        }
        if let Some(v) = self.silence_greeting_triggered {
            entry.silence_greeting_triggered = v;
        }
        if let Some(ref v) = self.recent_agent_texts {
            let mut texts = v.clone();
            if texts.len() > RECENT_AGENT_TEXTS_CAP {
                texts.drain(..texts.len() - RECENT_AGENT_TEXTS_CAP);
            }
            entry.recent_agent_texts = texts;
        }
        if let Some(ref v) = self.comfort_noise_playback_id {
            entry.comfort_noise_playback_id = v.clone();
        }
        if let Some(v) = self.session_ready {
            entry.session_ready = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_preserves_absent_fields() {
        let mut entry = CallStateEntry {
            user_has_spoken: true,
            voicemail_detected: true,
            ..Default::default()
        };

        CallStateUpdate::new().ai_has_responded(true).apply(&mut entry);

        // Fields not in the update are untouched
        assert!(entry.user_has_spoken);
        assert!(entry.voicemail_detected);
        assert!(entry.ai_has_responded);
    }

    #[test]
    fn test_recent_texts_capped_at_three() {
        let mut entry = CallStateEntry::default();
        CallStateUpdate::new()
            .recent_agent_texts(vec![
                "one".into(),
                "two".into(),
                "three".into(),
                "four".into(),
            ])
            .apply(&mut entry);

        assert_eq!(entry.recent_agent_texts, vec!["two", "three", "four"]);
    }

    #[test]
    fn test_flag_roundtrip() {
        for flag in [
            ControlFlag::SessionReady,
            ControlFlag::AudioDone,
            ControlFlag::AbortGreeting,
        ] {
            assert_eq!(ControlFlag::parse(flag.as_str()), Some(flag));
        }
        assert_eq!(ControlFlag::parse("nope"), None);
    }
}
