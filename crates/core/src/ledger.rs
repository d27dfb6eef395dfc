//! Playback ledger
//!
//! Tracks outstanding outbound audio to decide when the agent is truly done
//! speaking. Written by the Turn Orchestrator and the TTS playback path,
//! observed by everyone; one mutex, short updates.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// What an outstanding playback item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackKind {
    /// Response audio; implies floor ownership
    Content,
    /// Background noise; never implies floor ownership
    ComfortNoise,
    /// Dead-air check-in utterance; implies floor ownership
    CheckIn,
}

/// One outstanding carrier-side playback item.
#[derive(Debug, Clone)]
pub struct PlaybackEntry {
    pub playback_id: String,
    pub expected_end: Instant,
    pub kind: PlaybackKind,
}

#[derive(Debug)]
struct LedgerInner {
    entries: HashMap<String, PlaybackEntry>,
    /// Running wallclock estimate of when all queued audio finishes
    expected_end: Instant,
    /// TTS is mid-send of an audio chunk
    tts_sending: bool,
    /// LLM generation for the current response is in flight
    generating: bool,
    /// Response committed but its first audio chunk hasn't gone out yet
    awaiting_first_audio: bool,
}

/// Per-call playback ledger.
#[derive(Debug)]
pub struct PlaybackLedger {
    inner: Mutex<LedgerInner>,
}

impl PlaybackLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                entries: HashMap::new(),
                expected_end: Instant::now(),
                tts_sending: false,
                generating: false,
                awaiting_first_audio: false,
            }),
        }
    }

    /// Register an outstanding playback item.
    pub fn register(&self, playback_id: impl Into<String>, kind: PlaybackKind, expected_end: Instant) {
        let playback_id = playback_id.into();
        let mut inner = self.inner.lock();
        inner.entries.insert(
            playback_id.clone(),
            PlaybackEntry {
                playback_id,
                expected_end,
                kind,
            },
        );
    }

    /// Carrier confirmed a playback finished. When the last floor-owning
    /// entry completes, the expected end snaps back to now.
    pub fn complete(&self, playback_id: &str) -> Option<PlaybackEntry> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(playback_id);
        if removed.is_some() && !inner
            .entries
            .values()
            .any(|e| e.kind != PlaybackKind::ComfortNoise)
        {
            inner.expected_end = Instant::now();
        }
        removed
    }

    /// Drop every content/check-in entry (interruption). Comfort noise stays.
    /// Returns the cleared ids.
    pub fn clear_floor_entries(&self) -> Vec<String> {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .entries
            .values()
            .filter(|e| e.kind != PlaybackKind::ComfortNoise)
            .map(|e| e.playback_id.clone())
            .collect();
        for id in &ids {
            inner.entries.remove(id);
        }
        inner.expected_end = Instant::now();
        ids
    }

    /// Extend the running expected end by `secs`. Queued sentences accumulate:
    /// extension is from `max(current end, now)`, never replacement.
    pub fn extend_expected_end(&self, secs: f64) -> Instant {
        let mut inner = self.inner.lock();
        let base = inner.expected_end.max(Instant::now());
        inner.expected_end = base + Duration::from_secs_f64(secs);
        inner.expected_end
    }

    /// Snap the expected end to now (interruption, or all playbacks ended).
    pub fn reset_expected_end(&self) {
        self.inner.lock().expected_end = Instant::now();
    }

    pub fn expected_end(&self) -> Instant {
        self.inner.lock().expected_end
    }

    /// Seconds of queued audio ahead of wallclock; 0 when caught up.
    pub fn buffered_ahead_secs(&self) -> f64 {
        let end = self.inner.lock().expected_end;
        end.saturating_duration_since(Instant::now()).as_secs_f64()
    }

    pub fn set_tts_sending(&self, sending: bool) {
        self.inner.lock().tts_sending = sending;
    }

    pub fn set_generating(&self, generating: bool) {
        self.inner.lock().generating = generating;
    }

    pub fn set_awaiting_first_audio(&self, awaiting: bool) {
        self.inner.lock().awaiting_first_audio = awaiting;
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Floor rule: at least one content/check-in entry outstanding, or an
    /// audio chunk is mid-send. Never released by comfort noise alone, and
    /// never auto-released between sentences of one response.
    pub fn is_holding_floor(&self) -> bool {
        let inner = self.inner.lock();
        inner.tts_sending
            || inner
                .entries
                .values()
                .any(|e| e.kind != PlaybackKind::ComfortNoise)
    }

    /// The consolidated "agent is busy" predicate. Callers must not re-derive
    /// this from the parts.
    pub fn agent_is_active(&self) -> bool {
        let inner = self.inner.lock();
        inner.tts_sending
            || inner.generating
            || inner.awaiting_first_audio
            || inner.expected_end > Instant::now()
    }
}

impl Default for PlaybackLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_accumulates() {
        let ledger = PlaybackLedger::new();
        let first = ledger.extend_expected_end(2.0);
        let second = ledger.extend_expected_end(3.0);
        let gap = second.duration_since(first).as_secs_f64();
        assert!((gap - 3.0).abs() < 0.05, "gap={gap}");
    }

    #[test]
    fn test_comfort_noise_never_holds_floor() {
        let ledger = PlaybackLedger::new();
        ledger.register("noise-1", PlaybackKind::ComfortNoise, Instant::now());
        assert!(!ledger.is_holding_floor());

        ledger.register("pb-1", PlaybackKind::Content, Instant::now());
        assert!(ledger.is_holding_floor());
    }

    #[test]
    fn test_clear_floor_entries_keeps_noise() {
        let ledger = PlaybackLedger::new();
        ledger.register("noise-1", PlaybackKind::ComfortNoise, Instant::now());
        ledger.register("pb-1", PlaybackKind::Content, Instant::now());
        ledger.register("pb-2", PlaybackKind::CheckIn, Instant::now());

        let mut cleared = ledger.clear_floor_entries();
        cleared.sort();
        assert_eq!(cleared, vec!["pb-1", "pb-2"]);
        assert_eq!(ledger.outstanding(), 1);
        assert!(!ledger.is_holding_floor());
    }

    #[test]
    fn test_last_completion_resets_expected_end() {
        let ledger = PlaybackLedger::new();
        ledger.register("pb-1", PlaybackKind::Content, Instant::now());
        ledger.extend_expected_end(10.0);
        assert!(ledger.buffered_ahead_secs() > 9.0);

        ledger.complete("pb-1");
        assert!(ledger.buffered_ahead_secs() < 0.1);
    }

    #[test]
    fn test_agent_is_active_predicate() {
        let ledger = PlaybackLedger::new();
        assert!(!ledger.agent_is_active());

        ledger.set_generating(true);
        assert!(ledger.agent_is_active());
        ledger.set_generating(false);

        ledger.set_awaiting_first_audio(true);
        assert!(ledger.agent_is_active());
        ledger.set_awaiting_first_audio(false);

        ledger.extend_expected_end(1.0);
        assert!(ledger.agent_is_active());
        ledger.reset_expected_end();

        ledger.set_tts_sending(true);
        assert!(ledger.agent_is_active());
        assert!(ledger.is_holding_floor());
    }

    #[test]
    fn test_floor_holds_across_sentence_gaps() {
        // Mid-response: no chunk mid-send, but an entry is outstanding
        let ledger = PlaybackLedger::new();
        ledger.register("pb-1", PlaybackKind::Content, Instant::now());
        ledger.set_tts_sending(false);
        assert!(ledger.is_holding_floor());
    }
}
