//! Per-turn latency checkpoints
//!
//! Each user turn records the STT→LLM→TTS→carrier path with named
//! checkpoints. The operator-facing figure is TTFS: the time until the first
//! chunk starts playing, not total TTS generation, so the TTS component is
//! capped at 500 ms.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// TTS contribution cap in the TTFS figure (ms)
const TTFS_TTS_CAP_MS: u64 = 500;

/// Checkpoint clock for one turn. Millisecond deltas are derived against
/// `user_audio_end` when the record is finalized.
#[derive(Debug, Clone)]
pub struct TurnTiming {
    pub user_audio_end: Option<Instant>,
    pub stt_transcript_received: Option<Instant>,
    pub llm_request_start: Option<Instant>,
    pub llm_first_token: Option<Instant>,
    pub llm_complete: Option<Instant>,
    pub tts_request_start: Option<Instant>,
    pub tts_first_chunk: Option<Instant>,
    pub tts_audio_sent: Option<Instant>,
}

impl TurnTiming {
    pub fn new() -> Self {
        Self {
            user_audio_end: None,
            stt_transcript_received: None,
            llm_request_start: None,
            llm_first_token: None,
            llm_complete: None,
            tts_request_start: None,
            tts_first_chunk: None,
            tts_audio_sent: None,
        }
    }

    pub fn mark_user_audio_end(&mut self) {
        self.user_audio_end.get_or_insert_with(Instant::now);
    }

    pub fn mark_stt_transcript_received(&mut self) {
        self.stt_transcript_received = Some(Instant::now());
    }

    pub fn mark_llm_request_start(&mut self) {
        self.llm_request_start = Some(Instant::now());
    }

    pub fn mark_llm_first_token(&mut self) {
        self.llm_first_token.get_or_insert_with(Instant::now);
    }

    pub fn mark_llm_complete(&mut self) {
        self.llm_complete = Some(Instant::now());
    }

    pub fn mark_tts_request_start(&mut self) {
        self.tts_request_start.get_or_insert_with(Instant::now);
    }

    pub fn mark_tts_first_chunk(&mut self) {
        self.tts_first_chunk.get_or_insert_with(Instant::now);
    }

    pub fn mark_tts_audio_sent(&mut self) {
        self.tts_audio_sent = Some(Instant::now());
    }

    fn delta_ms(from: Option<Instant>, to: Option<Instant>) -> Option<u64> {
        match (from, to) {
            (Some(a), Some(b)) if b >= a => Some(b.duration_since(a).as_millis() as u64),
            _ => None,
        }
    }

    /// STT component: end of user audio until the committed transcript.
    pub fn stt_ms(&self) -> Option<u64> {
        Self::delta_ms(self.user_audio_end, self.stt_transcript_received)
    }

    /// LLM component: request start until first token.
    pub fn llm_ms(&self) -> Option<u64> {
        Self::delta_ms(self.llm_request_start, self.llm_first_token)
    }

    /// TTS component: request start until first audio chunk.
    pub fn tts_ms(&self) -> Option<u64> {
        Self::delta_ms(self.tts_request_start, self.tts_first_chunk)
    }

    /// Time To First Speech: `stt + llm + min(tts, 500 ms)`.
    pub fn ttfs_ms(&self) -> Option<u64> {
        Some(self.stt_ms()? + self.llm_ms()? + self.tts_ms()?.min(TTFS_TTS_CAP_MS))
    }

    /// Snapshot into the persisted structured form.
    pub fn finalize(&self) -> LatencyRecord {
        LatencyRecord {
            stt_ms: self.stt_ms(),
            llm_first_token_ms: self.llm_ms(),
            llm_total_ms: Self::delta_ms(self.llm_request_start, self.llm_complete),
            tts_first_chunk_ms: self.tts_ms(),
            tts_audio_sent_ms: Self::delta_ms(self.tts_request_start, self.tts_audio_sent),
            ttfs_ms: self.ttfs_ms(),
        }
    }
}

impl Default for TurnTiming {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured latency fields appended to the persisted call log, one per turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LatencyRecord {
    pub stt_ms: Option<u64>,
    pub llm_first_token_ms: Option<u64>,
    pub llm_total_ms: Option<u64>,
    pub tts_first_chunk_ms: Option<u64>,
    pub tts_audio_sent_ms: Option<u64>,
    pub ttfs_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timing_with_offsets(stt: u64, llm: u64, tts: u64) -> TurnTiming {
        let base = Instant::now();
        let mut t = TurnTiming::new();
        t.user_audio_end = Some(base);
        t.stt_transcript_received = Some(base + Duration::from_millis(stt));
        t.llm_request_start = Some(base + Duration::from_millis(stt));
        t.llm_first_token = Some(base + Duration::from_millis(stt + llm));
        t.tts_request_start = Some(base + Duration::from_millis(stt + llm));
        t.tts_first_chunk = Some(base + Duration::from_millis(stt + llm + tts));
        t
    }

    #[test]
    fn test_ttfs_sums_components() {
        let t = timing_with_offsets(120, 300, 200);
        assert_eq!(t.ttfs_ms(), Some(620));
    }

    #[test]
    fn test_ttfs_caps_tts_component() {
        // 900 ms of TTS counts as 500 in the operator figure
        let t = timing_with_offsets(100, 200, 900);
        assert_eq!(t.ttfs_ms(), Some(800));
    }

    #[test]
    fn test_incomplete_turn_yields_none() {
        let t = TurnTiming::new();
        assert_eq!(t.ttfs_ms(), None);
    }
}
