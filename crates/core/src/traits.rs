//! Seam traits between the orchestrator and the vendor sessions
//!
//! The Turn Orchestrator drives concrete sessions (carrier REST control,
//! persistent TTS, streaming LLM) through these traits so its policies can be
//! exercised in isolation with recording doubles.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::ledger::PlaybackKind;
use crate::sentence::Sentence;
use crate::transcript::TranscriptEntry;

/// Carrier-side REST commands, separate from the media stream.
#[async_trait]
pub trait CarrierControl: Send + Sync {
    /// Hang up the call. The orchestrator owns the single hangup action.
    async fn hangup(&self, call_id: &str) -> Result<()>;

    /// Press DTMF digits (gatekeeper bypass).
    async fn send_dtmf(&self, call_id: &str, digits: &str) -> Result<()>;

    /// Answer an incoming call.
    async fn answer(&self, call_id: &str) -> Result<()>;
}

/// What the orchestrator needs from the persistent TTS session.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Enqueue one sentence for synthesis; returns without waiting for audio.
    /// `voice_id` differing from the live connection triggers a transparent
    /// reconnect before synthesis.
    async fn stream_sentence(&self, sentence: Sentence, voice_id: Option<String>) -> Result<bool>;

    /// Interrupt: stop in-flight sends, drain queues, clear carrier audio,
    /// reset the expected playback end to now.
    async fn clear_audio(&self) -> Result<()>;

    /// Flush the sender and playback queues without touching carrier state.
    fn cancel_pending_sentences(&self);

    /// Marks whether the LLM has finished queueing sentences for the current
    /// response. The floor can only release once this is true.
    fn set_generation_complete(&self, complete: bool);

    /// True while an audio chunk is being sent to the carrier.
    fn is_sending(&self) -> bool;

    /// Ledger kind for subsequently streamed sentences. Check-ins register
    /// as `CheckIn`; everything else is `Content`.
    fn set_playback_kind(&self, kind: PlaybackKind);
}

/// Playback-side notifications from the speech synthesizer, bridged into
/// the orchestrator's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEvent {
    /// First audio chunk of a response began sending to the carrier
    FirstChunk { sentence_num: u32 },
    SentenceDone { sentence_num: u32, mulaw_bytes: usize },
    /// Playback finished and generation is complete
    FloorReleased,
    /// clear_audio executed
    Cleared,
}

/// Outcome of one streamed generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Stream finished; all sentences delivered to the sink
    Complete {
        sentences: u32,
        /// Vendor time-to-first-token, for backfilling turn latency
        ttft_ms: Option<u64>,
    },
    /// Superseded mid-stream (sink closed or task aborted)
    Cancelled,
    /// The vendor returned no usable text
    Empty,
}

/// Streaming response generation: sentences are pushed into `sink` as soon as
/// each is complete, long before the stream finishes.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[TranscriptEntry],
        user_turn: &str,
        sink: mpsc::Sender<Sentence>,
    ) -> Result<GenerationOutcome>;
}
