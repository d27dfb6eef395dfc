//! Core types for the parley voice-agent orchestrator
//!
//! This crate provides the foundational types shared by every other crate:
//! - Call identity and lifecycle (`CallInfo`, `TurnState`, `EndReason`)
//! - Telephony audio frames (20 ms μ-law)
//! - Append-only transcripts and the LLM conversation window
//! - Sentence units produced by streaming generation
//! - Per-turn latency checkpoints
//! - Seam traits implemented by the carrier/TTS/LLM crates

pub mod audio;
pub mod call;
pub mod error;
pub mod history;
pub mod latency;
pub mod ledger;
pub mod sentence;
pub mod traits;
pub mod transcript;

pub use audio::{AudioFrame, FRAME_BYTES, FRAME_MS, MULAW_BYTES_PER_SEC, SAMPLE_RATE_HZ};
pub use call::{CallDirection, CallId, CallInfo, EndReason, TurnState};
pub use error::{Error, Result};
pub use history::ConversationHistory;
pub use latency::{LatencyRecord, TurnTiming};
pub use ledger::{PlaybackEntry, PlaybackKind, PlaybackLedger};
pub use sentence::Sentence;
pub use traits::{
    CarrierControl, GenerationOutcome, ResponseGenerator, SpeechEvent, SpeechSynthesizer,
};
pub use transcript::{Transcript, TranscriptEntry, TranscriptRole};
