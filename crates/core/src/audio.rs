//! Telephony audio frame type
//!
//! The carrier speaks 8 kHz mono μ-law in 20 ms chunks: 160 bytes per frame,
//! 8000 bytes per second. Frames are immutable after construction and carry a
//! monotonically increasing sequence number assigned by their producer.

use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};

/// Telephony sample rate (Hz)
pub const SAMPLE_RATE_HZ: u32 = 8000;

/// Frame duration (ms)
pub const FRAME_MS: u32 = 20;

/// Bytes per 20 ms μ-law frame (one byte per sample at 8 kHz)
pub const FRAME_BYTES: usize = 160;

/// μ-law data rate: one byte per sample
pub const MULAW_BYTES_PER_SEC: u64 = 8000;

/// One 20 ms frame of 8 kHz mono μ-law audio.
#[derive(Clone)]
pub struct AudioFrame {
    payload: Arc<[u8]>,
    sequence: u64,
    received_at: Instant,
}

impl AudioFrame {
    /// Create a frame from exactly [`FRAME_BYTES`] of μ-law data.
    ///
    /// Wrongly sized payloads are rejected; callers drop the frame and bump
    /// their bad-frame counter.
    pub fn new(payload: Vec<u8>, sequence: u64) -> Result<Self> {
        if payload.len() != FRAME_BYTES {
            return Err(Error::Audio(format!(
                "expected {} byte frame, got {}",
                FRAME_BYTES,
                payload.len()
            )));
        }
        Ok(Self {
            payload: payload.into(),
            sequence,
            received_at: Instant::now(),
        })
    }

    /// μ-law payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Producer-assigned sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When this frame was constructed.
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// A silent frame (μ-law silence is 0xFF).
    pub fn silence(sequence: u64) -> Self {
        Self {
            payload: vec![0xFF; FRAME_BYTES].into(),
            sequence,
            received_at: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("sequence", &self.sequence)
            .field("bytes", &self.payload.len())
            .finish()
    }
}

/// Playback duration of a μ-law byte count, in seconds.
pub fn mulaw_duration_secs(byte_len: usize) -> f64 {
    byte_len as f64 / MULAW_BYTES_PER_SEC as f64
}
