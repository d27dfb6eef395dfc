//! Audio codec primitives
//!
//! Pure functions over byte buffers: G.711 μ-law ↔ 16-bit linear PCM,
//! stateful linear resampling, and 20 ms framing for carrier egress.
//! No I/O, no allocation beyond the output buffers.

pub mod frame;
pub mod mulaw;
pub mod resample;

pub use frame::{frame_mulaw, frame_mulaw_padded, MULAW_SILENCE};
pub use mulaw::{mulaw_decode_sample, mulaw_encode_sample, mulaw_to_pcm16, pcm16_to_mulaw};
pub use resample::LinearResampler;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// PCM16 byte buffers must contain whole little-endian samples
    #[error("odd PCM16 byte length: {0}")]
    OddPcmLength(usize),

    /// Frame size and sample rates must be non-zero
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

pub type Result<T> = std::result::Result<T, CodecError>;
