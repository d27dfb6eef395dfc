//! Streaming speech-to-text
//!
//! One vendor WebSocket per call. Audio flows in through a bounded channel
//! (backpressure), transcripts and endpoint signals flow out as an ordered
//! event stream. Transport failures trigger up to three immediate reconnect
//! attempts; vendor tokens buffered before a reconnect are lost, which is
//! acceptable for this pipeline.

pub mod provider;
pub mod sanitize;
pub mod session;

pub use provider::{RawSttMessage, RawSttKind, VendorAdapter};
pub use sanitize::is_garbled_echo;
pub use session::{SttEvent, SttSession};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,

    #[error("audio channel closed")]
    AudioChannelClosed,

    #[error("codec: {0}")]
    Codec(#[from] parley_codec::CodecError),
}
