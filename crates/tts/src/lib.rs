//! Persistent text-to-speech
//!
//! One long-lived vendor connection per call, reused across turns; opening
//! a connection per sentence costs hundreds of milliseconds that this
//! pipeline cannot afford. The session keeps the link warm with keep-alives,
//! streams sentences without blocking the caller, and owns the interrupt
//! path that makes barge-in feel instant.

pub mod comfort_noise;
pub mod maya;
pub mod session;
pub mod vendor;

pub use comfort_noise::ComfortNoiseEmitter;
pub use session::{PersistentTtsSession, TtsEvent};
pub use vendor::{VendorMessage, VendorProtocol};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("vendor: {0}")]
    Vendor(String),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("codec: {0}")]
    Codec(#[from] parley_codec::CodecError),

    #[error("session closed")]
    Closed,
}
