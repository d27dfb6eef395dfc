//! Shared error type

use thiserror::Error;

/// Errors that cross crate boundaries.
///
/// Component-local failures (vendor reconnects, retries) are handled inside
/// their own crates and never reach this type; what propagates here is what
/// the orchestrator needs to act on.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or wrongly sized audio data
    #[error("audio: {0}")]
    Audio(String),

    /// Carrier transport is gone; the call is lost
    #[error("carrier transport: {0}")]
    Transport(String),

    /// A vendor session failed after exhausting its own recovery
    #[error("vendor {vendor}: {message}")]
    Vendor { vendor: &'static str, message: String },

    /// Call-state store failure
    #[error("store: {0}")]
    Store(String),

    /// Operation exceeded its deadline
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Superseded by a newer turn; a normal completion path, not a failure
    #[error("cancelled")]
    Cancelled,

    /// Channel to a per-call task closed (task exited or call tore down)
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Convenience constructor for vendor errors.
    pub fn vendor(vendor: &'static str, message: impl Into<String>) -> Self {
        Self::Vendor {
            vendor,
            message: message.into(),
        }
    }
}
