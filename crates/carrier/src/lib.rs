//! Carrier integration
//!
//! One bidirectional audio WebSocket per call plus the HTTPS webhook control
//! plane. The session makes no policy decisions: it emits an ordered event
//! channel and accepts an ordered egress channel; routing belongs to the
//! Turn Orchestrator.

pub mod control;
pub mod frames;
pub mod session;
pub mod webhook;

pub use control::{HttpCarrierControl, RecordingCarrierControl};
pub use frames::{AmdResult, CarrierEvent, Egress, WireInbound, WireOutbound};
pub use session::{CarrierSession, EgressThrottle};
pub use webhook::{WebhookEnvelope, WebhookEvent};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("carrier api: {0}")]
    Api(String),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}
