//! Parley server
//!
//! HTTP control plane (carrier webhooks, health, metrics) and the per-call
//! bidirectional media WebSocket. Each accepted stream builds an independent
//! task set: carrier reader/writer, STT sender/receiver, LLM generator, TTS
//! sender/receiver/playback, orchestrator loop, dead-air monitor, and the
//! optional comfort-noise emitter.

pub mod call;
pub mod http;
pub mod state;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("call setup: {0}")]
    CallSetup(String),

    #[error("capacity: {0}")]
    Capacity(String),

    #[error("store: {0}")]
    Store(#[from] parley_store::StoreError),

    #[error("persistence: {0}")]
    Persistence(#[from] parley_persistence::PersistenceError),
}

/// Build the router with all endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/webhooks/carrier", post(http::carrier_webhook))
        .route("/calls/:call_id/stream", get(ws::media_stream))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
