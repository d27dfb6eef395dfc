//! Media-stream endpoint
//!
//! `GET /calls/:call_id/stream?agent_id=...&direction=...`: the carrier
//! connects one bidirectional audio WebSocket per call.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;

use parley_core::CallDirection;

use crate::call::start_call;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default = "default_agent")]
    pub agent_id: String,
    #[serde(default)]
    pub direction: Option<String>,
}

fn default_agent() -> String {
    "default".to_string()
}

pub async fn media_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Response, StatusCode> {
    if state.calls.get(&call_id).is_some() {
        tracing::warn!(call_id = %call_id, "duplicate media stream rejected");
        return Err(StatusCode::CONFLICT);
    }

    let direction = match params.direction.as_deref() {
        Some("outbound") => CallDirection::Outbound,
        _ => CallDirection::Inbound,
    };

    Ok(ws.on_upgrade(move |socket| {
        handle_stream(socket, state, call_id, params.agent_id, direction)
    }))
}

async fn handle_stream(
    socket: WebSocket,
    state: AppState,
    call_id: String,
    agent_id: String,
    direction: CallDirection,
) {
    match start_call(&state, socket, call_id.clone(), agent_id, direction).await {
        Ok(_) => {
            tracing::info!(call_id = %call_id, "media stream accepted");
        }
        Err(e) => {
            tracing::error!(call_id = %call_id, error = %e, "call setup failed");
            // Socket drops here; the carrier sees the close and retries or
            // fails the call on its side
        }
    }
}
