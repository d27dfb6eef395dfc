//! HTTP control plane
//!
//! Carrier webhooks may land on any worker. Events for calls whose session
//! lives here are injected into the call's ordered event stream; everything
//! else is applied through the shared store so the session-holding worker
//! observes the effect.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use parley_carrier::{CarrierEvent, WebhookEnvelope, WebhookEvent};
use parley_store::{CallStateUpdate, ControlFlag};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_calls": state.calls.count(),
        "distributed_store": state.store.is_distributed(),
    }))
}

/// `POST /webhooks/carrier`. Always answers `{"status":"ok"}` on parseable
/// input; non-2xx would make the carrier retry.
pub async fn carrier_webhook(
    State(state): State<AppState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> Json<Value> {
    let event = envelope.data;
    let call_id = event.call_id().to_string();
    tracing::debug!(call_id = %call_id, event = ?event, "carrier webhook");

    if let Some(runtime) = state.calls.get(&call_id) {
        // Session is co-located: join the ordered event stream
        if let Some(mapped) = to_carrier_event(&event) {
            if runtime.injector.send(mapped).await.is_err() {
                tracing::warn!(call_id = %call_id, "event injection failed, call tearing down");
            }
        }
    }

    // Cross-worker effects always go through the shared store, whether or
    // not the session is local; the store operations are idempotent.
    apply_shared_effects(&state, &call_id, &event).await;

    Json(json!({ "status": "ok" }))
}

fn to_carrier_event(event: &WebhookEvent) -> Option<CarrierEvent> {
    match event {
        WebhookEvent::CallAnswered { .. } => Some(CarrierEvent::Answered),
        WebhookEvent::MachineDetectionEnded { result, .. } => {
            Some(CarrierEvent::MachineDetection { result: *result })
        }
        WebhookEvent::PlaybackStarted { playback_id, .. } => Some(CarrierEvent::PlaybackStarted {
            playback_id: playback_id.clone(),
        }),
        WebhookEvent::PlaybackEnded { playback_id, .. } => Some(CarrierEvent::PlaybackEnded {
            playback_id: playback_id.clone(),
        }),
        WebhookEvent::Hangup { hangup_cause, .. } => Some(CarrierEvent::Hangup {
            cause: hangup_cause.clone(),
        }),
        // Initiation and recordings don't enter the media event stream
        WebhookEvent::CallInitiated { .. } | WebhookEvent::RecordingSaved { .. } => None,
    }
}

async fn apply_shared_effects(state: &AppState, call_id: &str, event: &WebhookEvent) {
    match event {
        WebhookEvent::CallInitiated { direction, .. } => {
            // Inbound calls are answered over REST; the media stream follows
            if direction.as_deref() != Some("outbound") {
                if let Err(e) = state.control.answer(call_id).await {
                    tracing::warn!(call_id = %call_id, error = %e, "answer failed");
                }
            }
        }
        WebhookEvent::MachineDetectionEnded { result, .. } => {
            if matches!(result, parley_carrier::AmdResult::Machine) {
                let _ = state
                    .store
                    .merge(call_id, CallStateUpdate::new().voicemail_detected(true))
                    .await;
                let _ = state
                    .store
                    .publish_flag(call_id, ControlFlag::AbortGreeting)
                    .await;
            }
        }
        WebhookEvent::PlaybackEnded { playback_id, .. } => {
            match state.store.remove_playback_id(call_id, playback_id).await {
                Ok(0) => {
                    let _ = state.store.publish_flag(call_id, ControlFlag::AudioDone).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(call_id = %call_id, error = %e, "playback untrack failed")
                }
            }
        }
        WebhookEvent::PlaybackStarted { playback_id, .. } => {
            let _ = state.store.add_playback_id(call_id, playback_id).await;
        }
        WebhookEvent::RecordingSaved { recording_urls, .. } => {
            tracing::info!(call_id = %call_id, urls = recording_urls.len(), "recording saved");
        }
        WebhookEvent::CallAnswered { .. } | WebhookEvent::Hangup { .. } => {}
    }
}
