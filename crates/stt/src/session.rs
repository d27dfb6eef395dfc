//! Per-call STT session
//!
//! Owns the vendor socket. Audio arrives on a bounded channel and is encoded
//! per vendor; transcripts and endpoint signals leave as an ordered event
//! stream after sanitation.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use parley_config::constants::vendors::STT_RECONNECT_ATTEMPTS;
use parley_config::AgentConfig;
use parley_core::AudioFrame;

use crate::provider::{RawSttKind, RawSttMessage, VendorAdapter};
use crate::sanitize::is_garbled_echo;
use crate::SttError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events surfaced to the orchestrator, in vendor order.
#[derive(Debug, Clone)]
pub enum SttEvent {
    Partial { text: String, received_at: Instant },
    Final { text: String, received_at: Instant },
    /// Zero-width signal: the user appears to have finished their turn
    Endpoint,
}

/// Handle to one call's STT session.
pub struct SttSession {
    audio_tx: mpsc::Sender<AudioFrame>,
    task: JoinHandle<()>,
}

impl SttSession {
    /// Open the vendor stream. The initial connect must succeed; later
    /// transport failures reconnect transparently.
    pub async fn connect(
        config: Arc<AgentConfig>,
        api_key: String,
    ) -> Result<(Self, mpsc::Receiver<SttEvent>), SttError> {
        let mut adapter = VendorAdapter::new(config.stt_provider);
        let ws = connect_vendor(&mut adapter, &config, &api_key).await?;

        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(256);

        let task = tokio::spawn(run_session(
            ws, adapter, config, api_key, audio_rx, events_tx,
        ));

        Ok((Self { audio_tx, task }, events_rx))
    }

    /// Enqueue one frame. The bounded channel provides backpressure when the
    /// vendor link is slow.
    pub async fn send_audio(&self, frame: AudioFrame) -> Result<(), SttError> {
        self.audio_tx
            .send(frame)
            .await
            .map_err(|_| SttError::AudioChannelClosed)
    }

    /// Clone of the bounded audio channel, for callers that route frames
    /// without holding the session.
    pub fn audio_sender(&self) -> mpsc::Sender<AudioFrame> {
        self.audio_tx.clone()
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn connect_vendor(
    adapter: &mut VendorAdapter,
    config: &AgentConfig,
    api_key: &str,
) -> Result<WsStream, SttError> {
    let url = adapter.url(config);
    let mut request = url
        .into_client_request()
        .map_err(|e| SttError::Connect(e.to_string()))?;

    let (header, value) = adapter.auth_header(api_key);
    let value = value
        .parse()
        .map_err(|_| SttError::Connect("invalid auth header".to_string()))?;
    request.headers_mut().insert(header, value);

    let (ws, _) = connect_async(request)
        .await
        .map_err(|e| SttError::Connect(e.to_string()))?;

    tracing::info!(provider = ?adapter.provider(), "stt session connected");
    Ok(ws)
}

async fn run_session(
    mut ws: WsStream,
    mut adapter: VendorAdapter,
    config: Arc<AgentConfig>,
    api_key: String,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    events_tx: mpsc::Sender<SttEvent>,
) {
    'connection: loop {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                maybe_frame = audio_rx.recv() => match maybe_frame {
                    Some(frame) => {
                        let bytes = adapter.encode_audio(&frame);
                        if sink.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Call torn down; close politely and exit
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                },
                maybe_msg = stream.next() => match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        if forward_messages(adapter.parse(&text), &events_tx).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "stt transport error");
                        break;
                    }
                },
            }
        }

        // Transport failed: immediate reconnect attempts. Tokens the vendor
        // buffered before the drop are lost.
        for attempt in 1..=STT_RECONNECT_ATTEMPTS {
            match connect_vendor(&mut adapter, &config, &api_key).await {
                Ok(new_ws) => {
                    tracing::info!(attempt, "stt session reconnected");
                    ws = new_ws;
                    continue 'connection;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "stt reconnect failed");
                }
            }
        }

        tracing::error!("stt reconnect attempts exhausted, session closed");
        return;
    }
}

/// Sanitize and forward normalized vendor messages. Garbled transcripts are
/// dropped here; endpoint markers always pass through.
async fn forward_messages(
    msgs: Vec<RawSttMessage>,
    events: &mpsc::Sender<SttEvent>,
) -> Result<(), ()> {
    for raw in msgs {
        if !raw.text.is_empty() {
            if is_garbled_echo(&raw.text) {
                tracing::debug!(text = %raw.text, "dropped garbled transcript");
            } else {
                let event = match raw.kind {
                    RawSttKind::Partial => SttEvent::Partial {
                        text: raw.text.clone(),
                        received_at: Instant::now(),
                    },
                    RawSttKind::Final => SttEvent::Final {
                        text: raw.text.clone(),
                        received_at: Instant::now(),
                    },
                };
                events.send(event).await.map_err(|_| ())?;
            }
        }
        if raw.endpoint {
            events.send(SttEvent::Endpoint).await.map_err(|_| ())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_drops_garbled_but_keeps_endpoint() {
        let (tx, mut rx) = mpsc::channel(8);
        let msgs = vec![RawSttMessage {
            kind: RawSttKind::Final,
            text: "k k k k".to_string(),
            endpoint: true,
        }];
        forward_messages(msgs, &tx).await.unwrap();
        drop(tx);

        // The garbled final is gone; the endpoint survives
        assert!(matches!(rx.recv().await, Some(SttEvent::Endpoint)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forward_keeps_shorthand() {
        let (tx, mut rx) = mpsc::channel(8);
        let msgs = vec![RawSttMessage {
            kind: RawSttKind::Final,
            text: "2PM".to_string(),
            endpoint: false,
        }];
        forward_messages(msgs, &tx).await.unwrap();
        assert!(matches!(rx.recv().await, Some(SttEvent::Final { text, .. }) if text == "2PM"));
    }

    #[tokio::test]
    async fn test_forward_orders_partial_then_endpoint() {
        let (tx, mut rx) = mpsc::channel(8);
        let msgs = vec![
            RawSttMessage {
                kind: RawSttKind::Partial,
                text: "I need to".to_string(),
                endpoint: false,
            },
            RawSttMessage {
                kind: RawSttKind::Final,
                text: "I need to reschedule".to_string(),
                endpoint: true,
            },
        ];
        forward_messages(msgs, &tx).await.unwrap();
        assert!(matches!(rx.recv().await, Some(SttEvent::Partial { .. })));
        assert!(matches!(rx.recv().await, Some(SttEvent::Final { .. })));
        assert!(matches!(rx.recv().await, Some(SttEvent::Endpoint)));
    }
}
