//! Per-call media-stream session
//!
//! Splits the carrier WebSocket into a reader task (ordered `CarrierEvent`
//! channel) and a single writer task (ordered `Egress` channel with 20 ms
//! pacing). Frames to the carrier are strictly ordered because only the
//! writer task touches the sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parley_config::constants::carrier::{
    CLEAR_REPEATS, CLEAR_SPACING_MS, EGRESS_PACE_MS, MAX_BUFFER_AHEAD_SECS,
};
use parley_core::AudioFrame;

use crate::frames::{CarrierEvent, Egress, WireInbound, WireOutbound};

/// Backpressure source for the writer. Implemented by the playback ledger:
/// how much queued audio is ahead of wallclock.
pub trait EgressThrottle: Send + Sync {
    fn buffered_ahead_secs(&self) -> f64;
}

impl EgressThrottle for parley_core::PlaybackLedger {
    fn buffered_ahead_secs(&self) -> f64 {
        parley_core::PlaybackLedger::buffered_ahead_secs(self)
    }
}

/// Handle to one call's media-stream tasks.
pub struct CarrierSession {
    events_tx: mpsc::Sender<CarrierEvent>,
    egress_tx: mpsc::Sender<Egress>,
    bad_frames: Arc<AtomicU64>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CarrierSession {
    /// Split the socket and spawn both tasks. Returns the session handle and
    /// the ordered event stream.
    pub fn start(
        socket: WebSocket,
        throttle: Option<Arc<dyn EgressThrottle>>,
    ) -> (Self, mpsc::Receiver<CarrierEvent>) {
        let (sink, stream) = socket.split();
        let (events_tx, events_rx) = mpsc::channel(256);
        let (egress_tx, egress_rx) = mpsc::channel(512);
        let bad_frames = Arc::new(AtomicU64::new(0));

        let reader = tokio::spawn(run_reader(stream, events_tx.clone(), bad_frames.clone()));
        let writer = tokio::spawn(run_writer(sink, egress_rx, throttle));

        (
            Self {
                events_tx,
                egress_tx,
                bad_frames,
                reader,
                writer,
            },
            events_rx,
        )
    }

    /// Sender for the ordered egress channel.
    pub fn egress(&self) -> mpsc::Sender<Egress> {
        self.egress_tx.clone()
    }

    /// Sender used by the server to inject webhook-delivered control events
    /// into the same ordered stream the socket feeds.
    pub fn injector(&self) -> mpsc::Sender<CarrierEvent> {
        self.events_tx.clone()
    }

    /// Frames dropped for being malformed or wrongly sized.
    pub fn bad_frame_count(&self) -> u64 {
        self.bad_frames.load(Ordering::Relaxed)
    }

    /// Abort both tasks. Used on call teardown.
    pub fn shutdown(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Reader loop: wire frames → normalized events, in arrival order.
async fn run_reader<S>(
    mut stream: S,
    events: mpsc::Sender<CarrierEvent>,
    bad_frames: Arc<AtomicU64>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    use base64::Engine as _;
    let mut sequence: u64 = 0;
    let mut sent_stop = false;

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "carrier stream error");
                break;
            }
        };

        let frame: WireInbound = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable carrier frame");
                bad_frames.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let event = match frame {
            WireInbound::Connected { .. } => CarrierEvent::Connected,
            WireInbound::Start { start } => CarrierEvent::Started {
                call_id: start.call_control_id,
                from: start.from,
                to: start.to,
            },
            WireInbound::Media { media } => {
                let bytes = match base64::engine::general_purpose::STANDARD.decode(&media.payload)
                {
                    Ok(b) => b,
                    Err(_) => {
                        bad_frames.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };
                match AudioFrame::new(bytes, sequence) {
                    Ok(frame) => {
                        sequence += 1;
                        CarrierEvent::Audio(frame)
                    }
                    Err(_) => {
                        // Bad audio frames are dropped silently; only counted
                        bad_frames.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                }
            }
            WireInbound::Stop {} => CarrierEvent::Stopped,
            WireInbound::PlaybackStarted { playback_id } => {
                CarrierEvent::PlaybackStarted { playback_id }
            }
            WireInbound::PlaybackEnded { playback_id } => {
                CarrierEvent::PlaybackEnded { playback_id }
            }
            WireInbound::MachineDetectionEnded { result } => {
                CarrierEvent::MachineDetection { result }
            }
            WireInbound::Hangup { cause } => CarrierEvent::Hangup { cause },
        };

        let stop = matches!(event, CarrierEvent::Stopped);
        if events.send(event).await.is_err() {
            return;
        }
        if stop {
            sent_stop = true;
            break;
        }
    }

    // Consumer sees Stopped exactly once even on abrupt transport loss
    if !sent_stop {
        let _ = events.try_send(CarrierEvent::Stopped);
    }
    tracing::debug!("carrier reader task ended");
}

/// Writer loop: the only task that touches the sink. Media frames go out one
/// per 20 ms at steady state; `clear` is repeated to mask carrier race
/// windows.
async fn run_writer<K>(
    mut sink: K,
    mut egress: mpsc::Receiver<Egress>,
    throttle: Option<Arc<dyn EgressThrottle>>,
) where
    K: Sink<Message> + Unpin + Send,
{
    let mut pace = tokio::time::interval(Duration::from_millis(EGRESS_PACE_MS));
    pace.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while let Some(cmd) = egress.recv().await {
        match cmd {
            Egress::Media(bytes) => {
                if let Some(t) = &throttle {
                    // Cap how much audio is in flight at the carrier; audio
                    // already buffered there cannot be cleared reliably.
                    loop {
                        let ahead = t.buffered_ahead_secs();
                        if ahead <= MAX_BUFFER_AHEAD_SECS {
                            break;
                        }
                        let wait = (ahead - MAX_BUFFER_AHEAD_SECS).min(0.1);
                        tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                    }
                }
                pace.tick().await;
                if send_json(&mut sink, &WireOutbound::media(&bytes)).await.is_err() {
                    break;
                }
            }
            Egress::Clear => {
                let mut failed = false;
                for i in 0..CLEAR_REPEATS {
                    if send_json(&mut sink, &WireOutbound::Clear).await.is_err() {
                        failed = true;
                        break;
                    }
                    if i + 1 < CLEAR_REPEATS {
                        tokio::time::sleep(Duration::from_millis(CLEAR_SPACING_MS)).await;
                    }
                }
                if failed {
                    break;
                }
            }
            Egress::Dtmf(digit) => {
                let frame = WireOutbound::Dtmf {
                    digit: digit.to_string(),
                };
                if send_json(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("carrier writer task ended");
}

async fn send_json<K>(sink: &mut K, frame: &WireOutbound) -> Result<(), ()>
where
    K: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(_) => return Ok(()),
    };
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
