//! Persistent per-call TTS session
//!
//! One long-lived vendor connection per call, reused across turns. Three
//! cooperating tasks plus the caller:
//!
//! - a vendor task that owns the socket: sends text frames, receives audio
//!   (the only task that ever reads the socket), and keeps the link alive
//! - a playback task that frames μ-law into 20 ms chunks for carrier egress
//! - a floor timer that releases the floor once the wallclock passes the
//!   expected playback end and generation is complete
//!
//! The interrupt flag is the reliable cancellation signal: every loop checks
//! it at each iteration and before each send.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use parley_carrier::Egress;
use parley_codec::{frame_mulaw, frame_mulaw_padded};
use parley_config::constants::vendors::TTS_KEEPALIVE_SECS;
use parley_config::{AgentConfig, TtsProvider};
use parley_core::{
    audio::mulaw_duration_secs, traits::SpeechSynthesizer, CallId, Error, PlaybackKind,
    PlaybackLedger, Result, Sentence, FRAME_BYTES,
};

use crate::maya::{MayaClient, MayaTranscoder};
use crate::vendor::{VendorMessage, VendorProtocol};
use crate::TtsError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Notifications to the orchestrator.
#[derive(Debug, Clone)]
pub enum TtsEvent {
    /// First audio chunk of a response began sending to the carrier
    FirstChunk { sentence_num: u32 },
    SentenceQueued { sentence_num: u32 },
    SentenceDone { sentence_num: u32, mulaw_bytes: usize },
    /// All audio played out and generation finished
    FloorReleased,
    /// clear_audio ran; carrier queue dropped
    Cleared,
    Error(String),
}

#[derive(Debug, Clone)]
struct SentenceMeta {
    sentence_num: u32,
    queued_at: Instant,
}

#[derive(Debug)]
struct AudioChunk {
    mulaw: Vec<u8>,
    sentence_num: u32,
    epoch: u32,
    end_of_sentence: bool,
}

enum VendorCommand {
    Speak { text: String, sentence_num: u32 },
    Reconnect,
}

struct Shared {
    call_id: CallId,
    config: Arc<AgentConfig>,
    api_key: String,
    protocol: VendorProtocol,
    /// Stop everything now; checked at every loop iteration
    interrupted: AtomicBool,
    /// False while the LLM is still queueing sentences; the floor cannot
    /// release until true. Defaults true (fail-safe).
    generation_complete: AtomicBool,
    /// A sentence is in flight at the vendor (suppresses keep-alives)
    is_streaming: AtomicBool,
    /// An audio chunk is being sent to the carrier right now
    sending_audio: AtomicBool,
    /// First chunk of the current response still pending
    first_chunk_pending: AtomicBool,
    /// Chunks from before a flush carry a stale epoch and are dropped
    flush_epoch: AtomicU32,
    sentence_counter: AtomicU32,
    voice_id: parking_lot::Mutex<String>,
    next_kind: parking_lot::Mutex<PlaybackKind>,
    pending: parking_lot::Mutex<VecDeque<SentenceMeta>>,
    ledger: Arc<PlaybackLedger>,
    egress: mpsc::Sender<Egress>,
    events: broadcast::Sender<TtsEvent>,
}

impl Shared {
    fn emit(&self, event: TtsEvent) {
        let _ = self.events.send(event);
    }
}

/// Handle to one call's persistent TTS session.
pub struct PersistentTtsSession {
    shared: Arc<Shared>,
    cmd_tx: mpsc::Sender<VendorCommand>,
    vendor_task: JoinHandle<()>,
    playback_task: JoinHandle<()>,
    floor_task: JoinHandle<()>,
}

impl PersistentTtsSession {
    /// Open the vendor link and start the task set. For WS providers the
    /// initial connect must succeed; Maya is connectionless.
    pub async fn connect(
        call_id: CallId,
        config: Arc<AgentConfig>,
        api_key: String,
        ledger: Arc<PlaybackLedger>,
        egress: mpsc::Sender<Egress>,
    ) -> std::result::Result<Self, TtsError> {
        let (events, _) = broadcast::channel(128);
        let shared = Arc::new(Shared {
            call_id,
            protocol: VendorProtocol::new(config.tts_provider),
            voice_id: parking_lot::Mutex::new(config.voice_id.clone()),
            next_kind: parking_lot::Mutex::new(PlaybackKind::Content),
            api_key,
            config,
            interrupted: AtomicBool::new(false),
            generation_complete: AtomicBool::new(true),
            is_streaming: AtomicBool::new(false),
            sending_audio: AtomicBool::new(false),
            first_chunk_pending: AtomicBool::new(false),
            flush_epoch: AtomicU32::new(0),
            sentence_counter: AtomicU32::new(0),
            pending: parking_lot::Mutex::new(VecDeque::new()),
            ledger,
            egress,
            events,
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (audio_tx, audio_rx) = mpsc::channel(256);

        let vendor_task = if shared.config.tts_provider == TtsProvider::Maya {
            tokio::spawn(run_maya_vendor(shared.clone(), cmd_rx, audio_tx))
        } else {
            let ws = connect_ws(&shared).await?;
            tokio::spawn(run_ws_vendor(shared.clone(), ws, cmd_rx, audio_tx))
        };
        let playback_task = tokio::spawn(run_playback(shared.clone(), audio_rx));
        let floor_task = tokio::spawn(run_floor_timer(shared.clone()));

        tracing::info!(call_id = %shared.call_id, provider = ?shared.config.tts_provider, "persistent tts session established");

        Ok(Self {
            shared,
            cmd_tx,
            vendor_task,
            playback_task,
            floor_task,
        })
    }

    /// Subscribe to session notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TtsEvent> {
        self.shared.events.subscribe()
    }

    /// Sentences synthesized so far this call.
    pub fn sentence_count(&self) -> u32 {
        self.shared.sentence_counter.load(Ordering::Relaxed)
    }

    pub fn is_interrupted(&self) -> bool {
        self.shared.interrupted.load(Ordering::SeqCst)
    }

    /// Tear down every task. Called on hangup after the ledger flush.
    pub async fn close(&self) {
        self.vendor_task.abort();
        self.playback_task.abort();
        self.floor_task.abort();
        tracing::info!(call_id = %self.shared.call_id, "persistent tts session closed");
    }
}

#[async_trait]
impl SpeechSynthesizer for PersistentTtsSession {
    async fn stream_sentence(&self, sentence: Sentence, voice_id: Option<String>) -> Result<bool> {
        let shared = &self.shared;

        // Voice change: reconnect transparently before synthesizing
        if let Some(voice) = voice_id {
            let changed = {
                let mut current = shared.voice_id.lock();
                if !voice.is_empty() && *current != voice {
                    tracing::info!(call_id = %shared.call_id, "voice change detected, reconnecting");
                    *current = voice;
                    true
                } else {
                    false
                }
            };
            if changed {
                self.cmd_tx
                    .send(VendorCommand::Reconnect)
                    .await
                    .map_err(|_| Error::ChannelClosed("tts vendor"))?;
            }
        }

        // A new response clears the interrupt flag first; without this the
        // session could never recover after a barge-in.
        if sentence.is_first {
            if shared.interrupted.swap(false, Ordering::SeqCst) {
                tracing::debug!(call_id = %shared.call_id, "new response clears interrupt flag");
            }
            shared.first_chunk_pending.store(true, Ordering::SeqCst);
            shared.ledger.set_awaiting_first_audio(true);
        }

        // Mid-response sentences are skipped while interrupted
        if shared.interrupted.load(Ordering::SeqCst) {
            tracing::debug!(call_id = %shared.call_id, num = sentence.sentence_num, "skipping sentence, interrupted");
            return Ok(false);
        }

        let num = shared.sentence_counter.fetch_add(1, Ordering::SeqCst) + 1;

        // Heuristic expected duration extends the running playback end;
        // queued sentences accumulate rather than replace.
        let expected_end = shared
            .ledger
            .extend_expected_end(sentence.estimated_duration_secs());
        let kind = *shared.next_kind.lock();
        shared
            .ledger
            .register(format!("pb-{}-{num}", shared.call_id), kind, expected_end);

        shared.pending.lock().push_back(SentenceMeta {
            sentence_num: num,
            queued_at: Instant::now(),
        });
        shared.is_streaming.store(true, Ordering::SeqCst);

        self.cmd_tx
            .send(VendorCommand::Speak {
                text: sentence.text.clone(),
                sentence_num: num,
            })
            .await
            .map_err(|_| Error::ChannelClosed("tts vendor"))?;

        shared.emit(TtsEvent::SentenceQueued { sentence_num: num });
        tracing::debug!(
            call_id = %shared.call_id,
            num,
            words = sentence.word_count(),
            "sentence queued for synthesis"
        );
        Ok(true)
    }

    async fn clear_audio(&self) -> Result<()> {
        let shared = &self.shared;
        tracing::info!(
            call_id = %shared.call_id,
            pending = shared.pending.lock().len(),
            "clear_audio: interrupting playback"
        );

        // Flag first so every loop stops before the queues drain
        shared.interrupted.store(true, Ordering::SeqCst);
        shared.generation_complete.store(true, Ordering::SeqCst);
        shared.flush_epoch.fetch_add(1, Ordering::SeqCst);
        shared.pending.lock().clear();

        shared.sending_audio.store(false, Ordering::SeqCst);
        shared.is_streaming.store(false, Ordering::SeqCst);
        shared.ledger.set_tts_sending(false);
        shared.ledger.set_generating(false);
        shared.ledger.set_awaiting_first_audio(false);
        // Drops floor entries and snaps the expected end to now
        shared.ledger.clear_floor_entries();

        // Carrier writer repeats the clear directive to mask race windows
        shared
            .egress
            .send(Egress::Clear)
            .await
            .map_err(|_| Error::ChannelClosed("carrier egress"))?;

        shared.emit(TtsEvent::Cleared);
        Ok(())
    }

    fn cancel_pending_sentences(&self) {
        let shared = &self.shared;
        let dropped = shared.pending.lock().len();
        shared.pending.lock().clear();
        shared.flush_epoch.fetch_add(1, Ordering::SeqCst);
        if dropped > 0 {
            tracing::debug!(call_id = %shared.call_id, dropped, "cancelled pending sentences");
        }
    }

    fn set_generation_complete(&self, complete: bool) {
        self.shared
            .generation_complete
            .store(complete, Ordering::SeqCst);
        self.shared.ledger.set_generating(!complete);
    }

    fn is_sending(&self) -> bool {
        self.shared.sending_audio.load(Ordering::SeqCst)
    }

    fn set_playback_kind(&self, kind: PlaybackKind) {
        *self.shared.next_kind.lock() = kind;
    }
}

async fn connect_ws(shared: &Shared) -> std::result::Result<WsStream, TtsError> {
    let voice = shared.voice_id.lock().clone();
    let url = shared.protocol.url(&voice, &shared.config.tts_model);
    let request = url
        .into_client_request()
        .map_err(|e| TtsError::Connect(e.to_string()))?;

    let (mut ws, _) = connect_async(request)
        .await
        .map_err(|e| TtsError::Connect(e.to_string()))?;

    let init = shared.protocol.init_frame(&shared.config, &shared.api_key);
    ws.send(Message::Text(init))
        .await
        .map_err(|e| TtsError::Connect(e.to_string()))?;

    Ok(ws)
}

/// Vendor task for the WS protocol family. Single owner of the socket in
/// both directions; text frames out, ordered audio in.
async fn run_ws_vendor(
    shared: Arc<Shared>,
    mut ws: WsStream,
    mut cmd_rx: mpsc::Receiver<VendorCommand>,
    audio_tx: mpsc::Sender<AudioChunk>,
) {
    'connection: loop {
        let (mut sink, mut stream) = ws.split();
        let mut keepalive =
            tokio::time::interval(Duration::from_secs(TTS_KEEPALIVE_SECS));
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        keepalive.reset();
        // Sentence the incoming audio belongs to; vendor output is ordered
        let mut current: Option<(SentenceMeta, usize)> = None;

        loop {
            tokio::select! {
                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                    Some(VendorCommand::Reconnect) => break,
                    Some(VendorCommand::Speak { text, sentence_num }) => {
                        let frame = shared.protocol.text_frame(&format!("{text} "), true, false);
                        let flush = shared.protocol.text_frame("", false, true);
                        if sink.send(Message::Text(frame)).await.is_err()
                            || sink.send(Message::Text(flush)).await.is_err()
                        {
                            tracing::warn!(call_id = %shared.call_id, sentence_num, "tts send failed, reconnecting");
                            break;
                        }
                    }
                },
                _ = keepalive.tick() => {
                    if !shared.is_streaming.load(Ordering::SeqCst) {
                        if sink.send(Message::Text(shared.protocol.keepalive_frame())).await.is_err() {
                            break;
                        }
                        tracing::trace!(call_id = %shared.call_id, "tts keep-alive sent");
                    }
                },
                maybe_msg = stream.next() => match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        match shared.protocol.parse(&text) {
                            Some(VendorMessage::Audio { mulaw, is_final }) => {
                                if current.is_none() {
                                    current = shared.pending.lock().pop_front().map(|m| (m, 0));
                                }
                                let interrupted = shared.interrupted.load(Ordering::SeqCst);
                                let sentence_num = match current.as_mut() {
                                    Some((meta, bytes)) => {
                                        if !interrupted {
                                            *bytes += mulaw.len();
                                        }
                                        meta.sentence_num
                                    }
                                    None => continue,
                                };

                                // Interrupted: discard, but keep consuming to
                                // stay in sync with the vendor stream
                                if !interrupted {
                                    let chunk = AudioChunk {
                                        mulaw,
                                        sentence_num,
                                        epoch: shared.flush_epoch.load(Ordering::SeqCst),
                                        end_of_sentence: is_final,
                                    };
                                    if audio_tx.send(chunk).await.is_err() {
                                        return;
                                    }
                                }

                                if is_final {
                                    finish_sentence(&shared, &mut current);
                                }
                            }
                            Some(VendorMessage::Final) => {
                                if current.is_none() {
                                    current = shared.pending.lock().pop_front().map(|m| (m, 0));
                                }
                                finish_sentence(&shared, &mut current);
                            }
                            Some(VendorMessage::Error(e)) => {
                                tracing::error!(call_id = %shared.call_id, error = %e, "tts vendor error");
                                shared.emit(TtsEvent::Error(e));
                            }
                            None => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(call_id = %shared.call_id, error = %e, "tts transport error");
                        break;
                    }
                },
            }
        }

        // Reconnect (transport failure or voice change)
        for attempt in 1..=3u32 {
            match connect_ws(&shared).await {
                Ok(new_ws) => {
                    tracing::info!(call_id = %shared.call_id, attempt, "tts session reconnected");
                    ws = new_ws;
                    continue 'connection;
                }
                Err(e) => {
                    tracing::warn!(call_id = %shared.call_id, attempt, error = %e, "tts reconnect failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        tracing::error!(call_id = %shared.call_id, "tts reconnect attempts exhausted");
        shared.emit(TtsEvent::Error("tts reconnect exhausted".to_string()));
        return;
    }
}

fn finish_sentence(shared: &Shared, current: &mut Option<(SentenceMeta, usize)>) {
    if let Some((meta, bytes)) = current.take() {
        let receive_ms = meta.queued_at.elapsed().as_millis() as u64;
        tracing::debug!(
            call_id = %shared.call_id,
            num = meta.sentence_num,
            mulaw_bytes = bytes,
            audio_secs = mulaw_duration_secs(bytes),
            receive_ms,
            "sentence synthesis finished"
        );
        shared.emit(TtsEvent::SentenceDone {
            sentence_num: meta.sentence_num,
            mulaw_bytes: bytes,
        });
    }
    if shared.pending.lock().is_empty() {
        shared.is_streaming.store(false, Ordering::SeqCst);
    }
}

/// Vendor task for Maya's HTTP-chunked streaming.
async fn run_maya_vendor(
    shared: Arc<Shared>,
    mut cmd_rx: mpsc::Receiver<VendorCommand>,
    audio_tx: mpsc::Sender<AudioChunk>,
) {
    let client = MayaClient::from_env();
    let mut transcoder = MayaTranscoder::new();

    while let Some(cmd) = cmd_rx.recv().await {
        let VendorCommand::Speak { text, sentence_num } = cmd else {
            // Voice changes are per-request for an HTTP vendor
            continue;
        };
        let meta = shared.pending.lock().pop_front();
        let queued_at = meta.map(|m| m.queued_at).unwrap_or_else(Instant::now);

        let voice = shared.voice_id.lock().clone();
        let (pcm_tx, mut pcm_rx) = mpsc::channel::<Vec<u8>>(64);
        let stream_task = {
            let client = client.clone();
            let text = text.clone();
            tokio::spawn(async move { client.stream_speech(&text, &voice, pcm_tx).await })
        };

        let mut total = 0usize;
        while let Some(pcm) = pcm_rx.recv().await {
            if shared.interrupted.load(Ordering::SeqCst) {
                continue;
            }
            match transcoder.transcode(&pcm) {
                Ok(mulaw) if !mulaw.is_empty() => {
                    total += mulaw.len();
                    let chunk = AudioChunk {
                        mulaw,
                        sentence_num,
                        epoch: shared.flush_epoch.load(Ordering::SeqCst),
                        end_of_sentence: false,
                    };
                    if audio_tx.send(chunk).await.is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(call_id = %shared.call_id, error = %e, "maya transcode failed");
                }
            }
        }

        match stream_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => shared.emit(TtsEvent::Error(e.to_string())),
            Err(_) => {}
        }

        // Sentence boundary marker keeps the playback framing aligned
        let _ = audio_tx
            .send(AudioChunk {
                mulaw: Vec::new(),
                sentence_num,
                epoch: shared.flush_epoch.load(Ordering::SeqCst),
                end_of_sentence: true,
            })
            .await;

        tracing::debug!(
            call_id = %shared.call_id,
            num = sentence_num,
            mulaw_bytes = total,
            receive_ms = queued_at.elapsed().as_millis() as u64,
            "maya sentence finished"
        );
        shared.emit(TtsEvent::SentenceDone {
            sentence_num,
            mulaw_bytes: total,
        });
        if shared.pending.lock().is_empty() {
            shared.is_streaming.store(false, Ordering::SeqCst);
        }
    }
}

/// Playback task: frames sentence audio into 20 ms chunks for the carrier.
/// After clear_audio, chunks from the old epoch are dropped so no audio
/// synthesized before the clear ever reaches the carrier.
async fn run_playback(shared: Arc<Shared>, mut audio_rx: mpsc::Receiver<AudioChunk>) {
    let mut carry: Vec<u8> = Vec::new();

    while let Some(chunk) = audio_rx.recv().await {
        if chunk.epoch != shared.flush_epoch.load(Ordering::SeqCst) {
            carry.clear();
            continue;
        }
        if shared.interrupted.load(Ordering::SeqCst) {
            carry.clear();
            continue;
        }

        shared.sending_audio.store(true, Ordering::SeqCst);
        shared.ledger.set_tts_sending(true);

        if shared.first_chunk_pending.swap(false, Ordering::SeqCst) {
            shared.ledger.set_awaiting_first_audio(false);
            shared.emit(TtsEvent::FirstChunk {
                sentence_num: chunk.sentence_num,
            });
        }

        let mut bytes = std::mem::take(&mut carry);
        bytes.extend_from_slice(&chunk.mulaw);

        let frames = if chunk.end_of_sentence {
            // Flush: the trailing partial frame is padded with μ-law silence
            match frame_mulaw_padded(&bytes, FRAME_BYTES) {
                Ok(frames) => frames,
                Err(_) => continue,
            }
        } else {
            match frame_mulaw(&bytes, FRAME_BYTES) {
                Ok((frames, rest)) => {
                    carry = rest;
                    frames
                }
                Err(_) => continue,
            }
        };

        let epoch = chunk.epoch;
        for frame in frames {
            if shared.interrupted.load(Ordering::SeqCst)
                || shared.flush_epoch.load(Ordering::SeqCst) != epoch
            {
                carry.clear();
                break;
            }
            if shared.egress.send(Egress::Media(frame)).await.is_err() {
                return;
            }
        }

        if audio_rx.is_empty() {
            shared.sending_audio.store(false, Ordering::SeqCst);
            shared.ledger.set_tts_sending(false);
        }
    }
}

/// Floor timer: releases the floor once all audio should have played out and
/// the LLM has stopped queueing sentences. Never releases between sentences
/// of one response.
async fn run_floor_timer(shared: Arc<Shared>) {
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tick.tick().await;

        if !shared.ledger.is_holding_floor() {
            continue;
        }
        if shared.interrupted.load(Ordering::SeqCst) {
            // clear_audio already released the floor
            continue;
        }
        if shared.sending_audio.load(Ordering::SeqCst) {
            continue;
        }
        if shared.ledger.expected_end() > Instant::now() {
            continue;
        }
        if !shared.generation_complete.load(Ordering::SeqCst) {
            // More sentences may be coming; hold the floor
            continue;
        }

        shared.ledger.clear_floor_entries();
        shared.ledger.set_tts_sending(false);
        tracing::info!(call_id = %shared.call_id, "floor released");
        shared.emit(TtsEvent::FloorReleased);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_shared(ledger: Arc<PlaybackLedger>, egress: mpsc::Sender<Egress>) -> Arc<Shared> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Shared {
            call_id: "cc-test".to_string(),
            config: Arc::new(AgentConfig::default()),
            api_key: "k".to_string(),
            protocol: VendorProtocol::new(TtsProvider::Elevenlabs),
            interrupted: AtomicBool::new(false),
            generation_complete: AtomicBool::new(true),
            is_streaming: AtomicBool::new(false),
            sending_audio: AtomicBool::new(false),
            first_chunk_pending: AtomicBool::new(true),
            flush_epoch: AtomicU32::new(0),
            sentence_counter: AtomicU32::new(0),
            voice_id: parking_lot::Mutex::new("v".to_string()),
            next_kind: parking_lot::Mutex::new(PlaybackKind::Content),
            pending: parking_lot::Mutex::new(VecDeque::new()),
            ledger,
            egress,
            events,
        })
    }

    #[tokio::test]
    async fn test_playback_frames_and_pads() {
        let ledger = Arc::new(PlaybackLedger::new());
        let (egress_tx, mut egress_rx) = mpsc::channel(64);
        let shared = test_shared(ledger, egress_tx);
        let (audio_tx, audio_rx) = mpsc::channel(16);

        let task = tokio::spawn(run_playback(shared.clone(), audio_rx));

        // 400 bytes, end of sentence: two whole frames + one padded frame
        audio_tx
            .send(AudioChunk {
                mulaw: vec![0x42; 400],
                sentence_num: 1,
                epoch: 0,
                end_of_sentence: true,
            })
            .await
            .unwrap();
        drop(audio_tx);
        task.await.unwrap();

        let mut frames = Vec::new();
        while let Ok(e) = egress_rx.try_recv() {
            if let Egress::Media(f) = e {
                frames.push(f);
            }
        }
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == FRAME_BYTES));
        assert_eq!(frames[2][80], 0xFF);
    }

    #[tokio::test]
    async fn test_playback_drops_stale_epoch() {
        let ledger = Arc::new(PlaybackLedger::new());
        let (egress_tx, mut egress_rx) = mpsc::channel(64);
        let shared = test_shared(ledger, egress_tx);
        let (audio_tx, audio_rx) = mpsc::channel(16);

        // Simulate a clear between synthesis and playback
        shared.flush_epoch.store(1, Ordering::SeqCst);

        let task = tokio::spawn(run_playback(shared.clone(), audio_rx));
        audio_tx
            .send(AudioChunk {
                mulaw: vec![0x42; 320],
                sentence_num: 1,
                epoch: 0,
                end_of_sentence: true,
            })
            .await
            .unwrap();
        drop(audio_tx);
        task.await.unwrap();

        // No audio synthesized before the clear reaches the carrier
        assert!(egress_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_playback_emits_first_chunk_event() {
        let ledger = Arc::new(PlaybackLedger::new());
        let (egress_tx, _egress_rx) = mpsc::channel(64);
        let shared = test_shared(ledger.clone(), egress_tx);
        ledger.set_awaiting_first_audio(true);
        let mut events = shared.events.subscribe();
        let (audio_tx, audio_rx) = mpsc::channel(16);

        let task = tokio::spawn(run_playback(shared.clone(), audio_rx));
        audio_tx
            .send(AudioChunk {
                mulaw: vec![0x42; 160],
                sentence_num: 1,
                epoch: 0,
                end_of_sentence: true,
            })
            .await
            .unwrap();
        drop(audio_tx);
        task.await.unwrap();

        assert!(matches!(
            events.recv().await,
            Ok(TtsEvent::FirstChunk { sentence_num: 1 })
        ));
    }

    #[tokio::test]
    async fn test_clear_audio_releases_activity() {
        // Maya is connectionless, so a real session can be built here
        let mut config = AgentConfig::default();
        config.tts_provider = TtsProvider::Maya;
        let ledger = Arc::new(PlaybackLedger::new());
        let (egress_tx, mut egress_rx) = mpsc::channel(16);
        let session = PersistentTtsSession::connect(
            "cc-1".to_string(),
            Arc::new(config),
            String::new(),
            ledger.clone(),
            egress_tx,
        )
        .await
        .unwrap();

        // Mid-response state: generating, awaiting first audio, queued playback
        session.set_generation_complete(false);
        ledger.set_awaiting_first_audio(true);
        ledger.register("pb-1", PlaybackKind::Content, Instant::now());
        ledger.extend_expected_end(5.0);
        assert!(ledger.agent_is_active());

        session.clear_audio().await.unwrap();

        // A barge-in with no follow-up response must leave nothing active,
        // or the dead-air monitor would never sample the silence clock
        assert!(!ledger.agent_is_active());
        assert!(!ledger.is_holding_floor());
        assert!(matches!(egress_rx.recv().await, Some(Egress::Clear)));
        session.close().await;
    }

    #[tokio::test]
    async fn test_floor_timer_waits_for_generation_complete() {
        let ledger = Arc::new(PlaybackLedger::new());
        let (egress_tx, _egress_rx) = mpsc::channel(8);
        let shared = test_shared(ledger.clone(), egress_tx);
        let mut events = shared.events.subscribe();

        // Floor held via an entry, expected end already past, but the LLM
        // is still generating
        ledger.register("pb-1", PlaybackKind::Content, Instant::now());
        shared.generation_complete.store(false, Ordering::SeqCst);

        let task = tokio::spawn(run_floor_timer(shared.clone()));

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(ledger.is_holding_floor(), "floor must hold mid-generation");
        assert!(events.try_recv().is_err());

        // Generation completes; the floor releases on the next tick
        shared.generation_complete.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(!ledger.is_holding_floor());
        assert!(matches!(events.try_recv(), Ok(TtsEvent::FloorReleased)));

        task.abort();
    }
}
