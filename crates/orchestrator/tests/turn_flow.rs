//! End-to-end turn flows against recording doubles
//!
//! Exercises the orchestrator's state machine the way a live call would:
//! carrier events, STT events and playback notifications arrive on their
//! channels, and the doubles record what the orchestrator did to the
//! sessions.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use parley_carrier::control::{RecordedCommand, RecordingCarrierControl};
use parley_carrier::{AmdResult, CarrierEvent};
use parley_config::{AgentConfig, WhoSpeaksFirst};
use parley_core::{
    traits::{GenerationOutcome, SpeechEvent},
    CallDirection, CallInfo, EndReason, PlaybackKind, PlaybackLedger, ResponseGenerator, Result,
    Sentence, SpeechSynthesizer, TranscriptEntry, TranscriptRole, TurnState,
};
use parley_orchestrator::{OrchestratorChannels, TurnOrchestrator};
use parley_persistence::InMemoryCallLogStore;
use parley_store::InMemoryCallStateStore;
use parley_stt::SttEvent;

/// TTS double: records sentences and mirrors the ledger bookkeeping the
/// real session performs.
struct RecordingSynth {
    ledger: Arc<PlaybackLedger>,
    sentences: Mutex<Vec<Sentence>>,
    clear_count: AtomicU32,
    cancel_count: AtomicU32,
    interrupted: AtomicBool,
    kind: Mutex<PlaybackKind>,
    counter: AtomicU32,
}

impl RecordingSynth {
    fn new(ledger: Arc<PlaybackLedger>) -> Self {
        Self {
            ledger,
            sentences: Mutex::new(Vec::new()),
            clear_count: AtomicU32::new(0),
            cancel_count: AtomicU32::new(0),
            interrupted: AtomicBool::new(false),
            kind: Mutex::new(PlaybackKind::Content),
            counter: AtomicU32::new(0),
        }
    }

    fn spoken_texts(&self) -> Vec<String> {
        self.sentences.lock().iter().map(|s| s.text.clone()).collect()
    }

    fn clears(&self) -> u32 {
        self.clear_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn stream_sentence(&self, sentence: Sentence, _voice_id: Option<String>) -> Result<bool> {
        if sentence.is_first {
            self.interrupted.store(false, Ordering::SeqCst);
        }
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let num = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let end = self
            .ledger
            .extend_expected_end(sentence.estimated_duration_secs());
        self.ledger
            .register(format!("pb-{num}"), *self.kind.lock(), end);
        self.ledger.set_awaiting_first_audio(false);
        self.sentences.lock().push(sentence);
        Ok(true)
    }

    async fn clear_audio(&self) -> Result<()> {
        self.interrupted.store(true, Ordering::SeqCst);
        self.clear_count.fetch_add(1, Ordering::SeqCst);
        self.ledger.clear_floor_entries();
        self.ledger.set_tts_sending(false);
        self.ledger.set_awaiting_first_audio(false);
        self.ledger.set_generating(false);
        Ok(())
    }

    fn cancel_pending_sentences(&self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
    }

    fn set_generation_complete(&self, complete: bool) {
        self.ledger.set_generating(!complete);
    }

    fn is_sending(&self) -> bool {
        false
    }

    fn set_playback_kind(&self, kind: PlaybackKind) {
        *self.kind.lock() = kind;
    }
}

/// LLM double: replays scripted sentences and records committed user turns.
struct ScriptedGenerator {
    script: Vec<&'static str>,
    user_turns: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(script: Vec<&'static str>) -> Self {
        Self {
            script,
            user_turns: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        _history: &[TranscriptEntry],
        user_turn: &str,
        sink: mpsc::Sender<Sentence>,
    ) -> Result<GenerationOutcome> {
        self.user_turns.lock().push(user_turn.to_string());
        let total = self.script.len();
        for (i, text) in self.script.iter().enumerate() {
            let sentence = Sentence::new(*text, (i + 1) as u32, i == 0, i + 1 == total);
            if sink.send(sentence).await.is_err() {
                return Ok(GenerationOutcome::Cancelled);
            }
        }
        Ok(GenerationOutcome::Complete {
            sentences: total as u32,
            ttft_ms: Some(40),
        })
    }
}

struct Harness {
    orchestrator: Arc<TurnOrchestrator>,
    ledger: Arc<PlaybackLedger>,
    synth: Arc<RecordingSynth>,
    generator: Arc<ScriptedGenerator>,
    control: Arc<RecordingCarrierControl>,
    log_store: Arc<InMemoryCallLogStore>,
    carrier_tx: mpsc::Sender<CarrierEvent>,
    stt_tx: mpsc::Sender<SttEvent>,
    speech_tx: mpsc::Sender<SpeechEvent>,
    _audio_rx: mpsc::Receiver<parley_core::AudioFrame>,
}

fn agent_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.greeting = "Hi, this is Jake. How can I help?".to_string();
    config.start_node.who_speaks_first = WhoSpeaksFirst::Ai;
    config.voicemail_detection.amd_wait_before_greeting_ms = 0;
    config
}

async fn start_call(
    config: AgentConfig,
    script: Vec<&'static str>,
    direction: CallDirection,
) -> Harness {
    let ledger = Arc::new(PlaybackLedger::new());
    let synth = Arc::new(RecordingSynth::new(ledger.clone()));
    let generator = Arc::new(ScriptedGenerator::new(script));
    let control = Arc::new(RecordingCarrierControl::new());
    let store = Arc::new(InMemoryCallStateStore::new());
    let log_store = Arc::new(InMemoryCallLogStore::new());

    let (carrier_tx, carrier_rx) = mpsc::channel(64);
    let (stt_tx, stt_rx) = mpsc::channel(64);
    let (speech_tx, speech_rx) = mpsc::channel(64);
    let (_flags_tx, flags_rx) = mpsc::channel(8);
    let (audio_tx, audio_rx) = mpsc::channel(64);

    let call = CallInfo::new("cc-test", "agent-1", direction, "+15550100", "+15550199");
    let orchestrator = TurnOrchestrator::new(
        call,
        Arc::new(config),
        ledger.clone(),
        synth.clone(),
        generator.clone(),
        control.clone(),
        store,
        log_store.clone(),
        audio_tx,
    );

    tokio::spawn(orchestrator.clone().run(OrchestratorChannels {
        carrier_events: carrier_rx,
        stt_events: stt_rx,
        speech_events: speech_rx,
        flags: flags_rx,
    }));

    Harness {
        orchestrator,
        ledger,
        synth,
        generator,
        control,
        log_store,
        carrier_tx,
        stt_tx,
        speech_tx,
        _audio_rx: audio_rx,
    }
}

impl Harness {
    /// Simulate the agent's audio finishing: floor entries complete, the
    /// expected end snaps back, and the playback-tail window drains.
    async fn drain_agent_audio(&self) {
        self.ledger.clear_floor_entries();
        self.ledger.set_tts_sending(false);
        self.speech_tx.send(SpeechEvent::FloorReleased).await.unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;
    }

    async fn user_says(&self, text: &str) {
        self.stt_tx
            .send(SttEvent::Final {
                text: text.to_string(),
                received_at: std::time::Instant::now(),
            })
            .await
            .unwrap();
        self.stt_tx.send(SttEvent::Endpoint).await.unwrap();
    }

    /// Wait past the endpoint debounce so the turn commits.
    async fn wait_for_commit(&self) {
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
}

#[tokio::test]
async fn test_ideal_turn() {
    let harness = start_call(
        agent_config(),
        vec!["Sure, I can help with that.", "What day works for you?"],
        CallDirection::Inbound,
    )
    .await;

    // Call answered: the agent greets first
    harness.carrier_tx.send(CarrierEvent::Answered).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        harness.synth.spoken_texts(),
        vec!["Hi, this is Jake. How can I help?"]
    );

    // Greeting plays out; the user replies
    harness.drain_agent_audio().await;
    harness.user_says("I need to reschedule my appointment").await;
    harness.wait_for_commit().await;

    // LLM saw exactly the committed turn
    assert_eq!(
        *harness.generator.user_turns.lock(),
        vec!["I need to reschedule my appointment"]
    );

    // Both sentences synthesized, in order, no interruption flags
    let spoken = harness.synth.spoken_texts();
    assert_eq!(
        spoken,
        vec![
            "Hi, this is Jake. How can I help?",
            "Sure, I can help with that.",
            "What day works for you?",
        ]
    );
    assert_eq!(harness.synth.clears(), 0);

    // Transcript: assistant, user, assistant, assistant
    let transcript = harness.log_store.transcript("cc-test");
    let roles: Vec<TranscriptRole> = transcript.iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![
            TranscriptRole::Assistant,
            TranscriptRole::User,
            TranscriptRole::Assistant,
            TranscriptRole::Assistant,
        ]
    );

    // A latency record was appended for the turn
    assert_eq!(harness.log_store.latency_records("cc-test").len(), 1);
}

#[tokio::test]
async fn test_barge_in_cancels_and_clears() {
    let harness = start_call(
        agent_config(),
        vec!["Let me walk you through the whole schedule for next week in detail."],
        CallDirection::Inbound,
    )
    .await;

    // Agent mid-response: floor held, audio expected for a while
    harness
        .ledger
        .register("pb-live", PlaybackKind::Content, std::time::Instant::now());
    harness.ledger.extend_expected_end(8.0);

    // ≥3-word non-echo partial: barge-in
    harness
        .stt_tx
        .send(SttEvent::Partial {
            text: "Actually wait stop".to_string(),
            received_at: std::time::Instant::now(),
        })
        .await
        .unwrap();

    // Honored within the 300 ms bound
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(harness.synth.clears(), 1);
    assert!(!harness.ledger.is_holding_floor());
    assert_eq!(harness.orchestrator.state(), TurnState::Idle);

    // The user's completed utterance becomes the next turn
    harness.user_says("Actually wait, I meant next Tuesday").await;
    harness.wait_for_commit().await;
    assert_eq!(
        *harness.generator.user_turns.lock(),
        vec!["Actually wait, I meant next Tuesday"]
    );
}

#[tokio::test]
async fn test_two_word_utterance_does_not_barge_in() {
    let harness = start_call(agent_config(), vec!["Response."], CallDirection::Inbound).await;

    harness
        .ledger
        .register("pb-live", PlaybackKind::Content, std::time::Instant::now());
    harness.ledger.extend_expected_end(8.0);

    // Two words, not echo, not a backchannel: still below the threshold
    harness
        .stt_tx
        .send(SttEvent::Partial {
            text: "wait stop".to_string(),
            received_at: std::time::Instant::now(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(harness.synth.clears(), 0);
    assert!(harness.ledger.is_holding_floor());
}

#[tokio::test]
async fn test_echo_partial_discarded() {
    let harness = start_call(agent_config(), vec!["Response."], CallDirection::Inbound).await;

    // Greeting primes the echo filter and holds the floor
    harness.carrier_tx.send(CarrierEvent::Answered).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The speaker loop hears the greeting back
    harness
        .stt_tx
        .send(SttEvent::Partial {
            text: "this is Jake how can I help".to_string(),
            received_at: std::time::Instant::now(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    // No interruption, no state change
    assert_eq!(harness.synth.clears(), 0);
    assert!(harness.ledger.is_holding_floor());
}

#[tokio::test]
async fn test_filler_final_never_becomes_a_turn() {
    let harness = start_call(agent_config(), vec!["Response."], CallDirection::Inbound).await;

    harness
        .ledger
        .register("pb-live", PlaybackKind::Content, std::time::Instant::now());
    harness.ledger.extend_expected_end(8.0);

    harness
        .stt_tx
        .send(SttEvent::Final {
            text: "yeah okay".to_string(),
            received_at: std::time::Instant::now(),
        })
        .await
        .unwrap();
    harness.stt_tx.send(SttEvent::Endpoint).await.unwrap();
    harness.wait_for_commit().await;

    assert!(harness.generator.user_turns.lock().is_empty());
    assert_eq!(harness.synth.clears(), 0);
}

#[tokio::test]
async fn test_amd_machine_aborts_greeting_and_hangs_up() {
    let mut config = agent_config();
    // Give AMD time to land before the greeting goes out
    config.voicemail_detection.amd_wait_before_greeting_ms = 2000;

    let harness = start_call(config, vec!["Response."], CallDirection::Outbound).await;

    harness.carrier_tx.send(CarrierEvent::Answered).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness
        .carrier_tx
        .send(CarrierEvent::MachineDetection {
            result: AmdResult::Machine,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Greeting never played; the call was hung up with the AMD reason
    assert!(harness.synth.spoken_texts().is_empty());
    assert!(harness
        .control
        .commands()
        .contains(&RecordedCommand::Hangup("cc-test".to_string())));
    assert_eq!(
        harness.orchestrator.end_reason(),
        Some(EndReason::VoicemailDetectedAmd)
    );
    assert_eq!(harness.orchestrator.state(), TurnState::Ended);
}

#[tokio::test]
async fn test_gatekeeper_presses_digit_instead_of_hanging_up() {
    let harness = start_call(agent_config(), vec!["Response."], CallDirection::Outbound).await;

    harness.user_says("press 1 to speak to a representative").await;
    harness.wait_for_commit().await;

    assert!(harness
        .control
        .commands()
        .contains(&RecordedCommand::Dtmf("cc-test".to_string(), "1".to_string())));
    // Not treated as voicemail: call still alive, no LLM turn generated
    assert_ne!(harness.orchestrator.state(), TurnState::Ended);
    assert!(harness.generator.user_turns.lock().is_empty());
}

#[tokio::test]
async fn test_voicemail_pattern_hangs_up() {
    let harness = start_call(agent_config(), vec!["Response."], CallDirection::Outbound).await;

    harness
        .user_says("please leave a message after the tone")
        .await;
    harness.wait_for_commit().await;

    assert_eq!(
        harness.orchestrator.end_reason(),
        Some(EndReason::VoicemailDetectedPattern)
    );
    assert_eq!(harness.control.hangup_count(), 1);
}

#[tokio::test]
async fn test_multi_sentence_floor_never_drops() {
    let harness = start_call(
        agent_config(),
        vec!["First sentence.", "Second sentence.", "Third sentence."],
        CallDirection::Inbound,
    )
    .await;

    harness.user_says("tell me everything about the schedule").await;
    harness.wait_for_commit().await;

    // All three sentences queued in order, and the floor held throughout
    assert_eq!(
        harness.synth.spoken_texts(),
        vec!["First sentence.", "Second sentence.", "Third sentence."]
    );
    assert!(harness.ledger.is_holding_floor());
    // Expected end accumulated across sentences rather than being replaced
    assert!(harness.ledger.buffered_ahead_secs() > 4.0);
}
