//! The per-call turn state machine
//!
//! Owns `TurnState` and every transition. Consumes four ordered event
//! streams (carrier, STT, speech playback, cross-worker flags) plus a 50 ms
//! tick for the debounce and hangup timers, and drives the sessions through
//! the seam traits so every policy here is testable with doubles.
//!
//! State machine:
//!
//! ```text
//! Idle ──user transcript──────────────────▶ UserSpeaking
//! UserSpeaking ──endpoint + debounce──────▶ Thinking
//! Thinking ──first LLM sentence───────────▶ AgentSpeaking
//! AgentSpeaking ──≥3-word non-echo partial▶ Interrupted ──cleared──▶ Idle
//! AgentSpeaking ──floor released──────────▶ Idle
//! Idle ──hangup / ending node─────────────▶ Ended
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parley_carrier::{AmdResult, CarrierEvent};
use parley_config::constants::turns::{
    ENDPOINT_DEBOUNCE_MS, FINAL_COALESCE_MS, HANGUP_GRACE_MS, PLAYBACK_TAIL_MS,
};
use parley_config::AgentConfig;
use parley_core::{
    traits::{GenerationOutcome, SpeechEvent},
    AudioFrame, CallInfo, CarrierControl, ConversationHistory, EndReason, Error, PlaybackKind,
    PlaybackLedger, ResponseGenerator, Sentence, SpeechSynthesizer, TranscriptEntry, TurnState,
    TurnTiming,
};
use parley_persistence::CallLogStore;
use parley_store::{CallStateStore, CallStateUpdate, ControlFlag};
use parley_stt::SttEvent;

use crate::dead_air::DeadAirHooks;
use crate::echo::EchoFilter;
use crate::filler::is_dropped_while_speaking;
use crate::voicemail::{VoicemailDetector, VoicemailVerdict};

/// Event streams feeding one orchestrator.
pub struct OrchestratorChannels {
    pub carrier_events: mpsc::Receiver<CarrierEvent>,
    pub stt_events: mpsc::Receiver<SttEvent>,
    pub speech_events: mpsc::Receiver<SpeechEvent>,
    pub flags: mpsc::Receiver<ControlFlag>,
}

pub struct TurnOrchestrator {
    call: Mutex<CallInfo>,
    config: Arc<AgentConfig>,
    ledger: Arc<PlaybackLedger>,

    synthesizer: Arc<dyn SpeechSynthesizer>,
    generator: Arc<dyn ResponseGenerator>,
    control: Arc<dyn CarrierControl>,
    store: Arc<dyn CallStateStore>,
    log_store: Arc<dyn CallLogStore>,
    /// Bounded channel into the STT session's audio sender
    stt_audio: mpsc::Sender<AudioFrame>,

    state: Mutex<TurnState>,
    echo: Mutex<EchoFilter>,
    history: Mutex<ConversationHistory>,
    voicemail: Mutex<VoicemailDetector>,

    /// User turn being assembled between endpoint and commit
    pending_user_text: Mutex<String>,
    endpoint_at: Mutex<Option<Instant>>,
    last_final_at: Mutex<Option<Instant>>,
    /// Call-control protection window after a forced interruption
    last_interrupt_at: Mutex<Option<Instant>>,

    timing: Mutex<TurnTiming>,
    response_task: Mutex<Option<JoinHandle<()>>>,

    should_end_call: AtomicBool,
    greeting_started: AtomicBool,
    greeting_aborted: AtomicBool,
    user_has_spoken: AtomicBool,
    last_response_was_check_in: AtomicBool,
    /// Dead-air silence base: user speech or content playback finishing
    activity_at: Mutex<Instant>,
    started_at: Instant,
    dropped_frames: AtomicU64,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        call: CallInfo,
        config: Arc<AgentConfig>,
        ledger: Arc<PlaybackLedger>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        generator: Arc<dyn ResponseGenerator>,
        control: Arc<dyn CarrierControl>,
        store: Arc<dyn CallStateStore>,
        log_store: Arc<dyn CallLogStore>,
        stt_audio: mpsc::Sender<AudioFrame>,
    ) -> Arc<Self> {
        let history = ConversationHistory::new(config.history_token_budget);
        Arc::new(Self {
            call: Mutex::new(call),
            config,
            ledger,
            synthesizer,
            generator,
            control,
            store,
            log_store,
            stt_audio,
            state: Mutex::new(TurnState::Idle),
            echo: Mutex::new(EchoFilter::new()),
            history: Mutex::new(history),
            voicemail: Mutex::new(VoicemailDetector::new()),
            pending_user_text: Mutex::new(String::new()),
            endpoint_at: Mutex::new(None),
            last_final_at: Mutex::new(None),
            last_interrupt_at: Mutex::new(None),
            timing: Mutex::new(TurnTiming::new()),
            response_task: Mutex::new(None),
            should_end_call: AtomicBool::new(false),
            greeting_started: AtomicBool::new(false),
            greeting_aborted: AtomicBool::new(false),
            user_has_spoken: AtomicBool::new(false),
            last_response_was_check_in: AtomicBool::new(false),
            activity_at: Mutex::new(Instant::now()),
            started_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> TurnState {
        *self.state.lock()
    }

    pub fn call_id(&self) -> String {
        self.call.lock().call_id.clone()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.call.lock().end_reason
    }

    pub fn dropped_frame_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Flow-node request to end the call after the current response plays
    /// out. The tick loop performs the hangup after the grace period.
    pub fn request_end_call(&self) {
        self.should_end_call.store(true, Ordering::SeqCst);
    }

    /// Main event loop. Returns when the call reaches `Ended`.
    pub async fn run(self: Arc<Self>, mut channels: OrchestratorChannels) {
        let mut tick = tokio::time::interval(Duration::from_millis(50));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = channels.carrier_events.recv() => match event {
                    Some(event) => {
                        if self.handle_carrier_event(event).await {
                            break;
                        }
                    }
                    None => {
                        self.finalize(EndReason::TransportFailure).await;
                        break;
                    }
                },
                Some(event) = channels.stt_events.recv() => {
                    self.handle_stt_event(event).await;
                },
                Some(event) = channels.speech_events.recv() => {
                    self.handle_speech_event(event).await;
                },
                Some(flag) = channels.flags.recv() => {
                    self.handle_flag(flag).await;
                },
                _ = tick.tick() => {
                    self.on_tick().await;
                },
            }

            if self.state() == TurnState::Ended {
                break;
            }
        }
        tracing::info!(call_id = %self.call_id(), "orchestrator loop ended");
    }

    /// Returns true when the loop should stop.
    async fn handle_carrier_event(self: &Arc<Self>, event: CarrierEvent) -> bool {
        match event {
            CarrierEvent::Connected => false,
            CarrierEvent::Started { .. } => {
                self.call.lock().mark_started();
                let _ = self
                    .store
                    .merge(&self.call_id(), CallStateUpdate::new().session_ready(true))
                    .await;
                let _ = self
                    .store
                    .publish_flag(&self.call_id(), ControlFlag::SessionReady)
                    .await;
                let info = self.call.lock().clone();
                if let Err(e) = self.log_store.create_call(&info).await {
                    tracing::warn!(call_id = %self.call_id(), error = %e, "failed to persist call row");
                }
                // Inbound media starting means the call is live even if the
                // answered webhook raced us to another worker
                self.maybe_start_greeting();
                false
            }
            CarrierEvent::Answered => {
                self.call.lock().mark_answered();
                self.maybe_start_greeting();
                false
            }
            CarrierEvent::Audio(frame) => {
                if self.stt_audio.try_send(frame).is_err() {
                    self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                }
                false
            }
            CarrierEvent::PlaybackStarted { playback_id } => {
                self.ledger.register(
                    playback_id.clone(),
                    PlaybackKind::Content,
                    self.ledger.expected_end(),
                );
                let _ = self.store.add_playback_id(&self.call_id(), &playback_id).await;
                false
            }
            CarrierEvent::PlaybackEnded { playback_id } => {
                self.ledger.complete(&playback_id);
                match self.store.remove_playback_id(&self.call_id(), &playback_id).await {
                    Ok(0) => {
                        let _ = self
                            .store
                            .publish_flag(&self.call_id(), ControlFlag::AudioDone)
                            .await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(call_id = %self.call_id(), error = %e, "playback untrack failed")
                    }
                }
                false
            }
            CarrierEvent::MachineDetection { result } => {
                self.handle_amd(result).await;
                self.state() == TurnState::Ended
            }
            CarrierEvent::Hangup { cause } => {
                tracing::info!(call_id = %self.call_id(), cause = %cause, "carrier hangup");
                self.finalize(EndReason::UserHangup).await;
                true
            }
            CarrierEvent::Stopped => {
                if self.state() != TurnState::Ended {
                    self.finalize(EndReason::TransportFailure).await;
                }
                true
            }
        }
    }

    async fn handle_stt_event(self: &Arc<Self>, event: SttEvent) {
        match event {
            SttEvent::Partial { text, .. } => self.handle_partial(&text).await,
            SttEvent::Final { text, .. } => self.handle_final(&text).await,
            SttEvent::Endpoint => {
                *self.endpoint_at.lock() = Some(Instant::now());
                self.timing.lock().mark_user_audio_end();
            }
        }
    }

    async fn handle_partial(self: &Arc<Self>, text: &str) {
        if self.state() == TurnState::Ended {
            return;
        }

        if self.agent_is_active_with_tail() {
            if self.echo.lock().is_echo(text) {
                tracing::debug!(call_id = %self.call_id(), text = %text, "partial discarded as echo");
                return;
            }
            self.maybe_barge_in(text).await;
            return;
        }

        self.note_user_activity().await;
        let mut state = self.state.lock();
        if *state == TurnState::Idle || *state == TurnState::Interrupted {
            *state = TurnState::UserSpeaking;
        }
    }

    async fn handle_final(self: &Arc<Self>, text: &str) {
        if self.state() == TurnState::Ended {
            return;
        }

        if self.agent_is_active_with_tail() {
            if self.echo.lock().is_echo(text) {
                tracing::debug!(call_id = %self.call_id(), text = %text, "final discarded as echo");
                return;
            }
            if is_dropped_while_speaking(text) {
                tracing::debug!(call_id = %self.call_id(), text = %text, "filler final dropped");
                return;
            }
            // Substantive speech over the agent: take the floor, then keep
            // the words for the turn being assembled
            self.maybe_barge_in(text).await;
        }

        self.note_user_activity().await;
        {
            let mut pending = self.pending_user_text.lock();
            if !pending.is_empty() {
                pending.push(' ');
            }
            pending.push_str(text.trim());
        }
        *self.last_final_at.lock() = Some(Instant::now());
        self.timing.lock().mark_stt_transcript_received();

        let mut state = self.state.lock();
        if *state == TurnState::Idle || *state == TurnState::Interrupted {
            *state = TurnState::UserSpeaking;
        }
    }

    async fn handle_speech_event(self: &Arc<Self>, event: SpeechEvent) {
        match event {
            SpeechEvent::FirstChunk { .. } => {
                self.timing.lock().mark_tts_first_chunk();
                {
                    let mut state = self.state.lock();
                    if *state == TurnState::Thinking {
                        *state = TurnState::AgentSpeaking;
                    }
                }
                let _ = self
                    .store
                    .merge(
                        &self.call_id(),
                        CallStateUpdate::new().agent_last_spoke_now(),
                    )
                    .await;
            }
            SpeechEvent::SentenceDone { .. } => {
                self.timing.lock().mark_tts_audio_sent();
                let _ = self
                    .store
                    .merge(
                        &self.call_id(),
                        CallStateUpdate::new().agent_last_spoke_now(),
                    )
                    .await;
            }
            SpeechEvent::FloorReleased => {
                let mut state = self.state.lock();
                if *state == TurnState::AgentSpeaking || *state == TurnState::Thinking {
                    *state = TurnState::Idle;
                }
                drop(state);
                // Check-ins do not reset the silence clock
                if !self.last_response_was_check_in.load(Ordering::SeqCst) {
                    *self.activity_at.lock() = Instant::now();
                }
            }
            SpeechEvent::Cleared => {}
        }
    }

    async fn handle_flag(self: &Arc<Self>, flag: ControlFlag) {
        match flag {
            ControlFlag::AbortGreeting => {
                tracing::info!(call_id = %self.call_id(), "abort-greeting flag received");
                self.greeting_aborted.store(true, Ordering::SeqCst);
                let _ = self.synthesizer.clear_audio().await;
            }
            ControlFlag::AudioDone | ControlFlag::SessionReady => {}
        }
    }

    async fn on_tick(self: &Arc<Self>) {
        self.maybe_commit_user_turn().await;
        self.maybe_complete_hangup().await;
    }

    /// Debounce: commit the buffered user turn 800 ms after the endpoint
    /// signal, as long as no further final arrived inside the 700 ms
    /// coalescing window.
    async fn maybe_commit_user_turn(self: &Arc<Self>) {
        let ready = {
            let endpoint = self.endpoint_at.lock();
            let Some(at) = *endpoint else { return };
            if at.elapsed() < Duration::from_millis(ENDPOINT_DEBOUNCE_MS) {
                return;
            }
            let coalescing = self
                .last_final_at
                .lock()
                .map(|t| t.elapsed() < Duration::from_millis(FINAL_COALESCE_MS))
                .unwrap_or(false);
            !coalescing
        };
        if !ready {
            return;
        }

        *self.endpoint_at.lock() = None;
        let text = {
            let mut pending = self.pending_user_text.lock();
            std::mem::take(&mut *pending)
        };
        *self.last_final_at.lock() = None;

        if text.trim().is_empty() {
            // Spurious endpoint with nothing buffered
            return;
        }
        self.commit_user_turn(text).await;
    }

    async fn commit_user_turn(self: &Arc<Self>, text: String) {
        tracing::info!(call_id = %self.call_id(), text = %text, "user turn committed");
        *self.state.lock() = TurnState::Thinking;

        if self.config.voicemail_detection.enabled {
            let verdict = self.voicemail.lock().assess(&text);
            match verdict {
                VoicemailVerdict::Gatekeeper(digit) => {
                    tracing::info!(call_id = %self.call_id(), digit = %digit, "gatekeeper bypass");
                    let _ = self
                        .control
                        .send_dtmf(&self.call_id(), &digit.to_string())
                        .await;
                    *self.state.lock() = TurnState::Idle;
                    return;
                }
                VoicemailVerdict::Voicemail => {
                    tracing::info!(call_id = %self.call_id(), "voicemail pattern matched");
                    self.hang_up(EndReason::VoicemailDetectedPattern).await;
                    return;
                }
                VoicemailVerdict::Human => {}
            }
        }

        let entry = TranscriptEntry::user(&text);
        if let Err(e) = self.log_store.append_transcript(&self.call_id(), &entry).await {
            tracing::warn!(call_id = %self.call_id(), error = %e, "transcript append failed");
        }
        self.history.lock().push_user(&text);

        self.begin_response(text).await;
    }

    /// Start the response pipeline for a committed user turn. The pending
    /// user buffer was taken before this call, so transcripts arriving
    /// during synthesis accumulate into the next turn, not this one.
    async fn begin_response(self: &Arc<Self>, user_text: String) {
        // Supersede any in-flight generation
        if let Some(task) = self.response_task.lock().take() {
            task.abort();
        }
        self.synthesizer.cancel_pending_sentences();
        self.synthesizer.set_generation_complete(false);
        self.ledger.set_awaiting_first_audio(true);
        self.last_response_was_check_in.store(false, Ordering::SeqCst);

        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new()
                    .agent_generating_response(true)
                    .interrupt_in_progress(false),
            )
            .await;

        self.timing.lock().mark_llm_request_start();

        let this = self.clone();
        let task = tokio::spawn(async move {
            this.run_response_pipeline(user_text).await;
        });
        *self.response_task.lock() = Some(task);
    }

    async fn run_response_pipeline(self: Arc<Self>, user_text: String) {
        let system_prompt = self.compose_system_prompt();
        let history = self.history.lock().entries().to_vec();
        let (sentence_tx, mut sentence_rx) = mpsc::channel::<Sentence>(16);

        let generator = self.generator.clone();
        let generation = tokio::spawn(async move {
            generator
                .generate(&system_prompt, &history, &user_text, sentence_tx)
                .await
        });

        while let Some(sentence) = sentence_rx.recv().await {
            if sentence.is_first {
                self.timing.lock().mark_llm_first_token();
                self.timing.lock().mark_tts_request_start();
            }
            self.deliver_sentence(sentence).await;
        }

        let outcome = match generation.await {
            Ok(result) => result,
            Err(_) => return, // superseded
        };

        match outcome {
            Ok(GenerationOutcome::Complete { sentences, ttft_ms }) => {
                // Backfill the true first-token time from the vendor stream
                if let Some(ttft) = ttft_ms {
                    let mut timing = self.timing.lock();
                    if let Some(start) = timing.llm_request_start {
                        timing.llm_first_token = Some(start + Duration::from_millis(ttft));
                    }
                }
                self.timing.lock().mark_llm_complete();
                self.finish_response(false).await;
                tracing::debug!(call_id = %self.call_id(), sentences, "response generation complete");
            }
            Ok(GenerationOutcome::Cancelled) => {
                // Superseded by a newer turn; clear_audio already ran
                self.synthesizer.set_generation_complete(true);
                let _ = self
                    .store
                    .merge(
                        &self.call_id(),
                        CallStateUpdate::new().agent_generating_response(false),
                    )
                    .await;
            }
            Ok(GenerationOutcome::Empty) => {
                tracing::warn!(call_id = %self.call_id(), "llm returned nothing, speaking fallback");
                self.speak_fallback().await;
                self.finish_response(true).await;
            }
            Err(Error::Timeout(ms)) => {
                tracing::warn!(call_id = %self.call_id(), timeout_ms = ms, "llm timed out, speaking fallback");
                self.speak_fallback().await;
                self.finish_response(true).await;
            }
            Err(e) => {
                tracing::error!(call_id = %self.call_id(), error = %e, "llm failed, speaking fallback");
                self.speak_fallback().await;
                self.finish_response(true).await;
            }
        }
    }

    /// Stream one sentence to TTS and record it everywhere it needs to be:
    /// the echo filter (so the speaker loop can't replay it at us), the
    /// transcript, the history window, and the shared store.
    async fn deliver_sentence(self: &Arc<Self>, sentence: Sentence) {
        self.echo.lock().push_agent_text(&sentence.text);
        let recent = self.echo.lock().recent_texts();
        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new().recent_agent_texts(recent),
            )
            .await;

        let entry = TranscriptEntry::assistant(&sentence.text);
        if let Err(e) = self.log_store.append_transcript(&self.call_id(), &entry).await {
            tracing::warn!(call_id = %self.call_id(), error = %e, "transcript append failed");
        }
        self.history.lock().push_assistant(&sentence.text);

        let voice = Some(self.config.voice_id.clone());
        match self.synthesizer.stream_sentence(sentence, voice).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(call_id = %self.call_id(), "sentence skipped by interrupt");
            }
            Err(e) => {
                tracing::error!(call_id = %self.call_id(), error = %e, "tts stream_sentence failed");
            }
        }
    }

    async fn finish_response(self: &Arc<Self>, degraded: bool) {
        self.synthesizer.set_generation_complete(true);
        self.voicemail.lock().note_exchange();

        let record = {
            let mut timing = self.timing.lock();
            let record = timing.finalize();
            *timing = TurnTiming::new();
            record
        };
        if let Some(ttfs) = record.ttfs_ms {
            metrics::histogram!("parley_ttfs_ms").record(ttfs as f64);
            tracing::info!(call_id = %self.call_id(), ttfs_ms = ttfs, degraded, "turn latency");
        }
        if let Err(e) = self.log_store.append_latency(&self.call_id(), &record).await {
            tracing::warn!(call_id = %self.call_id(), error = %e, "latency append failed");
        }

        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new()
                    .agent_generating_response(false)
                    .ai_has_responded(true)
                    .agent_last_spoke_now(),
            )
            .await;
    }

    async fn speak_fallback(self: &Arc<Self>) {
        let sentence = Sentence::new("One moment please.", 1, true, true);
        self.echo.lock().push_agent_text(&sentence.text);
        let entry = TranscriptEntry::assistant(&sentence.text);
        let _ = self.log_store.append_transcript(&self.call_id(), &entry).await;
        let _ = self
            .synthesizer
            .stream_sentence(sentence, Some(self.config.voice_id.clone()))
            .await;
    }

    /// Barge-in decision: not echo (checked by the caller), ≥ threshold
    /// words, and outside the protection window set by the previous forced
    /// interruption.
    async fn maybe_barge_in(self: &Arc<Self>, text: &str) {
        if !self.config.barge_in_settings.enable_verbose_barge_in {
            return;
        }
        let words = text.split_whitespace().count();
        if words < self.config.barge_in_settings.word_count_threshold {
            return;
        }
        let cooldown = Duration::from_millis(self.config.barge_in_settings.interruption_cooldown_ms);
        if let Some(last) = *self.last_interrupt_at.lock() {
            if last.elapsed() < cooldown {
                tracing::debug!(call_id = %self.call_id(), "barge-in suppressed by cooldown");
                return;
            }
        }
        self.interrupt(text).await;
    }

    /// Accept a barge-in: cancel generation, cut the audio path, and open
    /// the floor for the user's completed utterance.
    pub async fn interrupt(self: &Arc<Self>, trigger_text: &str) {
        tracing::info!(call_id = %self.call_id(), text = %trigger_text, "barge-in accepted");
        metrics::counter!("parley_interruptions_total").increment(1);
        *self.last_interrupt_at.lock() = Some(Instant::now());
        *self.state.lock() = TurnState::Interrupted;

        if let Some(task) = self.response_task.lock().take() {
            task.abort();
        }

        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new()
                    .interrupt_in_progress(true)
                    .agent_generating_response(false),
            )
            .await;

        if let Err(e) = self.synthesizer.clear_audio().await {
            tracing::error!(call_id = %self.call_id(), error = %e, "clear_audio failed");
        }

        // Audio cleared and flags reset: ready for the user's utterance
        *self.state.lock() = TurnState::Idle;
        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new().interrupt_in_progress(false),
            )
            .await;
    }

    async fn handle_amd(self: &Arc<Self>, result: AmdResult) {
        if !self.config.voicemail_detection.enabled
            || !self.config.voicemail_detection.use_carrier_amd
        {
            return;
        }
        match result {
            AmdResult::Machine => {
                tracing::info!(call_id = %self.call_id(), "carrier amd: machine");
                self.greeting_aborted.store(true, Ordering::SeqCst);
                let _ = self
                    .store
                    .merge(
                        &self.call_id(),
                        CallStateUpdate::new().voicemail_detected(true),
                    )
                    .await;
                // Visible across workers so a greeting mid-synthesis
                // elsewhere aborts too
                let _ = self
                    .store
                    .publish_flag(&self.call_id(), ControlFlag::AbortGreeting)
                    .await;
                let _ = self.synthesizer.clear_audio().await;
                self.hang_up(EndReason::VoicemailDetectedAmd).await;
            }
            AmdResult::Human | AmdResult::NotSure => {
                tracing::debug!(call_id = %self.call_id(), result = ?result, "carrier amd verdict");
            }
        }
    }

    /// Who-speaks-first, gated by the AMD wait for outbound calls.
    fn maybe_start_greeting(self: &Arc<Self>) {
        if self.greeting_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.greeting_flow().await;
        });
    }

    async fn greeting_flow(self: &Arc<Self>) {
        use parley_config::WhoSpeaksFirst;

        // Outbound: give AMD a chance to veto the greeting
        let vm = &self.config.voicemail_detection;
        if vm.enabled && vm.use_carrier_amd && self.is_outbound() {
            let deadline = Instant::now() + Duration::from_millis(vm.amd_wait_before_greeting_ms);
            while Instant::now() < deadline {
                if self.greeting_aborted.load(Ordering::SeqCst)
                    || self.state() == TurnState::Ended
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        if self.greeting_aborted.load(Ordering::SeqCst) || self.state() == TurnState::Ended {
            return;
        }

        match self.config.start_node.who_speaks_first {
            WhoSpeaksFirst::Ai => self.speak_greeting().await,
            WhoSpeaksFirst::User => {
                if !self.config.start_node.ai_speaks_after_silence {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(
                    self.config.start_node.silence_timeout_ms,
                ))
                .await;
                if self.user_has_spoken.load(Ordering::SeqCst)
                    || self.greeting_aborted.load(Ordering::SeqCst)
                    || self.state() != TurnState::Idle
                {
                    return;
                }
                let _ = self
                    .store
                    .merge(
                        &self.call_id(),
                        CallStateUpdate::new().silence_greeting_triggered(true),
                    )
                    .await;
                self.speak_greeting().await;
            }
        }
    }

    async fn speak_greeting(self: &Arc<Self>) {
        let greeting = self.config.greeting.trim().to_string();
        if greeting.is_empty() {
            return;
        }
        tracing::info!(call_id = %self.call_id(), "speaking greeting");
        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new().greeting_in_flight(true),
            )
            .await;

        self.synthesizer.set_generation_complete(false);
        self.ledger.set_awaiting_first_audio(true);
        *self.state.lock() = TurnState::Thinking;

        let sentence = Sentence::new(&greeting, 1, true, true);
        self.deliver_sentence(sentence).await;
        self.synthesizer.set_generation_complete(true);

        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new()
                    .greeting_in_flight(false)
                    .ai_has_responded(true)
                    .agent_last_spoke_now(),
            )
            .await;
    }

    fn compose_system_prompt(&self) -> String {
        let kb = self.config.knowledge_base.trim();
        if kb.is_empty() {
            self.config.system_prompt.clone()
        } else {
            format!("{}\n\n{}", self.config.system_prompt, kb)
        }
    }

    fn is_outbound(&self) -> bool {
        self.call.lock().direction == parley_core::CallDirection::Outbound
    }

    /// "Agent is busy" including the small network-propagation buffer after
    /// the expected playback end.
    fn agent_is_active_with_tail(&self) -> bool {
        if self.ledger.agent_is_active() {
            return true;
        }
        let tail = Duration::from_millis(PLAYBACK_TAIL_MS);
        self.ledger.expected_end() + tail > Instant::now()
    }

    async fn note_user_activity(self: &Arc<Self>) {
        *self.activity_at.lock() = Instant::now();
        if !self.user_has_spoken.swap(true, Ordering::SeqCst) {
            let _ = self
                .store
                .merge(&self.call_id(), CallStateUpdate::new().user_has_spoken(true))
                .await;
        }
    }

    /// Ending-node hangup: wait out the expected playback end plus a grace
    /// period, then drop the call.
    async fn maybe_complete_hangup(self: &Arc<Self>) {
        if !self.should_end_call.load(Ordering::SeqCst) || self.state() == TurnState::Ended {
            return;
        }
        if self.ledger.agent_is_active() {
            return;
        }
        let grace = Duration::from_millis(HANGUP_GRACE_MS);
        if self.ledger.expected_end() + grace > Instant::now() {
            return;
        }
        self.hang_up(EndReason::Completed).await;
    }

    /// The single hangup action: carrier REST hangup, then finalization.
    pub async fn hang_up(&self, reason: EndReason) {
        if self.state() == TurnState::Ended {
            return;
        }
        if let Err(e) = self.control.hangup(&self.call_id()).await {
            tracing::warn!(call_id = %self.call_id(), error = %e, "carrier hangup failed");
        }
        self.finalize(reason).await;
    }

    /// Close out the call exactly once: state, persistence, tasks.
    async fn finalize(&self, reason: EndReason) {
        {
            let mut state = self.state.lock();
            if *state == TurnState::Ended {
                return;
            }
            *state = TurnState::Ended;
        }
        if let Some(task) = self.response_task.lock().take() {
            task.abort();
        }

        let info = {
            let mut call = self.call.lock();
            call.mark_ended(reason);
            call.clone()
        };
        if let Err(e) = self.log_store.finalize_call(&info).await {
            tracing::warn!(call_id = %info.call_id, error = %e, "call finalize persist failed");
        }
        tracing::info!(call_id = %info.call_id, reason = reason.as_str(), "call finalized");
    }
}

#[async_trait]
impl DeadAirHooks for TurnOrchestrator {
    fn last_activity(&self) -> Instant {
        *self.activity_at.lock()
    }

    fn agent_is_active(&self) -> bool {
        self.ledger.agent_is_active()
    }

    fn call_started(&self) -> Instant {
        self.started_at
    }

    async fn check_in(&self, number: u32) -> bool {
        if self.state() == TurnState::Ended {
            return false;
        }
        let prompt = self.config.check_in_prompt.clone();
        if prompt.is_empty() {
            return false;
        }
        tracing::info!(call_id = %self.call_id(), number, "synthesizing check-in");

        self.last_response_was_check_in.store(true, Ordering::SeqCst);
        self.synthesizer.set_playback_kind(PlaybackKind::CheckIn);
        self.synthesizer.set_generation_complete(false);

        let sentence = Sentence::new(&prompt, 1, true, true);
        self.echo.lock().push_agent_text(&prompt);
        let entry = TranscriptEntry::assistant(&prompt);
        let _ = self.log_store.append_transcript(&self.call_id(), &entry).await;
        self.history.lock().push_assistant(&prompt);

        let result = self
            .synthesizer
            .stream_sentence(sentence, Some(self.config.voice_id.clone()))
            .await;
        self.synthesizer.set_generation_complete(true);
        self.synthesizer.set_playback_kind(PlaybackKind::Content);

        let _ = self
            .store
            .merge(
                &self.call_id(),
                CallStateUpdate::new().agent_last_spoke_now(),
            )
            .await;

        result.unwrap_or(false)
    }

    async fn end_call(&self, reason: EndReason) {
        self.hang_up(reason).await;
    }
}
