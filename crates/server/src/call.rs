//! Per-call runtime assembly and registry

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parley_carrier::{CarrierEvent, CarrierSession, EgressThrottle};
use parley_config::{AgentConfig, LlmProvider, Settings, SttProvider, TtsProvider};
use parley_core::{
    traits::SpeechEvent, CallDirection, CallInfo, PlaybackLedger, ResponseGenerator,
};
use parley_llm::{LlmFactory, LlmSession};
use parley_orchestrator::{DeadAirMonitor, OrchestratorChannels, TurnOrchestrator};
use parley_stt::SttSession;
use parley_tts::{ComfortNoiseEmitter, PersistentTtsSession, TtsEvent};

use crate::state::AppState;
use crate::ServerError;

/// Everything alive for one call on this worker. Process-local hot state
/// (sessions, ledger, task handles) lives here, never in the shared store.
pub struct CallRuntime {
    pub call_id: String,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub ledger: Arc<PlaybackLedger>,
    /// Injects webhook-delivered events into the call's ordered stream
    pub injector: mpsc::Sender<CarrierEvent>,
    carrier: CarrierSession,
    stt: SttSession,
    tts: Arc<PersistentTtsSession>,
    comfort_noise: Option<ComfortNoiseEmitter>,
    aux_tasks: Vec<JoinHandle<()>>,
}

impl CallRuntime {
    pub async fn shutdown(&self) {
        for task in &self.aux_tasks {
            task.abort();
        }
        if let Some(noise) = &self.comfort_noise {
            noise.stop();
        }
        self.stt.shutdown();
        self.tts.close().await;
        self.carrier.shutdown();
    }
}

/// Live calls on this worker, capacity-capped.
pub struct CallRegistry {
    calls: DashMap<String, Arc<CallRuntime>>,
    max_calls: usize,
}

impl CallRegistry {
    pub fn new(max_calls: usize) -> Self {
        Self {
            calls: DashMap::new(),
            max_calls,
        }
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallRuntime>> {
        self.calls.get(call_id).map(|r| r.clone())
    }

    pub fn insert(&self, runtime: Arc<CallRuntime>) -> Result<(), ServerError> {
        if self.calls.len() >= self.max_calls {
            return Err(ServerError::Capacity(format!(
                "at capacity ({} calls)",
                self.max_calls
            )));
        }
        self.calls.insert(runtime.call_id.clone(), runtime);
        Ok(())
    }

    pub async fn remove(&self, call_id: &str) {
        if let Some((_, runtime)) = self.calls.remove(call_id) {
            runtime.shutdown().await;
            tracing::info!(call_id = %call_id, "call runtime removed");
        }
    }

    pub fn count(&self) -> usize {
        self.calls.len()
    }
}

fn stt_api_key(settings: &Settings, provider: SttProvider) -> String {
    match provider {
        SttProvider::Deepgram => settings.vendors.deepgram_api_key.clone(),
        SttProvider::Soniox => settings.vendors.soniox_api_key.clone(),
        SttProvider::Assemblyai => settings.vendors.assemblyai_api_key.clone(),
    }
}

fn llm_api_key(settings: &Settings, provider: LlmProvider) -> String {
    match provider {
        LlmProvider::Openai => settings.vendors.openai_api_key.clone(),
        LlmProvider::Groq => settings.vendors.groq_api_key.clone(),
        LlmProvider::Grok => settings.vendors.xai_api_key.clone(),
        LlmProvider::Anthropic => settings.vendors.anthropic_api_key.clone(),
        LlmProvider::Gemini => settings.vendors.gemini_api_key.clone(),
    }
}

fn tts_api_key(settings: &Settings, provider: TtsProvider) -> String {
    match provider {
        TtsProvider::Elevenlabs => settings.vendors.elevenlabs_api_key.clone(),
        TtsProvider::Cartesia => settings.vendors.cartesia_api_key.clone(),
        TtsProvider::Hume => settings.vendors.hume_api_key.clone(),
        // Maya reads its credential from the environment
        TtsProvider::Maya => String::new(),
    }
}

/// Build and start every per-call task from an accepted media socket.
pub async fn start_call(
    state: &AppState,
    socket: WebSocket,
    call_id: String,
    agent_id: String,
    direction: CallDirection,
) -> Result<Arc<CallRuntime>, ServerError> {
    // Immutable agent snapshot for the call's lifetime
    let config: Arc<AgentConfig> = match state.log_store.get_agent(&agent_id).await {
        Ok(Some(config)) => Arc::new(config),
        Ok(None) => {
            tracing::warn!(agent_id = %agent_id, "agent not found, using defaults");
            Arc::new(AgentConfig::default())
        }
        Err(e) => return Err(e.into()),
    };

    let ledger = Arc::new(PlaybackLedger::new());
    let throttle: Arc<dyn EgressThrottle> = ledger.clone();
    let (carrier, carrier_events) = CarrierSession::start(socket, Some(throttle));

    let (stt, stt_events) = SttSession::connect(
        config.clone(),
        stt_api_key(&state.settings, config.stt_provider),
    )
    .await
    .map_err(|e| ServerError::CallSetup(format!("stt: {e}")))?;

    let tts = Arc::new(
        PersistentTtsSession::connect(
            call_id.clone(),
            config.clone(),
            tts_api_key(&state.settings, config.tts_provider),
            ledger.clone(),
            carrier.egress(),
        )
        .await
        .map_err(|e| ServerError::CallSetup(format!("tts: {e}")))?,
    );

    let backend = LlmFactory::create(
        config.llm_provider,
        &config.llm_model,
        &llm_api_key(&state.settings, config.llm_provider),
    )
    .map_err(|e| ServerError::CallSetup(format!("llm: {e}")))?;
    let generator: Arc<dyn ResponseGenerator> = Arc::new(LlmSession::new(backend));

    // Bridge TTS playback notifications into the orchestrator's loop
    let (speech_tx, speech_events) = mpsc::channel(64);
    let mut tts_events = tts.subscribe();
    let speech_bridge = tokio::spawn(async move {
        while let Ok(event) = tts_events.recv().await {
            let mapped = match event {
                TtsEvent::FirstChunk { sentence_num } => {
                    Some(SpeechEvent::FirstChunk { sentence_num })
                }
                TtsEvent::SentenceDone {
                    sentence_num,
                    mulaw_bytes,
                } => Some(SpeechEvent::SentenceDone {
                    sentence_num,
                    mulaw_bytes,
                }),
                TtsEvent::FloorReleased => Some(SpeechEvent::FloorReleased),
                TtsEvent::Cleared => Some(SpeechEvent::Cleared),
                TtsEvent::SentenceQueued { .. } | TtsEvent::Error(_) => None,
            };
            if let Some(mapped) = mapped {
                if speech_tx.send(mapped).await.is_err() {
                    break;
                }
            }
        }
    });

    let flags = state
        .store
        .subscribe_flags(&call_id)
        .await
        .map_err(ServerError::from)?;

    let call = CallInfo::new(&call_id, &agent_id, direction, "", "");
    let orchestrator = TurnOrchestrator::new(
        call,
        config.clone(),
        ledger.clone(),
        tts.clone(),
        generator,
        state.control.clone(),
        state.store.clone(),
        state.log_store.clone(),
        stt.audio_sender(),
    );

    let injector = carrier.injector();

    let dead_air = DeadAirMonitor::spawn(config.clone(), orchestrator.clone());

    let comfort_noise = config
        .enable_comfort_noise
        .then(|| ComfortNoiseEmitter::spawn(ledger.clone(), carrier.egress()));

    // The main loop; its completion tears the call down. Not tracked in
    // aux_tasks: it must survive its own teardown call.
    {
        let orchestrator = orchestrator.clone();
        let registry_state = state.clone();
        let call_id = call_id.clone();
        tokio::spawn(async move {
            orchestrator
                .run(OrchestratorChannels {
                    carrier_events,
                    stt_events,
                    speech_events,
                    flags,
                })
                .await;
            registry_state.calls.remove(&call_id).await;
        });
    }

    let runtime = Arc::new(CallRuntime {
        call_id: call_id.clone(),
        orchestrator,
        ledger,
        injector,
        carrier,
        stt,
        tts,
        comfort_noise,
        aux_tasks: vec![speech_bridge, dead_air],
    });

    state.calls.insert(runtime.clone())?;
    metrics::gauge!("parley_active_calls").set(state.calls.count() as f64);
    tracing::info!(call_id = %call_id, agent_id = %agent_id, "call runtime started");

    Ok(runtime)
}
