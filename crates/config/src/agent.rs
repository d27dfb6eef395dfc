//! Per-agent configuration snapshot
//!
//! Loaded from the `agents` collection when a call starts and frozen for the
//! call's lifetime. Every field has a serde default so partially configured
//! agents behave sensibly.

use serde::{Deserialize, Serialize};

/// Streaming STT vendor routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SttProvider {
    Soniox,
    #[default]
    Deepgram,
    Assemblyai,
}

/// Streaming LLM vendor routing. All providers speak the OpenAI-compatible
/// chat protocol with `stream = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Openai,
    Grok,
    Groq,
    Anthropic,
    Gemini,
}

/// Streaming TTS vendor routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TtsProvider {
    #[default]
    Elevenlabs,
    Cartesia,
    Hume,
    /// HTTP chunked streaming at 24 kHz PCM, resampled to 8 kHz μ-law
    Maya,
}

/// Expressiveness knobs forwarded in the TTS vendor init frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.4,
            similarity_boost: 0.75,
            style: 0.2,
            use_speaker_boost: true,
        }
    }
}

/// Answering-machine detection mode offered by the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmdMode {
    #[default]
    Basic,
    Premium,
}

/// Voicemail / machine detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicemailConfig {
    pub enabled: bool,
    /// Use the carrier's AMD in addition to the transcript pattern matcher
    pub use_carrier_amd: bool,
    pub amd_mode: AmdMode,
    /// How long an outbound greeting waits for the AMD verdict
    pub amd_wait_before_greeting_ms: u64,
}

impl Default for VoicemailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_carrier_amd: true,
            amd_mode: AmdMode::Basic,
            amd_wait_before_greeting_ms: 2500,
        }
    }
}

/// Who opens the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WhoSpeaksFirst {
    #[default]
    Ai,
    User,
}

/// Start-node behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartNodeConfig {
    pub who_speaks_first: WhoSpeaksFirst,
    /// With user-first opens: speak proactively after `silence_timeout_ms`
    /// of nothing, unless the user has already spoken
    pub ai_speaks_after_silence: bool,
    pub silence_timeout_ms: u64,
}

impl Default for StartNodeConfig {
    fn default() -> Self {
        Self {
            who_speaks_first: WhoSpeaksFirst::Ai,
            ai_speaks_after_silence: false,
            silence_timeout_ms: 4000,
        }
    }
}

/// Barge-in policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BargeInSettings {
    pub enable_verbose_barge_in: bool,
    /// Minimum words in a partial transcript to take the floor
    pub word_count_threshold: usize,
    /// Call-control protection window after a forced interruption (ms)
    pub interruption_cooldown_ms: u64,
}

impl Default for BargeInSettings {
    fn default() -> Self {
        Self {
            enable_verbose_barge_in: true,
            word_count_threshold: 3,
            interruption_cooldown_ms: 1000,
        }
    }
}

/// Immutable per-call agent snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,

    // Provider routing
    #[serde(default)]
    pub stt_provider: SttProvider,
    #[serde(default)]
    pub llm_provider: LlmProvider,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub tts_provider: TtsProvider,
    #[serde(default)]
    pub voice_id: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default)]
    pub voice_settings: VoiceSettings,

    // Prompts
    #[serde(default)]
    pub system_prompt: String,
    /// Opening line for AI-first calls and silence greetings
    #[serde(default)]
    pub greeting: String,
    /// Opaque knowledge-base context appended to the system prompt by an
    /// external collaborator; not indexed or retrieved here
    #[serde(default)]
    pub knowledge_base: String,
    /// Utterance spoken by dead-air check-ins
    #[serde(default = "default_check_in_prompt")]
    pub check_in_prompt: String,

    // Timing
    /// STT turn-end sensitivity forwarded to the vendor (ms)
    #[serde(default = "default_endpointing_ms")]
    pub endpointing_ms: u64,
    /// Dead-air thresholds, ascending (ms)
    #[serde(default = "default_silence_check_in_ms")]
    pub silence_check_in_ms: Vec<u64>,
    #[serde(default = "default_max_check_ins")]
    pub max_check_ins: u32,
    #[serde(default = "default_max_call_seconds")]
    pub max_call_seconds: u64,

    // Features
    #[serde(default)]
    pub enable_comfort_noise: bool,
    #[serde(default)]
    pub voicemail_detection: VoicemailConfig,
    #[serde(default)]
    pub start_node: StartNodeConfig,
    #[serde(default)]
    pub barge_in_settings: BargeInSettings,

    /// Token budget for the LLM conversation window
    #[serde(default = "default_history_token_budget")]
    pub history_token_budget: usize,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_tts_model() -> String {
    "eleven_flash_v2_5".to_string()
}

fn default_check_in_prompt() -> String {
    "Are you still there?".to_string()
}

fn default_endpointing_ms() -> u64 {
    400
}

fn default_silence_check_in_ms() -> Vec<u64> {
    vec![5000, 10_000, 20_000]
}

fn default_max_check_ins() -> u32 {
    2
}

fn default_max_call_seconds() -> u64 {
    1800
}

fn default_history_token_budget() -> usize {
    3000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: "default".to_string(),
            name: "default".to_string(),
            stt_provider: SttProvider::default(),
            llm_provider: LlmProvider::default(),
            llm_model: default_llm_model(),
            tts_provider: TtsProvider::default(),
            voice_id: String::new(),
            tts_model: default_tts_model(),
            voice_settings: VoiceSettings::default(),
            system_prompt: String::new(),
            greeting: String::new(),
            knowledge_base: String::new(),
            check_in_prompt: default_check_in_prompt(),
            endpointing_ms: default_endpointing_ms(),
            silence_check_in_ms: default_silence_check_in_ms(),
            max_check_ins: default_max_check_ins(),
            max_call_seconds: default_max_call_seconds(),
            enable_comfort_noise: false,
            voicemail_detection: VoicemailConfig::default(),
            start_node: StartNodeConfig::default(),
            barge_in_settings: BargeInSettings::default(),
            history_token_budget: default_history_token_budget(),
        }
    }
}
