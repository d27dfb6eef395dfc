//! Configuration for the parley voice-agent orchestrator
//!
//! - [`AgentConfig`]: per-agent snapshot taken at call start and immutable
//!   for the call's lifetime (provider routing, voice, prompts, timing knobs)
//! - [`Settings`]: process-level settings loaded from file + environment
//! - [`constants`]: timing constants shared across crates

pub mod agent;
pub mod constants;
pub mod settings;

pub use agent::{
    AgentConfig, AmdMode, BargeInSettings, LlmProvider, SttProvider, StartNodeConfig,
    TtsProvider, VoiceSettings, VoicemailConfig, WhoSpeaksFirst,
};
pub use settings::{ConfigError, Settings};
