//! Turn orchestration
//!
//! The per-call brain. Everything that decides who may speak lives here,
//! concentrated into one module per rule so each is testable in isolation:
//!
//! - [`echo`]: discard the agent's own audio coming back through the
//!   carrier speaker loop
//! - [`filler`]: backchannel finals that must not become LLM turns
//! - [`voicemail`]: transcript-side voicemail and gatekeeper detection
//! - [`dead_air`]: check-ins and call caps under silence
//! - [`orchestrator`]: the state machine tying them to the sessions

pub mod dead_air;
pub mod echo;
pub mod filler;
pub mod orchestrator;
pub mod voicemail;

pub use dead_air::{DeadAirHooks, DeadAirMonitor};
pub use echo::EchoFilter;
pub use filler::is_dropped_while_speaking;
pub use orchestrator::{OrchestratorChannels, TurnOrchestrator};
pub use voicemail::{VoicemailDetector, VoicemailVerdict};
