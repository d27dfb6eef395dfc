//! Streaming LLM integration
//!
//! All supported providers speak the OpenAI-compatible chat protocol with
//! `stream = true`; routing is a base-URL + credential choice. Tokens are
//! accumulated and re-emitted as complete sentences so TTS can start long
//! before generation finishes.

pub mod backend;
pub mod factory;
pub mod prompt;
pub mod session;
pub mod splitter;

pub use backend::{BackendConfig, FinishReason, LlmBackend, OpenAiCompatBackend, StreamResult};
pub use factory::LlmFactory;
pub use prompt::{build_messages, Message, Role};
pub use session::LlmSession;
pub use splitter::SentenceSplitter;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("network: {0}")]
    Network(String),

    #[error("api: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("generation timed out")]
    Timeout,

    #[error("empty response")]
    Empty,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

impl LlmError {
    /// Transient failures worth a retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}
