//! Provider routing

use std::sync::Arc;
use std::time::Duration;

use parley_config::constants::endpoints;
use parley_config::constants::vendors::LLM_GENERATION_TIMEOUT_SECS;
use parley_config::LlmProvider;

use crate::backend::{BackendConfig, LlmBackend, OpenAiCompatBackend};
use crate::LlmError;

pub struct LlmFactory;

impl LlmFactory {
    /// Build a backend for the agent's provider choice. Every provider is an
    /// OpenAI-compatible endpoint; only the base URL and credential differ.
    pub fn create(
        provider: LlmProvider,
        model: &str,
        api_key: &str,
    ) -> Result<Arc<dyn LlmBackend>, LlmError> {
        let endpoint = match provider {
            LlmProvider::Openai => endpoints::OPENAI_DEFAULT.clone(),
            LlmProvider::Groq => endpoints::GROQ_DEFAULT.clone(),
            LlmProvider::Grok => endpoints::XAI_DEFAULT.clone(),
            LlmProvider::Anthropic => endpoints::ANTHROPIC_DEFAULT.clone(),
            LlmProvider::Gemini => endpoints::GEMINI_DEFAULT.clone(),
        };

        let backend = OpenAiCompatBackend::new(BackendConfig {
            endpoint,
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(LLM_GENERATION_TIMEOUT_SECS),
            ..Default::default()
        })?;

        Ok(Arc::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_each_provider() {
        for provider in [
            LlmProvider::Openai,
            LlmProvider::Groq,
            LlmProvider::Grok,
            LlmProvider::Anthropic,
            LlmProvider::Gemini,
        ] {
            let backend = LlmFactory::create(provider, "some-model", "key").unwrap();
            assert_eq!(backend.model_name(), "some-model");
        }
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(LlmFactory::create(LlmProvider::Openai, "m", "").is_err());
    }
}
