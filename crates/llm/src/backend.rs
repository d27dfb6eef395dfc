//! OpenAI-compatible streaming backend
//!
//! SSE chat completions with retry on transient failures. A closed delta
//! channel means the caller cancelled; the stream is dropped (which aborts
//! the HTTP request) and the result reports `Cancelled` rather than an error.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::Message;
use crate::LlmError;

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Why a stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Cancelled,
}

/// Result of one streamed completion.
#[derive(Debug, Clone)]
pub struct StreamResult {
    pub text: String,
    pub chunks: usize,
    pub time_to_first_token_ms: Option<u64>,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Streaming chat backend.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Stream a completion, pushing each content delta into `delta_tx`.
    async fn stream_chat(
        &self,
        messages: &[Message],
        delta_tx: mpsc::Sender<String>,
    ) -> Result<StreamResult, LlmError>;

    fn model_name(&self) -> &str;
}

/// Works against OpenAI, Groq, x.ai, and the OpenAI-compatible surfaces of
/// Anthropic and Gemini.
pub struct OpenAiCompatBackend {
    client: Client,
    config: BackendConfig,
}

impl OpenAiCompatBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration("api key required".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "llm request retry"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self
                .client
                .post(self.chat_url())
                .bearer_auth(&self.config.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    let err = if status.is_server_error() {
                        LlmError::Network(format!("server error {status}: {body}"))
                    } else {
                        return Err(LlmError::Api(format!("{status}: {body}")));
                    };
                    last_error = Some(err);
                }
                Err(e) => {
                    let err = LlmError::from(e);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("retries exhausted".to_string())))
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatBackend {
    async fn stream_chat(
        &self,
        messages: &[Message],
        delta_tx: mpsc::Sender<String>,
    ) -> Result<StreamResult, LlmError> {
        let start = std::time::Instant::now();

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            top_p: Some(self.config.top_p),
            stream: true,
        };

        let response = self.open_stream(&request).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();
        let mut chunks = 0usize;
        let mut first_token: Option<u64> = None;

        while let Some(piece) = stream.next().await {
            let piece = piece.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&piece));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..=line_end);

                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }
                let Some(json) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(chunk) = serde_json::from_str::<StreamChunk>(json) else {
                    continue;
                };

                let Some(content) = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta)
                    .and_then(|d| d.content)
                else {
                    continue;
                };
                if content.is_empty() {
                    continue;
                }

                first_token.get_or_insert_with(|| start.elapsed().as_millis() as u64);
                full_text.push_str(&content);
                chunks += 1;

                if delta_tx.send(content).await.is_err() {
                    // Caller cancelled; dropping the stream aborts the request
                    return Ok(StreamResult {
                        text: full_text,
                        chunks,
                        time_to_first_token_ms: first_token,
                        total_time_ms: start.elapsed().as_millis() as u64,
                        finish_reason: FinishReason::Cancelled,
                    });
                }
            }
        }

        if full_text.trim().is_empty() {
            return Err(LlmError::Empty);
        }

        Ok(StreamResult {
            text: full_text,
            chunks,
            time_to_first_token_ms: first_token,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::Stop,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_rejected() {
        assert!(OpenAiCompatBackend::new(BackendConfig::default()).is_err());
    }

    #[test]
    fn test_chat_url() {
        let backend = OpenAiCompatBackend::new(BackendConfig {
            api_key: "k".to_string(),
            endpoint: "https://api.groq.com/openai/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            backend.chat_url(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("Hello")],
            max_tokens: Some(256),
            temperature: Some(0.7),
            top_p: Some(0.9),
            stream: true,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""stream":true"#));
        assert!(json.contains(r#""role":"user"#));
    }

    #[test]
    fn test_stream_chunk_parse() {
        let json = r#"{"id":"x","choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        assert_eq!(
            chunk.choices[0].delta.as_ref().unwrap().content.as_deref(),
            Some("Hel")
        );
    }
}
