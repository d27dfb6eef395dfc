//! Per-turn generation session
//!
//! Implements the orchestrator's `ResponseGenerator` seam: builds the chat
//! request, consumes the token stream, and pushes each completed sentence
//! into the sink. Cancellation (sink closed or task aborted) is a normal
//! completion path; a 30 s ceiling bounds every generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use parley_config::constants::vendors::LLM_GENERATION_TIMEOUT_SECS;
use parley_core::{
    traits::{GenerationOutcome, ResponseGenerator},
    Error, Result, Sentence, TranscriptEntry,
};

use crate::backend::{FinishReason, LlmBackend};
use crate::prompt::build_messages;
use crate::splitter::SentenceSplitter;
use crate::LlmError;

pub struct LlmSession {
    backend: Arc<dyn LlmBackend>,
}

impl LlmSession {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

#[async_trait]
impl ResponseGenerator for LlmSession {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[TranscriptEntry],
        user_turn: &str,
        sink: mpsc::Sender<Sentence>,
    ) -> Result<GenerationOutcome> {
        let messages = build_messages(system_prompt, history, user_turn);
        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);

        let backend = self.backend.clone();
        let stream_task =
            tokio::spawn(async move { backend.stream_chat(&messages, delta_tx).await });

        let deadline = Duration::from_secs(LLM_GENERATION_TIMEOUT_SECS);
        let mut splitter = SentenceSplitter::new();
        let mut count: u32 = 0;
        // Held back one step so the final sentence can carry `is_last`
        let mut pending: Option<String> = None;
        let mut cancelled = false;

        let consume = async {
            while let Some(delta) = delta_rx.recv().await {
                for text in splitter.push(&delta) {
                    if let Some(prev) = pending.replace(text) {
                        count += 1;
                        let sentence = Sentence::new(prev, count, count == 1, false);
                        if sink.send(sentence).await.is_err() {
                            return false;
                        }
                    }
                }
            }
            true
        };

        let finished = match tokio::time::timeout(deadline, consume).await {
            Ok(finished) => finished,
            Err(_) => {
                stream_task.abort();
                return Err(Error::Timeout(deadline.as_millis() as u64));
            }
        };
        if !finished {
            cancelled = true;
        }

        let stream_result = match stream_task.await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(LlmError::Empty)) => {
                return Ok(GenerationOutcome::Empty);
            }
            Ok(Err(LlmError::Timeout)) => {
                return Err(Error::Timeout(deadline.as_millis() as u64));
            }
            Ok(Err(e)) => {
                return Err(Error::vendor("llm", e.to_string()));
            }
            Err(_) => None,
        };

        if cancelled || matches!(stream_result.as_ref().map(|r| r.finish_reason), Some(FinishReason::Cancelled)) {
            return Ok(GenerationOutcome::Cancelled);
        }

        // Flush the remainder, then release the held-back sentence as last
        if let Some(rest) = splitter.flush() {
            if let Some(prev) = pending.replace(rest) {
                count += 1;
                if sink
                    .send(Sentence::new(prev, count, count == 1, false))
                    .await
                    .is_err()
                {
                    return Ok(GenerationOutcome::Cancelled);
                }
            }
        }
        if let Some(last) = pending.take() {
            count += 1;
            if sink
                .send(Sentence::new(last, count, count == 1, true))
                .await
                .is_err()
            {
                return Ok(GenerationOutcome::Cancelled);
            }
        }

        if count == 0 {
            return Ok(GenerationOutcome::Empty);
        }

        let ttft_ms = stream_result.and_then(|r| r.time_to_first_token_ms);
        tracing::debug!(sentences = count, ttft_ms = ?ttft_ms, "generation complete");

        Ok(GenerationOutcome::Complete {
            sentences: count,
            ttft_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StreamResult;

    /// Backend double that replays scripted deltas.
    struct ScriptedBackend {
        deltas: Vec<&'static str>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn stream_chat(
            &self,
            _messages: &[crate::prompt::Message],
            delta_tx: mpsc::Sender<String>,
        ) -> std::result::Result<StreamResult, LlmError> {
            let mut text = String::new();
            for d in &self.deltas {
                text.push_str(d);
                if delta_tx.send(d.to_string()).await.is_err() {
                    return Ok(StreamResult {
                        text,
                        chunks: 0,
                        time_to_first_token_ms: Some(5),
                        total_time_ms: 10,
                        finish_reason: FinishReason::Cancelled,
                    });
                }
            }
            if text.trim().is_empty() {
                return Err(LlmError::Empty);
            }
            Ok(StreamResult {
                text,
                chunks: self.deltas.len(),
                time_to_first_token_ms: Some(5),
                total_time_ms: 10,
                finish_reason: FinishReason::Stop,
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_sentences_ordered_with_last_marked() {
        let session = LlmSession::new(Arc::new(ScriptedBackend {
            deltas: vec!["Sure, I can", " help. What day", " works? Great."],
        }));
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = session.generate("sys", &[], "user turn", tx).await.unwrap();
        assert!(matches!(outcome, GenerationOutcome::Complete { sentences: 3, .. }));

        let mut got = Vec::new();
        while let Some(s) = rx.recv().await {
            got.push(s);
        }
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].text, "Sure, I can help.");
        assert!(got[0].is_first);
        assert!(!got[0].is_last);
        assert_eq!(got[1].sentence_num, 2);
        assert!(got[2].is_last);
        assert_eq!(got[2].text, "Great.");
    }

    #[tokio::test]
    async fn test_unterminated_tail_flushed_as_last() {
        let session = LlmSession::new(Arc::new(ScriptedBackend {
            deltas: vec!["One moment please"],
        }));
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = session.generate("sys", &[], "u", tx).await.unwrap();
        assert!(matches!(outcome, GenerationOutcome::Complete { sentences: 1, .. }));

        let s = rx.recv().await.unwrap();
        assert_eq!(s.text, "One moment please");
        assert!(s.is_first && s.is_last);
    }

    #[tokio::test]
    async fn test_closed_sink_is_cancellation() {
        let session = LlmSession::new(Arc::new(ScriptedBackend {
            deltas: vec!["First sentence. Second sentence. Third sentence."],
        }));
        let (tx, mut rx) = mpsc::channel(1);
        // Take the first sentence then hang up
        let outcome_fut = tokio::spawn({
            let session_backend = session.backend.clone();
            async move {
                LlmSession::new(session_backend)
                    .generate("sys", &[], "u", tx)
                    .await
            }
        });
        let first = rx.recv().await.unwrap();
        assert!(first.is_first);
        drop(rx);

        let outcome = outcome_fut.await.unwrap().unwrap();
        assert_eq!(outcome, GenerationOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_stream_reports_empty() {
        let session = LlmSession::new(Arc::new(ScriptedBackend { deltas: vec![] }));
        let (tx, _rx) = mpsc::channel(4);
        let outcome = session.generate("sys", &[], "u", tx).await.unwrap();
        assert_eq!(outcome, GenerationOutcome::Empty);
    }
}
