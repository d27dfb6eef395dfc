//! REST call control
//!
//! Commands that go to the carrier's HTTP API rather than the media stream:
//! hangup, DTMF, answer. The orchestrator drives these through the
//! `CarrierControl` seam so its policies are testable with the recording
//! double.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use parley_core::{traits::CarrierControl, Error, Result};

/// reqwest-backed carrier API client.
pub struct HttpCarrierControl {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpCarrierControl {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn action(&self, call_id: &str, action: &str, body: serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/calls/{}/actions/{}",
            self.base_url.trim_end_matches('/'),
            call_id,
            action
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "carrier {action} returned {status}: {text}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CarrierControl for HttpCarrierControl {
    async fn hangup(&self, call_id: &str) -> Result<()> {
        tracing::info!(call_id = %call_id, "carrier hangup");
        self.action(call_id, "hangup", json!({})).await
    }

    async fn send_dtmf(&self, call_id: &str, digits: &str) -> Result<()> {
        tracing::info!(call_id = %call_id, digits = %digits, "carrier dtmf");
        self.action(call_id, "send_dtmf", json!({ "digits": digits })).await
    }

    async fn answer(&self, call_id: &str) -> Result<()> {
        self.action(call_id, "answer", json!({})).await
    }
}

/// Recorded carrier command, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    Hangup(String),
    Dtmf(String, String),
    Answer(String),
}

/// Test double that records commands instead of issuing them.
#[derive(Default)]
pub struct RecordingCarrierControl {
    commands: Mutex<Vec<RecordedCommand>>,
}

impl RecordingCarrierControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().clone()
    }

    pub fn hangup_count(&self) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Hangup(_)))
            .count()
    }
}

#[async_trait]
impl CarrierControl for RecordingCarrierControl {
    async fn hangup(&self, call_id: &str) -> Result<()> {
        self.commands
            .lock()
            .push(RecordedCommand::Hangup(call_id.to_string()));
        Ok(())
    }

    async fn send_dtmf(&self, call_id: &str, digits: &str) -> Result<()> {
        self.commands
            .lock()
            .push(RecordedCommand::Dtmf(call_id.to_string(), digits.to_string()));
        Ok(())
    }

    async fn answer(&self, call_id: &str) -> Result<()> {
        self.commands
            .lock()
            .push(RecordedCommand::Answer(call_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_control_captures_order() {
        let control = RecordingCarrierControl::new();
        control.answer("cc-1").await.unwrap();
        control.send_dtmf("cc-1", "1").await.unwrap();
        control.hangup("cc-1").await.unwrap();

        assert_eq!(
            control.commands(),
            vec![
                RecordedCommand::Answer("cc-1".into()),
                RecordedCommand::Dtmf("cc-1".into(), "1".into()),
                RecordedCommand::Hangup("cc-1".into()),
            ]
        );
        assert_eq!(control.hangup_count(), 1);
    }
}
