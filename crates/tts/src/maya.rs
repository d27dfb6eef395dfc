//! Maya HTTP-chunked TTS
//!
//! Maya streams 24 kHz 16-bit PCM over HTTP chunked transfer rather than a
//! WebSocket. Chunks are resampled to 8 kHz and μ-law encoded before they
//! join the same playback queue the WS vendors feed.

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

use parley_codec::{pcm16_to_mulaw, LinearResampler};

use crate::TtsError;

const MAYA_SAMPLE_RATE: u32 = 24_000;

#[derive(Clone)]
pub struct MayaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MayaClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("MAYA_API_BASE")
                .unwrap_or_else(|_| "https://api.maya.audio/v1".to_string()),
            std::env::var("MAYA_API_KEY").unwrap_or_default(),
        )
    }

    /// Synthesize one sentence, pushing 24 kHz PCM chunks into `sink` as
    /// they arrive.
    pub async fn stream_speech(
        &self,
        text: &str,
        voice_ref: &str,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), TtsError> {
        let response = self
            .client
            .post(format!("{}/tts/stream", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "text": text,
                "voice_ref": voice_ref,
                "sample_rate": MAYA_SAMPLE_RATE,
                "format": "pcm_s16le",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Vendor(format!("maya {status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            if sink.send(chunk.to_vec()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Stateful 24 kHz PCM → 8 kHz μ-law converter. One per call; resampler
/// state carries across chunk boundaries.
pub struct MayaTranscoder {
    resampler: LinearResampler,
    /// PCM bytes held back until a whole sample is available
    carry: Vec<u8>,
}

impl MayaTranscoder {
    pub fn new() -> Self {
        Self {
            resampler: LinearResampler::new(MAYA_SAMPLE_RATE, 8000).expect("static rates"),
            carry: Vec::new(),
        }
    }

    /// Convert one HTTP chunk; output length varies with carry state.
    pub fn transcode(&mut self, pcm24k: &[u8]) -> Result<Vec<u8>, TtsError> {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(pcm24k);
        if bytes.len() % 2 != 0 {
            let tail = bytes.split_off(bytes.len() - 1);
            self.carry = tail;
        }
        let pcm8k = self.resampler.process_bytes(&bytes)?;
        Ok(pcm16_to_mulaw(&pcm8k)?)
    }
}

impl Default for MayaTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_ratio() {
        let mut t = MayaTranscoder::new();
        // 480 samples @24 kHz = 20 ms → 160 μ-law bytes @8 kHz
        let pcm: Vec<u8> = vec![0u8; 960];
        let first = t.transcode(&pcm).unwrap();
        let second = t.transcode(&pcm).unwrap();
        assert_eq!(first.len(), 160);
        assert_eq!(second.len(), 160);
    }

    #[test]
    fn test_odd_chunk_carries_byte() {
        let mut t = MayaTranscoder::new();
        let out1 = t.transcode(&vec![0u8; 961]).unwrap();
        // Carried byte completes a sample in the next chunk
        let out2 = t.transcode(&vec![0u8; 959]).unwrap();
        assert!(!out1.is_empty());
        assert!(!out2.is_empty());
    }
}
