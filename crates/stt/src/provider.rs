//! STT vendor adapters
//!
//! Each vendor speaks its own WebSocket framing. The adapter builds the
//! connection request, encodes outgoing audio in the vendor's preferred
//! format, and normalizes incoming JSON into `RawSttMessage`s.

use serde::Deserialize;

use parley_codec::{mulaw_to_pcm16, LinearResampler};
use parley_config::{AgentConfig, SttProvider};
use parley_core::AudioFrame;

/// Kind of a normalized vendor message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSttKind {
    Partial,
    Final,
}

/// One normalized message from the vendor stream.
#[derive(Debug, Clone)]
pub struct RawSttMessage {
    pub kind: RawSttKind,
    pub text: String,
    /// Vendor believes the user finished their turn
    pub endpoint: bool,
}

/// Vendor-specific connection and framing rules.
pub struct VendorAdapter {
    provider: SttProvider,
    /// 8 kHz → 16 kHz state for vendors that want linear audio
    resampler: Option<LinearResampler>,
}

impl VendorAdapter {
    pub fn new(provider: SttProvider) -> Self {
        let resampler = match provider {
            // Deepgram accepts μ-law 8 kHz natively
            SttProvider::Deepgram => None,
            // Soniox and AssemblyAI want 16 kHz linear
            SttProvider::Soniox | SttProvider::Assemblyai => {
                Some(LinearResampler::new(8000, 16000).expect("static rates"))
            }
        };
        Self { provider, resampler }
    }

    pub fn provider(&self) -> SttProvider {
        self.provider
    }

    /// WebSocket URL including model/language/endpointing selection.
    pub fn url(&self, config: &AgentConfig) -> String {
        match self.provider {
            SttProvider::Deepgram => format!(
                "wss://api.deepgram.com/v1/listen?encoding=mulaw&sample_rate=8000&channels=1\
                 &interim_results=true&endpointing={}&vad_events=true&smart_format=true",
                config.endpointing_ms
            ),
            SttProvider::Soniox => "wss://stt-rt.soniox.com/transcribe-websocket".to_string(),
            SttProvider::Assemblyai => format!(
                "wss://api.assemblyai.com/v2/realtime/ws?sample_rate=16000&end_utterance_silence_threshold={}",
                config.endpointing_ms
            ),
        }
    }

    /// `(header, value)` pair carrying the API key.
    pub fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        match self.provider {
            SttProvider::Deepgram => ("Authorization", format!("Token {api_key}")),
            SttProvider::Soniox => ("Authorization", format!("Bearer {api_key}")),
            SttProvider::Assemblyai => ("Authorization", api_key.to_string()),
        }
    }

    /// Encode one carrier frame into the vendor's audio format.
    pub fn encode_audio(&mut self, frame: &AudioFrame) -> Vec<u8> {
        match &mut self.resampler {
            // μ-law passthrough
            None => frame.payload().to_vec(),
            // μ-law → PCM16 → 16 kHz
            Some(resampler) => {
                let pcm = mulaw_to_pcm16(frame.payload());
                resampler
                    .process_bytes(&pcm)
                    .unwrap_or_default()
            }
        }
    }

    /// Parse one vendor text message into zero or more normalized messages.
    pub fn parse(&self, text: &str) -> Vec<RawSttMessage> {
        match self.provider {
            SttProvider::Deepgram => parse_deepgram(text),
            SttProvider::Soniox => parse_soniox(text),
            SttProvider::Assemblyai => parse_assemblyai(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Deepgram

#[derive(Debug, Deserialize)]
struct DeepgramMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
    channel: Option<DeepgramChannel>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

fn parse_deepgram(text: &str) -> Vec<RawSttMessage> {
    let Ok(msg) = serde_json::from_str::<DeepgramMessage>(text) else {
        return Vec::new();
    };

    match msg.kind.as_deref() {
        // Dedicated endpoint marker with no transcript payload
        Some("UtteranceEnd") => {
            return vec![RawSttMessage {
                kind: RawSttKind::Final,
                text: String::new(),
                endpoint: true,
            }]
        }
        Some("Results") | None => {}
        _ => return Vec::new(),
    }

    let transcript = msg
        .channel
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .unwrap_or_default();

    if transcript.is_empty() && !msg.speech_final {
        return Vec::new();
    }

    vec![RawSttMessage {
        kind: if msg.is_final {
            RawSttKind::Final
        } else {
            RawSttKind::Partial
        },
        text: transcript,
        endpoint: msg.speech_final,
    }]
}

// ---------------------------------------------------------------------------
// Soniox

#[derive(Debug, Deserialize)]
struct SonioxMessage {
    #[serde(default)]
    tokens: Vec<SonioxToken>,
    #[serde(default)]
    finished: bool,
}

#[derive(Debug, Deserialize)]
struct SonioxToken {
    text: String,
    #[serde(default)]
    is_final: bool,
}

fn parse_soniox(text: &str) -> Vec<RawSttMessage> {
    let Ok(msg) = serde_json::from_str::<SonioxMessage>(text) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let finals: String = msg
        .tokens
        .iter()
        .filter(|t| t.is_final && t.text != "<end>")
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("");
    let partials: String = msg
        .tokens
        .iter()
        .filter(|t| !t.is_final)
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("");
    let endpoint = msg.finished || msg.tokens.iter().any(|t| t.text == "<end>");

    if !finals.is_empty() || endpoint {
        out.push(RawSttMessage {
            kind: RawSttKind::Final,
            text: finals.trim().to_string(),
            endpoint,
        });
    }
    if !partials.is_empty() {
        out.push(RawSttMessage {
            kind: RawSttKind::Partial,
            text: partials.trim().to_string(),
            endpoint: false,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// AssemblyAI

#[derive(Debug, Deserialize)]
struct AssemblyMessage {
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    text: String,
}

fn parse_assemblyai(text: &str) -> Vec<RawSttMessage> {
    let Ok(msg) = serde_json::from_str::<AssemblyMessage>(text) else {
        return Vec::new();
    };

    match msg.message_type.as_str() {
        "PartialTranscript" if !msg.text.is_empty() => vec![RawSttMessage {
            kind: RawSttKind::Partial,
            text: msg.text,
            endpoint: false,
        }],
        // AssemblyAI finals double as the turn-end marker
        "FinalTranscript" => vec![RawSttMessage {
            kind: RawSttKind::Final,
            text: msg.text,
            endpoint: true,
        }],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentConfig {
        AgentConfig::default()
    }

    #[test]
    fn test_deepgram_url_carries_endpointing() {
        let adapter = VendorAdapter::new(SttProvider::Deepgram);
        let url = adapter.url(&agent());
        assert!(url.contains("encoding=mulaw"));
        assert!(url.contains("endpointing=400"));
    }

    #[test]
    fn test_deepgram_partial_and_final() {
        let adapter = VendorAdapter::new(SttProvider::Deepgram);
        let partial = r#"{"type":"Results","is_final":false,"speech_final":false,"channel":{"alternatives":[{"transcript":"I need to"}]}}"#;
        let msgs = adapter.parse(partial);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, RawSttKind::Partial);
        assert_eq!(msgs[0].text, "I need to");

        let fin = r#"{"type":"Results","is_final":true,"speech_final":true,"channel":{"alternatives":[{"transcript":"I need to reschedule"}]}}"#;
        let msgs = adapter.parse(fin);
        assert_eq!(msgs[0].kind, RawSttKind::Final);
        assert!(msgs[0].endpoint);
    }

    #[test]
    fn test_deepgram_utterance_end_is_endpoint() {
        let adapter = VendorAdapter::new(SttProvider::Deepgram);
        let msgs = adapter.parse(r#"{"type":"UtteranceEnd","last_word_end":2.1}"#);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].endpoint);
        assert!(msgs[0].text.is_empty());
    }

    #[test]
    fn test_soniox_tokens() {
        let adapter = VendorAdapter::new(SttProvider::Soniox);
        let msgs = adapter.parse(
            r#"{"tokens":[{"text":"hello ","is_final":true},{"text":"wor","is_final":false}],"finished":false}"#,
        );
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].kind, RawSttKind::Final);
        assert_eq!(msgs[0].text, "hello");
        assert_eq!(msgs[1].kind, RawSttKind::Partial);
    }

    #[test]
    fn test_assemblyai_final_is_endpoint() {
        let adapter = VendorAdapter::new(SttProvider::Assemblyai);
        let msgs =
            adapter.parse(r#"{"message_type":"FinalTranscript","text":"next tuesday please"}"#);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, RawSttKind::Final);
        assert!(msgs[0].endpoint);
    }

    #[test]
    fn test_deepgram_audio_is_passthrough() {
        let mut adapter = VendorAdapter::new(SttProvider::Deepgram);
        let frame = AudioFrame::silence(0);
        assert_eq!(adapter.encode_audio(&frame), frame.payload());
    }

    #[test]
    fn test_assemblyai_audio_is_resampled_pcm() {
        let mut adapter = VendorAdapter::new(SttProvider::Assemblyai);
        let frame = AudioFrame::silence(0);
        let encoded = adapter.encode_audio(&frame);
        // 160 μ-law samples → ~320 samples @16 kHz → ~640 bytes PCM16
        assert!(encoded.len() >= 630 && encoded.len() <= 644, "len={}", encoded.len());
    }
}
