//! TTS vendor WebSocket protocol
//!
//! The WS providers (ElevenLabs, Cartesia, Hume) share a message family:
//! a JSON init frame carrying voice settings, text frames with generation
//! triggers, and base64 μ-law audio frames back. Maya is HTTP-chunked and
//! lives in [`crate::maya`].

use serde::{Deserialize, Serialize};
use serde_json::json;

use parley_config::{AgentConfig, TtsProvider, VoiceSettings};

/// Vendor-specific connection rules for the WS protocol family.
#[derive(Debug, Clone)]
pub struct VendorProtocol {
    provider: TtsProvider,
}

impl VendorProtocol {
    pub fn new(provider: TtsProvider) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> TtsProvider {
        self.provider
    }

    /// Streaming-input URL for the given voice. μ-law 8 kHz output keeps the
    /// carrier path conversion-free.
    pub fn url(&self, voice_id: &str, model: &str) -> String {
        match self.provider {
            TtsProvider::Elevenlabs => format!(
                "wss://api.elevenlabs.io/v1/text-to-speech/{voice_id}/stream-input?model_id={model}&output_format=ulaw_8000"
            ),
            TtsProvider::Cartesia => format!(
                "wss://api.cartesia.ai/tts/websocket?voice_id={voice_id}&model_id={model}&output_format=ulaw_8000"
            ),
            TtsProvider::Hume => format!(
                "wss://api.hume.ai/v0/tts/stream?voice={voice_id}&format=ulaw_8000"
            ),
            TtsProvider::Maya => {
                // HTTP-chunked provider; no WS URL
                String::new()
            }
        }
    }

    /// First frame after connect: primes the context and carries the voice
    /// expressiveness settings and credential.
    pub fn init_frame(&self, config: &AgentConfig, api_key: &str) -> String {
        let VoiceSettings {
            stability,
            similarity_boost,
            style,
            use_speaker_boost,
        } = config.voice_settings;

        json!({
            "text": " ",
            "voice_settings": {
                "stability": stability,
                "similarity_boost": similarity_boost,
                "style": style,
                "use_speaker_boost": use_speaker_boost,
            },
            "xi_api_key": api_key,
        })
        .to_string()
    }

    /// A text frame. `try_trigger_generation` asks the vendor to start
    /// synthesis without waiting for more text; `flush` forces out whatever
    /// is buffered.
    pub fn text_frame(&self, text: &str, try_trigger_generation: bool, flush: bool) -> String {
        json!({
            "text": text,
            "try_trigger_generation": try_trigger_generation,
            "flush": flush,
        })
        .to_string()
    }

    /// Keep-alive frame: a single space that produces no audio. Sent every
    /// 15 s of idle to forestall the vendor's 20 s input timeout.
    pub fn keepalive_frame(&self) -> String {
        self.text_frame(" ", false, false)
    }

    /// Parse one vendor message.
    pub fn parse(&self, text: &str) -> Option<VendorMessage> {
        let wire: WireMessage = serde_json::from_str(text).ok()?;
        if let Some(audio_b64) = wire.audio {
            use base64::Engine as _;
            let audio = base64::engine::general_purpose::STANDARD
                .decode(audio_b64)
                .ok()?;
            return Some(VendorMessage::Audio {
                mulaw: audio,
                is_final: wire.is_final.unwrap_or(false),
            });
        }
        if wire.is_final == Some(true) {
            return Some(VendorMessage::Final);
        }
        if let Some(err) = wire.error {
            return Some(VendorMessage::Error(err));
        }
        None
    }
}

/// Normalized vendor message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorMessage {
    /// Ordered μ-law audio for the in-flight sentence
    Audio { mulaw: Vec<u8>, is_final: bool },
    /// Sentence boundary without audio payload
    Final,
    Error(String),
}

#[derive(Debug, Deserialize, Serialize)]
struct WireMessage {
    #[serde(default)]
    audio: Option<String>,
    #[serde(rename = "isFinal", default)]
    is_final: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevenlabs_url_is_mulaw() {
        let protocol = VendorProtocol::new(TtsProvider::Elevenlabs);
        let url = protocol.url("voice-1", "eleven_flash_v2_5");
        assert!(url.contains("voice-1"));
        assert!(url.contains("output_format=ulaw_8000"));
    }

    #[test]
    fn test_init_frame_carries_voice_settings() {
        let protocol = VendorProtocol::new(TtsProvider::Elevenlabs);
        let config = AgentConfig::default();
        let frame = protocol.init_frame(&config, "key-1");
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["voice_settings"]["similarity_boost"], 0.75);
        assert_eq!(v["xi_api_key"], "key-1");
    }

    #[test]
    fn test_parse_audio_message() {
        use base64::Engine as _;
        let protocol = VendorProtocol::new(TtsProvider::Elevenlabs);
        let b64 = base64::engine::general_purpose::STANDARD.encode([0xFFu8; 320]);
        let msg = protocol
            .parse(&format!(r#"{{"audio":"{b64}","isFinal":false}}"#))
            .unwrap();
        match msg {
            VendorMessage::Audio { mulaw, is_final } => {
                assert_eq!(mulaw.len(), 320);
                assert!(!is_final);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_final_marker() {
        let protocol = VendorProtocol::new(TtsProvider::Elevenlabs);
        assert_eq!(
            protocol.parse(r#"{"audio":null,"isFinal":true}"#),
            Some(VendorMessage::Final)
        );
    }

    #[test]
    fn test_keepalive_is_silent_space() {
        let protocol = VendorProtocol::new(TtsProvider::Elevenlabs);
        let v: serde_json::Value = serde_json::from_str(&protocol.keepalive_frame()).unwrap();
        assert_eq!(v["text"], " ");
        assert_eq!(v["try_trigger_generation"], false);
    }
}
