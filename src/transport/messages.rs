//! Wire messages for the live streaming session
//!
//! The live endpoint speaks JSON over websocket: the client opens with a
//! `setup` message, then streams `realtimeInput` media chunks; the server
//! replies with `setupComplete`, `serverContent` (inline audio, interruption
//! and turn flags) and `goAway`. Audio payloads are base64 PCM16.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::audio::AudioChunk;
use crate::constants::PLAYBACK_SAMPLE_RATE;

// =============================================================================
// Client -> server
// =============================================================================

/// Messages sent by the client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Build the session-opening setup message.
    pub fn setup(model: &str, voice: &str, system_instruction: &str) -> Self {
        ClientMessage::Setup(Setup {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                }),
            },
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: Some(system_instruction.to_string()),
                    inline_data: None,
                }],
            }),
        })
    }

    /// Wrap one outbound capture chunk as realtime input.
    pub fn audio_chunk(chunk: &AudioChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaBlob {
                mime_type: format!("audio/pcm;rate={}", chunk.sample_rate()),
                data: BASE64_STANDARD.encode(chunk.data()),
            }],
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

/// Inline binary payload, base64 encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: String,
}

/// A turn of content: role-tagged parts
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaBlob>,
}

// =============================================================================
// Server -> client
// =============================================================================

/// One inbound server message. Every field is optional; a message carries
/// whichever signals apply.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<GoAway>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<Content>,
    pub interrupted: Option<bool>,
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoAway {
    pub time_left: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiError {
    pub code: Option<i64>,
    pub status: Option<String>,
    pub message: Option<String>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.interrupted)
            .unwrap_or(false)
    }

    pub fn is_turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.turn_complete)
            .unwrap_or(false)
    }

    /// Decode every inline audio payload in this message, in order.
    ///
    /// Payloads that fail base64 decoding are skipped (logged by the caller's
    /// tracing context); inbound audio is 24 kHz mono PCM16.
    pub fn audio_chunks(&self) -> Vec<AudioChunk> {
        let Some(content) = self.server_content.as_ref() else {
            return Vec::new();
        };
        let Some(turn) = content.model_turn.as_ref() else {
            return Vec::new();
        };
        turn.parts
            .iter()
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|blob| blob.mime_type.starts_with("audio/pcm"))
            .filter_map(|blob| match BASE64_STANDARD.decode(&blob.data) {
                Ok(bytes) => Some(AudioChunk::new(
                    Bytes::from(bytes),
                    PLAYBACK_SAMPLE_RATE,
                    1,
                )),
                Err(e) => {
                    tracing::warn!("dropping undecodable audio payload: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CAPTURE_SAMPLE_RATE;

    #[test]
    fn test_setup_serializes_with_camel_case_keys() {
        let msg = ClientMessage::setup("models/test-live", "Kore", "You are a tutor.");
        let json = serde_json::to_value(&msg).unwrap();

        let setup = &json["setup"];
        assert_eq!(setup["model"], "models/test-live");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
        assert_eq!(
            setup["systemInstruction"]["parts"][0]["text"],
            "You are a tutor."
        );
    }

    #[test]
    fn test_realtime_input_carries_base64_pcm() {
        let chunk = AudioChunk::from_f32(&[0.5, -0.5], CAPTURE_SAMPLE_RATE, 1);
        let msg = ClientMessage::audio_chunk(&chunk);
        let json = serde_json::to_value(&msg).unwrap();

        let blob = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(blob["mimeType"], "audio/pcm;rate=16000");
        let decoded = BASE64_STANDARD
            .decode(blob["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded.len(), 4);
    }

    #[test]
    fn test_setup_complete_parses() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(!msg.is_interrupted());
        assert!(msg.audio_chunks().is_empty());
    }

    #[test]
    fn test_server_audio_parses() {
        let payload = BASE64_STANDARD.encode([0u8, 64, 0, 192]);
        let raw = format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{payload}"}}}}]}}}}}}"#
        );
        let msg: ServerMessage = serde_json::from_str(&raw).unwrap();
        let chunks = msg.audio_chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sample_rate(), 24_000);
        assert_eq!(chunks[0].samples_per_channel(), 2);
    }

    #[test]
    fn test_interrupted_flag_parses() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"serverContent":{"interrupted":true}}"#).unwrap();
        assert!(msg.is_interrupted());
        assert!(msg.audio_chunks().is_empty());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let msg: Result<ServerMessage, _> = serde_json::from_str(
            r#"{"serverContent":{"turnComplete":true,"usageMetadata":{"tokens":3}}}"#,
        );
        // Unknown keys inside known objects must not break parsing
        assert!(msg.is_ok());
        assert!(msg.unwrap().is_turn_complete());
    }

    #[test]
    fn test_bad_base64_skipped() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"!!notbase64!!"}}]}}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.audio_chunks().is_empty());
    }
}
