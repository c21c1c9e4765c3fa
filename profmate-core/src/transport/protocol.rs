//! Gemini Live wire format.
//!
//! Only the subset this client speaks is modelled. Unknown server fields are
//! ignored so new message kinds never break an open session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::MediaBlob;

/// Response modality requested from the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
}

/// Everything the endpoint needs to open a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupRequest {
    pub model: String,
    pub response_modality: Modality,
    pub voice_name: String,
    /// Free text; may embed lesson material to ground the session.
    pub system_instruction: String,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

impl From<&SetupRequest> for ClientMessage {
    fn from(req: &SetupRequest) -> Self {
        let system_instruction = (!req.system_instruction.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: Some(req.system_instruction.clone()),
                inline_data: None,
            }],
        });
        ClientMessage::Setup(Setup {
            model: qualified_model_name(&req.model),
            generation_config: GenerationConfig {
                response_modalities: vec![req.response_modality],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: req.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction,
        })
    }
}

impl ClientMessage {
    pub fn realtime_audio(blob: MediaBlob) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![blob],
        })
    }
}

/// The endpoint expects `models/<name>`.
pub fn qualified_model_name(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaBlob>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
}

/// One message from the endpoint. Any shape parses; absent sections are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
}

impl ServerMessage {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Base64 audio at `serverContent.modelTurn.parts[0].inlineData.data`.
    pub fn audio_payload(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
            .map(|blob| blob.data.as_str())
    }
}
