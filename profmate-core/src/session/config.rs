use crate::transport::{gemini::DEFAULT_ENDPOINT, Modality, SetupRequest};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_VOICE: &str = "Puck";

/// Configuration for `LiveTutorClient`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Live model name, with or without the `models/` prefix.
    pub model: String,
    /// Prebuilt voice the model answers in. Default: `Puck`.
    pub voice_name: String,
    /// Rate of outbound microphone frames (Hz). Default: 16000.
    pub input_sample_rate: u32,
    /// Rate of inbound model audio (Hz). Default: 24000.
    pub output_sample_rate: u32,
    /// Samples per outbound frame. Default: 4096 (≈256 ms at 16 kHz).
    pub frame_len: usize,
    /// WebSocket endpoint, without the `key` query parameter.
    pub endpoint: String,
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_len: 4096,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            preferred_input_device: None,
            preferred_output_device: None,
        }
    }
}

impl SessionConfig {
    /// Setup message for one connect, always requesting audio responses.
    pub fn setup_request(&self, system_instruction: &str) -> SetupRequest {
        SetupRequest {
            model: self.model.clone(),
            response_modality: Modality::Audio,
            voice_name: self.voice_name.clone(),
            system_instruction: system_instruction.to_string(),
        }
    }
}
