//! Persistent application settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use profmate_core::session::config::{DEFAULT_MODEL, DEFAULT_VOICE};
use profmate_core::SessionConfig;
use serde::{Deserialize, Serialize};

/// Prebuilt voices the live endpoint offers.
pub const KNOWN_VOICES: &[&str] = &["Puck", "Charon", "Kore", "Fenrir", "Aoede"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub model: String,
    pub voice_name: String,
    pub api_key: Option<String>,
    /// Override for the live WebSocket endpoint.
    pub endpoint: Option<String>,
    /// Width of the terminal volume meter in cells.
    pub meter_width: usize,
    /// Gain applied to frame RMS before drawing the meter.
    pub meter_sensitivity: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            preferred_output_device: None,
            model: DEFAULT_MODEL.into(),
            voice_name: DEFAULT_VOICE.into(),
            api_key: None,
            endpoint: None,
            meter_width: 32,
            meter_sensitivity: 4.0,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.model = normalize_model(&self.model);
        self.voice_name = normalize_voice_name(&self.voice_name);
        self.api_key = trimmed(self.api_key.take());
        self.endpoint = trimmed(self.endpoint.take());
        self.preferred_input_device = trimmed(self.preferred_input_device.take());
        self.preferred_output_device = trimmed(self.preferred_output_device.take());
        self.meter_width = self.meter_width.clamp(8, 120);
        self.meter_sensitivity = self.meter_sensitivity.clamp(1.0, 20.0);
    }

    /// Key from the settings file, else `GEMINI_API_KEY`, else `API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key.clone().or_else(|| {
            ["GEMINI_API_KEY", "API_KEY"]
                .into_iter()
                .find_map(|name| trimmed(env(name)))
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            model: self.model.clone(),
            voice_name: self.voice_name.clone(),
            preferred_input_device: self.preferred_input_device.clone(),
            preferred_output_device: self.preferred_output_device.clone(),
            ..SessionConfig::default()
        };
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        config
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn normalize_model(raw: &str) -> String {
    let model = raw.trim();
    let model = model.strip_prefix("models/").unwrap_or(model);
    if model.is_empty() {
        DEFAULT_MODEL.into()
    } else {
        model.into()
    }
}

/// Case-insensitive match against the known voices; unknown names fall back
/// to the default voice.
pub fn normalize_voice_name(raw: &str) -> String {
    let wanted = raw.trim();
    KNOWN_VOICES
        .iter()
        .find(|v| v.eq_ignore_ascii_case(wanted))
        .copied()
        .unwrap_or(DEFAULT_VOICE)
        .to_string()
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ProfMate")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("profmate")
            .join("settings.json")
    }
}

/// Missing or unreadable files yield defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("profmate-settings-{}-{name}", std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let settings: AppSettings = serde_json::from_str(r#"{"voiceName":"kore"}"#).unwrap();
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.meter_width, 32);
        assert_eq!(normalize_voice_name(&settings.voice_name), "Kore");
    }

    #[test]
    fn normalize_clamps_and_trims() {
        let mut s = AppSettings {
            model: "  models/gemini-live-x ".into(),
            voice_name: "nobody".into(),
            api_key: Some("   ".into()),
            preferred_input_device: Some(" USB Mic ".into()),
            meter_width: 1000,
            meter_sensitivity: 0.0,
            ..AppSettings::default()
        };
        s.normalize();
        assert_eq!(s.model, "gemini-live-x");
        assert_eq!(s.voice_name, "Puck");
        assert_eq!(s.api_key, None);
        assert_eq!(s.preferred_input_device.as_deref(), Some("USB Mic"));
        assert_eq!(s.meter_width, 120);
        assert_eq!(s.meter_sensitivity, 1.0);
    }

    #[test]
    fn api_key_prefers_file_then_gemini_then_generic_env() {
        let env = |name: &str| match name {
            "GEMINI_API_KEY" => Some("from-gemini".to_string()),
            "API_KEY" => Some("from-generic".to_string()),
            _ => None,
        };
        let mut s = AppSettings::default();
        assert_eq!(s.resolve_api_key_with(env).as_deref(), Some("from-gemini"));

        let only_generic = |name: &str| (name == "API_KEY").then(|| "from-generic".to_string());
        assert_eq!(
            s.resolve_api_key_with(only_generic).as_deref(),
            Some("from-generic")
        );

        s.api_key = Some("from-file".into());
        assert_eq!(s.resolve_api_key_with(env).as_deref(), Some("from-file"));

        s.api_key = None;
        assert_eq!(s.resolve_api_key_with(|_| None), None);
    }

    #[test]
    fn session_config_carries_devices_and_endpoint_override() {
        let s = AppSettings {
            preferred_output_device: Some("Headphones".into()),
            endpoint: Some("wss://localhost:9000/live".into()),
            ..AppSettings::default()
        };
        let cfg = s.session_config();
        assert_eq!(cfg.preferred_output_device.as_deref(), Some("Headphones"));
        assert_eq!(cfg.endpoint, "wss://localhost:9000/live");
        assert_eq!(cfg.input_sample_rate, 16_000);
        assert_eq!(cfg.voice_name, "Puck");
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let path = temp_path("roundtrip");
        let settings = AppSettings {
            voice_name: "Charon".into(),
            meter_width: 40,
            ..AppSettings::default()
        };
        save_settings(&path, &settings).unwrap();
        let loaded = load_settings(&path);
        assert_eq!(loaded.voice_name, "Charon");
        assert_eq!(loaded.meter_width, 40);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let loaded = load_settings(&temp_path("missing"));
        assert_eq!(loaded.voice_name, DEFAULT_VOICE);
    }
}
