//! Audio device enumeration and selection.

use serde::{Deserialize, Serialize};

/// Which side of the session a device serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

/// Metadata about an audio device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub kind: DeviceKind,
    /// Whether this is the system default device for its kind.
    pub is_default: bool,
    /// Input devices only: likely captures system output rather than a voice.
    pub is_loopback_like: bool,
    /// Input devices only: best guess for a speech microphone.
    pub is_recommended: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
    "virtual output",
];

const MIC_KEYWORDS: &[&str] = &["microphone", "mic", "headset", "array", "webcam", "usb"];

/// Heuristic for capture devices that record system output (echoing the
/// tutor's own voice back into the session).
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Higher is a better speech microphone.
pub fn mic_preference_score(name: &str) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = if is_loopback_like_name(&lowered) { -16 } else { 8 };
    if MIC_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    score
}

/// Mark the best microphone as recommended and order the list best-first.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn rank_inputs(mut list: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    if let Some(best) = list
        .iter_mut()
        .max_by_key(|d| mic_preference_score(&d.name) + if d.is_default { 2 } else { 0 })
    {
        best.is_recommended = true;
    }
    list.sort_by_key(|d| {
        (
            !d.is_recommended,
            d.is_loopback_like,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
    list
}

#[cfg(feature = "audio-cpal")]
fn describe(
    devices: impl Iterator<Item = cpal::Device>,
    kind: DeviceKind,
    default_name: Option<String>,
) -> Vec<DeviceInfo> {
    use cpal::traits::DeviceTrait;

    devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Audio Device {}", idx + 1));
            let is_default = default_name.as_deref() == Some(name.as_str());
            let is_loopback_like = kind == DeviceKind::Input && is_loopback_like_name(&name);
            DeviceInfo {
                name,
                kind,
                is_default,
                is_loopback_like,
                is_recommended: false,
            }
        })
        .collect()
}

/// List capture devices, recommended microphone first.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    match host.input_devices() {
        Ok(devices) => rank_inputs(describe(devices, DeviceKind::Input, default_name)),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            Vec::new()
        }
    }
}

/// List playback devices, default first.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    match host.output_devices() {
        Ok(devices) => {
            let mut list = describe(devices, DeviceKind::Output, default_name);
            list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            Vec::new()
        }
    }
}

/// Resolve a device by preferred name, then the host default, then the
/// first device of that kind.
#[cfg(feature = "audio-cpal")]
pub(crate) fn select_device(
    kind: DeviceKind,
    preferred_name: Option<&str>,
) -> crate::error::Result<cpal::Device> {
    use crate::error::TutorError;
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let enumerate = || match kind {
        DeviceKind::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        DeviceKind::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    };

    if let Some(preferred) = preferred_name {
        match enumerate() {
            Ok(devices) => {
                if let Some(found) = devices
                    .into_iter()
                    .find(|d| d.name().map(|n| n == preferred).unwrap_or(false))
                {
                    return Ok(found);
                }
                tracing::warn!(?kind, "preferred device '{preferred}' not found, falling back");
            }
            Err(e) => {
                tracing::warn!(?kind, "failed to list devices while resolving preference: {e}")
            }
        }
    }

    let default = match kind {
        DeviceKind::Input => host.default_input_device(),
        DeviceKind::Output => host.default_output_device(),
    };
    if let Some(device) = default {
        return Ok(device);
    }

    let missing = match kind {
        DeviceKind::Input => TutorError::NoDefaultInputDevice,
        DeviceKind::Output => TutorError::NoDefaultOutputDevice,
    };
    let first = enumerate()
        .map_err(|e| TutorError::DeviceAccess(e.to_string()))?
        .into_iter()
        .next()
        .ok_or(missing)?;
    tracing::warn!(?kind, "no default device, falling back to first available");
    Ok(first)
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            kind: DeviceKind::Input,
            is_default,
            is_loopback_like: is_loopback_like_name(name),
            is_recommended: false,
        }
    }

    #[test]
    fn detects_loopback_capture_devices() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("Monitor of Built-in Audio"));
        assert!(!is_loopback_like_name("MacBook Pro Microphone"));
    }

    #[test]
    fn microphone_outranks_loopback() {
        assert!(
            mic_preference_score("USB Microphone") > mic_preference_score("Stereo Mix (Realtek)")
        );
    }

    #[test]
    fn ranking_puts_recommended_mic_first() {
        let ranked = rank_inputs(vec![
            input("Stereo Mix (Realtek Audio)", true),
            input("Headset Microphone", false),
        ]);
        assert_eq!(ranked[0].name, "Headset Microphone");
        assert!(ranked[0].is_recommended);
        assert!(!ranked[1].is_recommended);
    }

    #[test]
    fn device_info_serializes_camel_case() {
        let json = serde_json::to_value(input("Mic", true)).unwrap();
        assert_eq!(json["kind"], "input");
        assert_eq!(json["isDefault"], true);
        assert_eq!(json["isLoopbackLike"], false);
    }
}
