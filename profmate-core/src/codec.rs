//! PCM16 transport codec and frame telemetry.
//!
//! The live endpoint speaks little-endian signed 16-bit mono PCM wrapped in
//! standard base64. Both directions share the same quantisation: `x * 32768`
//! on the way out, `/ 32768` on the way back, so a round trip is accurate to
//! one step.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

const PCM16_SCALE: f32 = 32768.0;

/// Root-mean-square level of a frame. Silence is `0.0`, full scale is `1.0`.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Quantise f32 samples to little-endian PCM16 bytes.
///
/// Scales by 32768 and truncates toward zero. `+1.0` saturates to `i16::MAX`.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        // `as` saturates out-of-range floats and truncates the fraction.
        let q = (s * PCM16_SCALE) as i16;
        bytes.extend_from_slice(&q.to_le_bytes());
    }
    bytes
}

/// Reinterpret little-endian PCM16 bytes as f32 samples in [-1.0, 1.0).
///
/// # Errors
/// `TutorError::Protocol` when the byte count is odd.
pub fn pcm16_to_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(TutorError::Protocol(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect())
}

pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    BASE64_STANDARD.encode(f32_to_pcm16(samples))
}

/// Inverse of [`encode_pcm16_base64`].
///
/// # Errors
/// `TutorError::Protocol` for invalid base64 or an odd byte count.
pub fn decode_pcm16_base64(data: &str) -> Result<Vec<f32>> {
    let bytes = BASE64_STANDARD
        .decode(data)
        .map_err(|e| TutorError::Protocol(format!("invalid base64 audio payload: {e}")))?;
    pcm16_to_f32(&bytes)
}

/// An inline media payload: base64 data plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: String,
}

impl MediaBlob {
    /// Encode mono f32 samples as an `audio/pcm;rate=<rate>` blob.
    pub fn pcm16(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            mime_type: format!("audio/pcm;rate={sample_rate}"),
            data: encode_pcm16_base64(samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 4096]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_one() {
        let frame = vec![1.0f32; 4096];
        assert!((rms(&frame) - 1.0).abs() < 1e-6);
        let alternating: Vec<f32> = (0..4096)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        assert!((rms(&alternating) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rms_of_empty_frame_is_zero() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn quantisation_truncates_and_saturates() {
        let bytes = f32_to_pcm16(&[0.0, 0.5, -0.5, 1.0, -1.0, 0.00002]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![0, 16384, -16384, i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn round_trip_within_one_quantisation_step() {
        let step = 1.0 / PCM16_SCALE;
        let samples: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) * 0.013).sin() * 0.9)
            .chain([1.0, -1.0, 0.0, 0.999_99, -0.999_99])
            .collect();

        let decoded = decode_pcm16_base64(&encode_pcm16_base64(&samples)).unwrap();
        assert_eq!(decoded.len(), samples.len());
        for (orig, back) in samples.iter().zip(&decoded) {
            assert!(
                (orig - back).abs() <= step,
                "orig={orig} back={back} exceeds one step"
            );
        }
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let err = decode_pcm16_base64("not base64 !!").unwrap_err();
        assert!(matches!(err, TutorError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_odd_byte_count() {
        let payload = BASE64_STANDARD.encode([0u8, 1, 2]);
        assert!(decode_pcm16_base64(&payload).is_err());
    }

    #[test]
    fn pcm16_blob_carries_rate_in_mime_type() {
        let blob = MediaBlob::pcm16(&[0.25; 4], 16_000);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(decode_pcm16_base64(&blob.data).unwrap(), vec![0.25; 4]);

        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
    }
}
