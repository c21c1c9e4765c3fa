//! Event types published to presentation-layer subscribers.
//!
//! | Event | Meaning |
//! |-------|---------|
//! | `SessionStatusEvent` | Connection state transitions |
//! | `VolumeLevelEvent` | RMS of each outbound microphone frame |

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Volume events
// ---------------------------------------------------------------------------

/// Published for each outbound audio frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeLevelEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the frame in [0.0, 1.0].
    pub rms: f32,
}

// ---------------------------------------------------------------------------
// Session status events
// ---------------------------------------------------------------------------

/// Published when the session state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Connection state as the presentation layer shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session and none requested.
    Idle,
    /// `connect` in flight.
    Connecting,
    /// Channel open and audio flowing.
    Connected,
    /// Session ended, locally or by the endpoint.
    Disconnected,
    /// Mid-session failure; the session may still be open.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = SessionStatusEvent {
            status: SessionStatus::Disconnected,
            detail: Some("remote closed".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["detail"], "remote closed");

        let round_trip: SessionStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, SessionStatus::Disconnected);
        assert_eq!(round_trip.detail.as_deref(), Some("remote closed"));
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<SessionStatus>(r#""Connected""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }

    #[test]
    fn volume_event_serializes_seq_and_rms() {
        let event = VolumeLevelEvent { seq: 3, rms: 0.18 };

        let json = serde_json::to_value(&event).expect("serialize volume event");
        assert_eq!(json["seq"], 3);
        let rms = json["rms"].as_f64().expect("rms should serialize as number");
        assert!((rms - 0.18).abs() < 1e-5);
    }
}
