//! Session notifications for the presentation layer.
//!
//! The client reports lifecycle and telemetry through a constructor-injected
//! [`SessionObserver`]. [`BroadcastObserver`] turns those calls into
//! serialisable events on `tokio::sync::broadcast` channels for consumers
//! that prefer subscriptions.

pub mod events;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use events::{SessionStatus, SessionStatusEvent, VolumeLevelEvent};

/// Lifecycle and telemetry callbacks. Every method defaults to a no-op.
///
/// Calls arrive from session tasks, never from the realtime audio threads,
/// but may come from any runtime worker.
pub trait SessionObserver: Send + Sync {
    /// Channel opened; fires before the first outbound frame.
    fn on_connect(&self) {}

    /// Channel closed, by the endpoint or by `disconnect`.
    fn on_disconnect(&self) {}

    /// Mid-session channel failure.
    fn on_error(&self, _detail: &str) {}

    /// RMS of the latest outbound frame.
    fn on_volume_level(&self, _level: f32) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

const BROADCAST_CAP: usize = 256;

/// Republishes observer calls as broadcast events.
pub struct BroadcastObserver {
    status: Mutex<SessionStatus>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    volume_tx: broadcast::Sender<VolumeLevelEvent>,
    seq: AtomicU64,
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastObserver {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (volume_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            status: Mutex::new(SessionStatus::Idle),
            status_tx,
            volume_tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_volume(&self) -> broadcast::Receiver<VolumeLevelEvent> {
        self.volume_tx.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Record a transition the session itself doesn't report (e.g.
    /// `Connecting` before calling `connect`).
    pub fn set_status(&self, new_status: SessionStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        // No subscribers is fine.
        let _ = self.status_tx.send(SessionStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl SessionObserver for BroadcastObserver {
    fn on_connect(&self) {
        self.set_status(SessionStatus::Connected, None);
    }

    fn on_disconnect(&self) {
        self.set_status(SessionStatus::Disconnected, None);
    }

    fn on_error(&self, detail: &str) {
        self.set_status(SessionStatus::Error, Some(detail.to_string()));
    }

    fn on_volume_level(&self, level: f32) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.volume_tx.send(VolumeLevelEvent { seq, rms: level });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_calls_publish_status_events() {
        let observer = BroadcastObserver::new();
        let mut rx = observer.subscribe_status();

        observer.set_status(SessionStatus::Connecting, None);
        observer.on_connect();
        observer.on_error("socket reset");
        observer.on_disconnect();

        let seen: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let statuses: Vec<_> = seen.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Connecting,
                SessionStatus::Connected,
                SessionStatus::Error,
                SessionStatus::Disconnected,
            ]
        );
        assert_eq!(seen[2].detail.as_deref(), Some("socket reset"));
        assert_eq!(observer.status(), SessionStatus::Disconnected);
    }

    #[test]
    fn volume_levels_carry_increasing_sequence_numbers() {
        let observer = BroadcastObserver::new();
        let mut rx = observer.subscribe_volume();

        observer.on_volume_level(0.1);
        observer.on_volume_level(0.4);

        let a = rx.try_recv().unwrap();
        let b = rx.try_recv().unwrap();
        assert_eq!((a.seq, b.seq), (0, 1));
        assert!((b.rms - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let observer = BroadcastObserver::new();
        observer.on_connect();
        observer.on_volume_level(0.5);
        assert_eq!(observer.status(), SessionStatus::Connected);
    }
}
