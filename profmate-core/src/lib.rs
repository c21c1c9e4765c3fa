//! # profmate-core
//!
//! Realtime voice session client for a live AI tutor.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → cpal callback → SPSC ring → pump thread (resample, 4096-sample frames)
//!                                               │
//!                                        uplink task: rms → observer
//!                                               │     PCM16 + base64
//!                                               ▼
//!                                         LiveChannel (Gemini Live WebSocket)
//!                                               │
//!                                        downlink task: decode PCM16 @ 24 kHz
//!                                               │
//!                                      PlaybackScheduler (gapless cursor)
//!                                               │
//!                                  mixer in cpal output callback → Speaker
//! ```
//!
//! Audio callbacks never block or allocate in the steady state. Everything
//! else runs on tokio tasks or dedicated device threads.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod codec;
pub mod error;
pub mod ipc;
pub mod playback;
pub mod session;
pub mod transport;

// Convenience re-exports for downstream crates
pub use audio::{AudioBackend, CpalBackend};
pub use error::{Result, TutorError};
pub use ipc::events::{SessionStatus, SessionStatusEvent, VolumeLevelEvent};
pub use ipc::{BroadcastObserver, NoopObserver, SessionObserver};
pub use session::{DiagnosticsSnapshot, LiveTutorClient, SessionConfig};
pub use transport::{ChannelConnector, GeminiConnector, LiveChannel};
