use thiserror::Error;

/// All errors produced by profmate-core.
#[derive(Debug, Error)]
pub enum TutorError {
    #[error("audio device access denied or unavailable: {0}")]
    DeviceAccess(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("live channel error: {0}")]
    Channel(String),

    #[error("live channel is closed")]
    ChannelClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("a live session is already connected")]
    AlreadyConnected,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TutorError {
    /// Microphone or speaker could not be acquired.
    ///
    /// Callers use this to reset their visible state to "disconnected" and
    /// tell the user to check device permissions.
    pub fn is_device_access(&self) -> bool {
        matches!(
            self,
            Self::DeviceAccess(_)
                | Self::AudioStream(_)
                | Self::NoDefaultInputDevice
                | Self::NoDefaultOutputDevice
        )
    }

    pub(crate) fn channel(msg: impl std::fmt::Display) -> Self {
        Self::Channel(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
