//! Audio device contexts for a live session.
//!
//! A session owns two independent device contexts: a capture context that
//! delivers fixed-size frames at the endpoint input rate, and a playback
//! context with its own clock onto which decoded buffers are scheduled. They
//! never share a device handle since their rates and lifetimes differ.
//!
//! # Design constraints
//!
//! cpal callbacks run on OS audio threads at elevated priority. They must
//! not block on a mutex, perform I/O, or allocate in the steady state. The
//! capture callback writes into an SPSC ring; the playback callback talks to
//! the rest of the process only through bounded `crossbeam-channel` queues.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). Each stream is therefore created, kept, and dropped on a
//! dedicated device thread. Closing a context signals that thread and
//! resolves once the stream has been dropped.

pub mod device;
pub mod mixer;
pub mod resample;

#[cfg(feature = "audio-cpal")]
mod capture;
#[cfg(feature = "audio-cpal")]
mod playback;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::{
    buffering::frame::{OutboundFrame, PlaybackBuffer},
    error::Result,
};

/// Identifier of one scheduled playback source, unique per playback context.
pub type SourceId = u64;

/// Invoked off the realtime thread when a source finishes or is stopped.
pub type EndedHandler = Arc<dyn Fn(SourceId) + Send + Sync>;

/// Where the capture context delivers complete frames, in capture order.
pub type FrameSender = mpsc::UnboundedSender<OutboundFrame>;

/// Completion handle returned by `close()` on a device context.
///
/// Awaiting [`DeviceClosing::wait`] resolves once the device thread has
/// released the OS handle.
#[derive(Debug)]
pub struct DeviceClosing {
    done: Option<oneshot::Receiver<()>>,
}

impl DeviceClosing {
    /// Already closed (or never opened).
    pub fn completed() -> Self {
        Self { done: None }
    }

    pub(crate) fn pending(done: oneshot::Receiver<()>) -> Self {
        Self { done: Some(done) }
    }

    pub async fn wait(self) {
        if let Some(done) = self.done {
            // A dropped sender means the thread exited without signalling,
            // which also releases the stream.
            let _ = done.await;
        }
    }
}

/// Capture-side device context (microphone).
pub trait InputDevice: Send {
    /// Rate of the frames this context delivers (Hz).
    fn sample_rate(&self) -> u32;

    /// Begin forwarding frames to the session. Frames captured before this
    /// call are discarded.
    fn start(&mut self);

    /// Stop capture and release the microphone. Idempotent.
    fn close(&mut self) -> DeviceClosing;
}

/// Playback-side device context (speaker) with its own clock.
pub trait OutputDevice: Send {
    /// Rate of the buffers this context accepts (Hz).
    fn sample_rate(&self) -> u32;

    /// Current position of the playback clock in seconds.
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to begin at `when` seconds on the playback clock.
    /// A start time in the past plays immediately.
    fn start_source(&mut self, id: SourceId, buffer: PlaybackBuffer, when: f64) -> Result<()>;

    /// Stop a source immediately, whether or not it has started.
    fn stop_source(&mut self, id: SourceId);

    /// Stop rendering and release the output device. Idempotent.
    fn close(&mut self) -> DeviceClosing;
}

/// Opens device contexts. Swappable so sessions can run against in-memory
/// devices in tests.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire a playback context whose buffers run at `sample_rate`.
    async fn open_output(
        &self,
        sample_rate: u32,
        on_ended: EndedHandler,
    ) -> Result<Box<dyn OutputDevice>>;

    /// Acquire the microphone and a capture context delivering
    /// `frame_len`-sample frames at `sample_rate`.
    ///
    /// # Errors
    /// A device-access error when permission is denied or no microphone
    /// exists.
    async fn open_input(
        &self,
        sample_rate: u32,
        frame_len: usize,
        frames: FrameSender,
    ) -> Result<Box<dyn InputDevice>>;
}

/// cpal-backed devices, honouring optional preferred device names.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
}

impl CpalBackend {
    pub fn new(
        preferred_input_device: Option<String>,
        preferred_output_device: Option<String>,
    ) -> Self {
        Self {
            preferred_input_device,
            preferred_output_device,
        }
    }
}

#[cfg(feature = "audio-cpal")]
#[async_trait]
impl AudioBackend for CpalBackend {
    async fn open_output(
        &self,
        sample_rate: u32,
        on_ended: EndedHandler,
    ) -> Result<Box<dyn OutputDevice>> {
        let output = playback::CpalOutput::open(
            sample_rate,
            on_ended,
            self.preferred_output_device.clone(),
        )
        .await?;
        Ok(Box::new(output))
    }

    async fn open_input(
        &self,
        sample_rate: u32,
        frame_len: usize,
        frames: FrameSender,
    ) -> Result<Box<dyn InputDevice>> {
        let input = capture::CpalInput::open(
            sample_rate,
            frame_len,
            frames,
            self.preferred_input_device.clone(),
        )
        .await?;
        Ok(Box::new(input))
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
#[async_trait]
impl AudioBackend for CpalBackend {
    async fn open_output(
        &self,
        _sample_rate: u32,
        _on_ended: EndedHandler,
    ) -> Result<Box<dyn OutputDevice>> {
        Err(crate::error::TutorError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    async fn open_input(
        &self,
        _sample_rate: u32,
        _frame_len: usize,
        _frames: FrameSender,
    ) -> Result<Box<dyn InputDevice>> {
        Err(crate::error::TutorError::DeviceAccess(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
