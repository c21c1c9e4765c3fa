//! `LiveTutorClient`: lifecycle controller for one live voice session.
//!
//! ## Lifecycle
//!
//! ```text
//! LiveTutorClient::new()
//!     └─► connect(instruction)  → playback opened, mic acquired, channel open,
//!         │                       on_connect, downlink + uplink spawned
//!         └─► disconnect()      → tasks aborted, sources stopped, devices
//!                                 released, channel closed, on_disconnect
//! ```
//!
//! `connect()` while a session is live returns `AlreadyConnected`.
//! `disconnect()` is idempotent. A session the endpoint already closed is
//! torn down by the next `connect()` or `disconnect()`.
//!
//! ## Failure paths
//!
//! Device and channel-open failures are returned to the caller, never
//! retried. Everything opened before the failing step is closed first, so a
//! failed connect leaves no device held.

pub mod config;
pub mod diagnostics;
mod streams;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

pub use config::SessionConfig;
pub use diagnostics::{DiagnosticsSnapshot, SessionDiagnostics};
pub use streams::handle_server_message;

use crate::{
    audio::{AudioBackend, CpalBackend, InputDevice},
    error::{Result, TutorError},
    ipc::SessionObserver,
    playback::{ActiveSources, PlaybackScheduler},
    transport::{ChannelConnector, GeminiConnector, LiveChannel},
};
use streams::{run_downlink, run_uplink, DownlinkContext, UplinkContext};

/// The client handle.
///
/// `LiveTutorClient` is `Send + Sync`; wrap it in an `Arc` to call
/// `disconnect()` from a different task than the one that connected.
pub struct LiveTutorClient {
    config: SessionConfig,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn ChannelConnector>,
    observer: Arc<dyn SessionObserver>,
    /// At most one session. Held across `connect`/`disconnect` so the two
    /// never interleave.
    session: AsyncMutex<Option<ActiveSession>>,
    /// `true` from a successful connect until disconnect or remote close.
    live: Arc<AtomicBool>,
    diagnostics: Arc<SessionDiagnostics>,
}

impl LiveTutorClient {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn ChannelConnector>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            config,
            backend,
            connector,
            observer,
            session: AsyncMutex::new(None),
            live: Arc::new(AtomicBool::new(false)),
            diagnostics: Arc::new(SessionDiagnostics::default()),
        }
    }

    /// Client on real devices talking to Gemini Live with `api_key`.
    pub fn gemini(
        config: SessionConfig,
        api_key: impl Into<String>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let backend = CpalBackend::new(
            config.preferred_input_device.clone(),
            config.preferred_output_device.clone(),
        );
        let connector = GeminiConnector::with_endpoint(config.endpoint.clone(), api_key);
        Self::new(config, Arc::new(backend), Arc::new(connector), observer)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open devices and the channel, then start streaming both ways.
    ///
    /// # Errors
    /// - `TutorError::AlreadyConnected` if a session is live.
    /// - A device error (`is_device_access()`) if the speaker or microphone
    ///   can't be acquired.
    /// - `TutorError::Channel` if the endpoint can't be reached or rejects
    ///   setup.
    pub async fn connect(&self, system_instruction: &str) -> Result<()> {
        let mut slot = self.session.lock().await;
        if slot.is_some() && self.live.load(Ordering::Acquire) {
            return Err(TutorError::AlreadyConnected);
        }
        if let Some(mut stale) = slot.take() {
            // Endpoint closed it earlier; devices are still held.
            if let Err(e) = stale.teardown(&self.observer, &self.diagnostics).await {
                warn!("closing previous session: {e}");
            }
        }

        self.diagnostics.reset();
        let session_id = Uuid::new_v4();
        let span = info_span!("live_session", %session_id);

        let session = self
            .open_session(system_instruction, span.clone())
            .instrument(span)
            .await?;
        *slot = Some(session);
        Ok(())
    }

    async fn open_session(&self, system_instruction: &str, span: Span) -> Result<ActiveSession> {
        let cfg = &self.config;
        info!(model = %cfg.model, voice = %cfg.voice_name, "connecting live session");

        // 1. Playback context.
        let active = ActiveSources::new();
        let output = self
            .backend
            .open_output(cfg.output_sample_rate, active.ended_handler())
            .await?;
        let mut scheduler = PlaybackScheduler::new(output, active);

        // 2. Microphone.
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let mut input = match self
            .backend
            .open_input(cfg.input_sample_rate, cfg.frame_len, frame_tx)
            .await
        {
            Ok(input) => input,
            Err(e) => {
                warn!("microphone unavailable: {e}");
                scheduler.close().wait().await;
                return Err(e);
            }
        };

        // 3. Channel; resolves on setup acknowledgement.
        let setup = cfg.setup_request(system_instruction);
        let channel = match self.connector.open(&setup).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("live channel failed to open: {e}");
                let input_closing = input.close();
                let output_closing = scheduler.close();
                input_closing.wait().await;
                output_closing.wait().await;
                return Err(e);
            }
        };

        // 4. Open: notify before the first frame can go out.
        self.live.store(true, Ordering::Release);
        self.observer.on_connect();
        info!("live session connected");

        let scheduler = Arc::new(Mutex::new(scheduler));
        let disconnect_reported = Arc::new(AtomicBool::new(false));

        let downlink = tokio::spawn(
            run_downlink(DownlinkContext {
                channel: Arc::clone(&channel),
                scheduler: Arc::clone(&scheduler),
                observer: Arc::clone(&self.observer),
                diagnostics: Arc::clone(&self.diagnostics),
                live: Arc::clone(&self.live),
                disconnect_reported: Arc::clone(&disconnect_reported),
            })
            .instrument(span.clone()),
        );

        input.start();
        let uplink = tokio::spawn(
            run_uplink(UplinkContext {
                frames: frame_rx,
                channel: Arc::clone(&channel),
                observer: Arc::clone(&self.observer),
                diagnostics: Arc::clone(&self.diagnostics),
            })
            .instrument(span.clone()),
        );

        Ok(ActiveSession {
            input,
            scheduler,
            channel,
            uplink,
            downlink,
            disconnect_reported,
            span,
        })
    }

    /// Stop playback, release both devices, and close the channel.
    ///
    /// Idempotent: with no session this returns `Ok(())` immediately. The
    /// session is cleared even when closing the channel fails; that error is
    /// returned afterwards.
    pub async fn disconnect(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        let Some(mut session) = slot.take() else {
            return Ok(());
        };
        self.live.store(false, Ordering::Release);
        session.teardown(&self.observer, &self.diagnostics).await
    }

    /// `true` while a session is open and the endpoint hasn't closed it.
    pub fn is_connected(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Counters for the current (or last) session.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

/// Everything one open session holds.
struct ActiveSession {
    input: Box<dyn InputDevice>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    channel: Arc<dyn LiveChannel>,
    uplink: JoinHandle<()>,
    downlink: JoinHandle<()>,
    disconnect_reported: Arc<AtomicBool>,
    span: Span,
}

impl ActiveSession {
    async fn teardown(
        &mut self,
        observer: &Arc<dyn SessionObserver>,
        diagnostics: &SessionDiagnostics,
    ) -> Result<()> {
        let span = self.span.clone();
        async {
            // No sends or schedules after this point.
            self.uplink.abort();
            self.downlink.abort();
            let _ = (&mut self.uplink).await;
            let _ = (&mut self.downlink).await;

            let (stopped, output_closing) = {
                let mut scheduler = self.scheduler.lock();
                let stopped = scheduler.stop_all();
                (stopped, scheduler.close())
            };
            diagnostics
                .sources_stopped
                .fetch_add(stopped, Ordering::Relaxed);

            let input_closing = self.input.close();
            input_closing.wait().await;
            output_closing.wait().await;

            let closed = self.channel.close().await;
            if let Err(e) = &closed {
                warn!("closing live channel: {e}");
            }

            if !self.disconnect_reported.swap(true, Ordering::AcqRel) {
                observer.on_disconnect();
            }
            info!(stopped, "live session disconnected");
            closed
        }
        .instrument(span)
        .await
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.uplink.abort();
        self.downlink.abort();
    }
}
