//! The two per-session tasks.
//!
//! ```text
//! capture frames ──► uplink  ──► rms → observer, PCM16/base64 → channel
//! channel msgs   ──► downlink ──► decode → PlaybackScheduler
//! ```
//!
//! Each task handles its items strictly in order, so outbound frames leave
//! in capture order and inbound chunks are scheduled in receipt order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use super::diagnostics::SessionDiagnostics;
use crate::{
    buffering::frame::{OutboundFrame, PlaybackBuffer},
    codec::{decode_pcm16_base64, rms, MediaBlob},
    error::TutorError,
    ipc::SessionObserver,
    playback::{PlaybackScheduler, ScheduledSource},
    transport::{LiveChannel, ServerMessage},
};

pub(crate) struct UplinkContext {
    pub frames: UnboundedReceiver<OutboundFrame>,
    pub channel: Arc<dyn LiveChannel>,
    pub observer: Arc<dyn SessionObserver>,
    pub diagnostics: Arc<SessionDiagnostics>,
}

/// Forward captured frames until the capture side or the channel goes away.
pub(crate) async fn run_uplink(mut ctx: UplinkContext) {
    while let Some(frame) = ctx.frames.recv().await {
        SessionDiagnostics::bump(&ctx.diagnostics.frames_captured);
        ctx.observer.on_volume_level(rms(&frame.samples));

        let blob = MediaBlob::pcm16(&frame.samples, frame.sample_rate);
        match ctx.channel.send_realtime_input(blob).await {
            Ok(()) => {
                SessionDiagnostics::bump(&ctx.diagnostics.frames_sent);
                debug!(samples = frame.samples.len(), "sent audio frame");
            }
            Err(TutorError::ChannelClosed) => {
                SessionDiagnostics::bump(&ctx.diagnostics.send_failures);
                info!("live channel closed, uplink stopping");
                return;
            }
            Err(e) => {
                SessionDiagnostics::bump(&ctx.diagnostics.send_failures);
                warn!("failed to send audio frame: {e}");
            }
        }
    }
    debug!("capture frames ended, uplink stopping");
}

pub(crate) struct DownlinkContext {
    pub channel: Arc<dyn LiveChannel>,
    pub scheduler: Arc<Mutex<PlaybackScheduler>>,
    pub observer: Arc<dyn SessionObserver>,
    pub diagnostics: Arc<SessionDiagnostics>,
    /// Cleared when the endpoint closes the channel.
    pub live: Arc<AtomicBool>,
    /// Set once `on_disconnect` has been delivered for this session.
    pub disconnect_reported: Arc<AtomicBool>,
}

/// Receive until the channel closes, scheduling every audio chunk.
pub(crate) async fn run_downlink(ctx: DownlinkContext) {
    loop {
        match ctx.channel.next_message().await {
            Some(Ok(msg)) => {
                SessionDiagnostics::bump(&ctx.diagnostics.inbound_messages);
                handle_server_message(&msg, &ctx.scheduler, &ctx.diagnostics);
            }
            Some(Err(TutorError::Protocol(detail))) => {
                SessionDiagnostics::bump(&ctx.diagnostics.inbound_messages);
                warn!("ignoring malformed server message: {detail}");
            }
            Some(Err(e)) => {
                error!("live channel error: {e}");
                ctx.observer.on_error(&e.to_string());
            }
            None => {
                info!("live channel closed by endpoint");
                ctx.live.store(false, Ordering::Release);
                if !ctx.disconnect_reported.swap(true, Ordering::AcqRel) {
                    ctx.observer.on_disconnect();
                }
                return;
            }
        }
    }
}

/// Decode the audio payload of `msg`, if any, and chain it onto playback.
///
/// Messages without audio and undecodable payloads are ignored.
pub fn handle_server_message(
    msg: &ServerMessage,
    scheduler: &Mutex<PlaybackScheduler>,
    diagnostics: &SessionDiagnostics,
) -> Option<ScheduledSource> {
    let payload = msg.audio_payload()?;

    let samples = match decode_pcm16_base64(payload) {
        Ok(samples) => samples,
        Err(e) => {
            SessionDiagnostics::bump(&diagnostics.malformed_chunks);
            warn!("dropping undecodable audio chunk: {e}");
            return None;
        }
    };
    if samples.is_empty() {
        return None;
    }

    let mut scheduler = scheduler.lock();
    let buffer = PlaybackBuffer::new(samples, scheduler.sample_rate());
    match scheduler.schedule(buffer) {
        Ok(scheduled) => {
            SessionDiagnostics::bump(&diagnostics.chunks_scheduled);
            Some(scheduled)
        }
        Err(e) => {
            warn!("failed to schedule audio chunk: {e}");
            None
        }
    }
}
