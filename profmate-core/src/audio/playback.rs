//! Speaker playback via cpal.
//!
//! The output callback owns a [`Mixer`]. Everything else talks to it through
//! two bounded queues: start/stop commands in, ended source ids out. The
//! device thread keeps the `cpal::Stream` alive and relays ended ids to the
//! session's handler, so the handler never runs on the realtime thread.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::{
    device::{select_device, DeviceKind},
    mixer::{Mixer, MixerCommand, Voice, MIXER_QUEUE_DEPTH},
    DeviceClosing, EndedHandler, OutputDevice, SourceId,
};
use crate::{
    buffering::frame::PlaybackBuffer,
    error::{Result, TutorError},
};

/// Playback context backed by a cpal output stream on its own thread.
pub(crate) struct CpalOutput {
    /// Rate of the buffers the session schedules.
    sample_rate: u32,
    /// Native rate the device renders at.
    device_rate: u32,
    /// Device frames rendered; the playback clock.
    clock: Arc<AtomicU64>,
    commands: Sender<MixerCommand>,
    /// Dropping this tells the device thread to release the stream.
    shutdown: Option<Sender<()>>,
    done: Option<oneshot::Receiver<()>>,
}

impl CpalOutput {
    pub(crate) async fn open(
        sample_rate: u32,
        on_ended: EndedHandler,
        preferred_device: Option<String>,
    ) -> Result<Self> {
        let clock = Arc::new(AtomicU64::new(0));
        let (cmd_tx, cmd_rx) = bounded::<MixerCommand>(MIXER_QUEUE_DEPTH);
        let (ended_tx, ended_rx) = bounded::<SourceId>(MIXER_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (open_tx, open_rx) = oneshot::channel::<Result<u32>>();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let mixer = Mixer::new(cmd_rx, ended_tx, Arc::clone(&clock));
        std::thread::Builder::new()
            .name("profmate-playback".into())
            .spawn(move || {
                let (stream, device_rate) = match open_stream(mixer, preferred_device.as_deref())
                {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                let _ = open_tx.send(Ok(device_rate));

                relay_ended(&ended_rx, &shutdown_rx, &on_ended);

                drop(stream);
                info!("playback stream released");
                let _ = done_tx.send(());
            })?;

        match open_rx.await {
            Ok(Ok(device_rate)) => {
                info!(device_rate, sample_rate, "playback device opened");
                Ok(Self {
                    sample_rate,
                    device_rate,
                    clock,
                    commands: cmd_tx,
                    shutdown: Some(shutdown_tx),
                    done: Some(done_rx),
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TutorError::AudioStream(
                "playback thread exited before opening the device".into(),
            )),
        }
    }
}

impl OutputDevice for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn start_source(&mut self, id: SourceId, buffer: PlaybackBuffer, when: f64) -> Result<()> {
        if self.shutdown.is_none() {
            return Err(TutorError::AudioStream("playback device is closed".into()));
        }
        let voice = Voice::new(id, buffer.samples, buffer.sample_rate, self.device_rate, when);
        self.commands
            .try_send(MixerCommand::Start(voice))
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    TutorError::AudioStream("playback command queue full".into())
                }
                TrySendError::Disconnected(_) => {
                    TutorError::AudioStream("playback stream has stopped".into())
                }
            })
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Err(e) = self.commands.try_send(MixerCommand::Stop(id)) {
            debug!(source = id, "stop not delivered: {e}");
        }
    }

    fn close(&mut self) -> DeviceClosing {
        self.shutdown.take();
        match self.done.take() {
            Some(done) => DeviceClosing::pending(done),
            None => DeviceClosing::completed(),
        }
    }
}

/// Forward ended ids to the handler until shutdown.
fn relay_ended(ended: &Receiver<SourceId>, shutdown: &Receiver<()>, on_ended: &EndedHandler) {
    loop {
        select! {
            recv(ended) -> id => match id {
                Ok(id) => on_ended(id),
                Err(_) => return,
            },
            recv(shutdown) -> _ => return,
        }
    }
}

fn open_stream(mixer: Mixer, preferred_device: Option<&str>) -> Result<(Stream, u32)> {
    let device = select_device(DeviceKind::Output, preferred_device)?;
    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening output device"
    );

    let supported = device
        .default_output_config()
        .map_err(|e| TutorError::DeviceAccess(e.to_string()))?;
    let device_rate = supported.sample_rate().0;
    let config = supported.config();

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
        fmt => {
            return Err(TutorError::AudioStream(format!(
                "unsupported output sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| TutorError::AudioStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| TutorError::AudioStream(e.to_string()))?;

    Ok((stream, device_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mixer: Mixer,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut mono: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);
            mixer.render(&mut mono);
            for (frame, &s) in data.chunks_mut(channels).zip(mono.iter()) {
                let value = T::from_sample(s);
                frame.iter_mut().for_each(|out| *out = value);
            }
        },
        |err| error!("playback stream error: {err}"),
        None,
    )
}
