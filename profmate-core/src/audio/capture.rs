//! Microphone capture via cpal.
//!
//! ```text
//! cpal callback ──push_slice──► SPSC ring ──► pump thread
//!                                               │ resample → 16 kHz
//!                                               │ slice 4096-sample frames
//!                                               ▼
//!                                        FrameSender (session uplink)
//! ```
//!
//! The callback only downmixes into a scratch buffer and pushes into the
//! ring. The pump thread owns the `cpal::Stream`, so the stream is created
//! and dropped on one OS thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, Stream, StreamConfig,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::{
    device::{select_device, DeviceKind},
    resample::RateConverter,
    DeviceClosing, FrameSender, InputDevice,
};
use crate::{
    buffering::{
        create_capture_ring, frame::FrameAssembler, CaptureConsumer, CaptureProducer, Consumer,
        Producer,
    },
    error::{Result, TutorError},
};

/// Samples drained from the ring per pump iteration.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty, so the pump doesn't spin a core.
const EMPTY_SLEEP: Duration = Duration::from_millis(5);

/// Capture context backed by a cpal input stream on its own thread.
pub(crate) struct CpalInput {
    sample_rate: u32,
    /// Cleared to stop the pump and drop the stream.
    running: Arc<AtomicBool>,
    /// Set once the session wants frames.
    streaming: Arc<AtomicBool>,
    done: Option<oneshot::Receiver<()>>,
}

impl CpalInput {
    /// Acquire the microphone. Resolves once the stream is playing, or with
    /// a device-access error.
    pub(crate) async fn open(
        sample_rate: u32,
        frame_len: usize,
        frames: FrameSender,
        preferred_device: Option<String>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let streaming = Arc::new(AtomicBool::new(false));
        let (open_tx, open_rx) = oneshot::channel::<Result<u32>>();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let thread_running = Arc::clone(&running);
        let thread_streaming = Arc::clone(&streaming);
        std::thread::Builder::new()
            .name("profmate-capture".into())
            .spawn(move || {
                let (producer, consumer) = create_capture_ring();
                let (stream, device_rate) = match open_stream(
                    producer,
                    Arc::clone(&thread_running),
                    preferred_device.as_deref(),
                ) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                let _ = open_tx.send(Ok(device_rate));

                run_pump(PumpContext {
                    consumer,
                    running: thread_running,
                    streaming: thread_streaming,
                    device_rate,
                    sample_rate,
                    frame_len,
                    frames,
                });

                // Releases the microphone on the thread that created it.
                drop(stream);
                info!("capture stream released");
                let _ = done_tx.send(());
            })?;

        match open_rx.await {
            Ok(Ok(device_rate)) => {
                info!(device_rate, sample_rate, frame_len, "microphone acquired");
                Ok(Self {
                    sample_rate,
                    running,
                    streaming,
                    done: Some(done_rx),
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TutorError::DeviceAccess(
                "capture thread exited before opening the microphone".into(),
            )),
        }
    }
}

impl InputDevice for CpalInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) {
        self.streaming.store(true, Ordering::Release);
    }

    fn close(&mut self) -> DeviceClosing {
        self.streaming.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
        match self.done.take() {
            Some(done) => DeviceClosing::pending(done),
            None => DeviceClosing::completed(),
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

struct PumpContext {
    consumer: CaptureConsumer,
    running: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    device_rate: u32,
    sample_rate: u32,
    frame_len: usize,
    frames: FrameSender,
}

/// Drain the ring until `running` clears: resample, frame, forward.
fn run_pump(mut ctx: PumpContext) {
    let mut converter = match RateConverter::new(ctx.device_rate, ctx.sample_rate, DRAIN_CHUNK) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to create capture resampler: {e}");
            return;
        }
    };
    let mut assembler = FrameAssembler::new(ctx.frame_len, ctx.sample_rate);
    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut was_streaming = false;

    while ctx.running.load(Ordering::Acquire) {
        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(EMPTY_SLEEP);
            continue;
        }

        let streaming = ctx.streaming.load(Ordering::Acquire);
        if !streaming {
            if was_streaming {
                assembler.clear();
                converter.reset();
            }
            was_streaming = false;
            continue;
        }
        was_streaming = true;

        let converted = converter.process(&raw[..n]);
        for frame in assembler.push(&converted) {
            debug!(samples = frame.samples.len(), "capture frame ready");
            if ctx.frames.send(frame).is_err() {
                debug!("frame receiver dropped, stopping capture pump");
                return;
            }
        }
    }
}

/// Open the input stream at the device's native format and rate, pushing
/// mono f32 into `producer`.
fn open_stream(
    mut producer: CaptureProducer,
    running: Arc<AtomicBool>,
    preferred_device: Option<&str>,
) -> Result<(Stream, u32)> {
    let device = select_device(DeviceKind::Input, preferred_device)?;
    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening input device"
    );

    let supported = device
        .default_input_config()
        .map_err(|e| TutorError::DeviceAccess(e.to_string()))?;
    let device_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config: StreamConfig = supported.config();

    let mut mono: Vec<f32> = Vec::new();
    let mut push_mono = move |frames: usize, sample: &dyn Fn(usize) -> f32| {
        mono.resize(frames, 0.0);
        for (f, slot) in mono.iter_mut().enumerate() {
            let base = f * channels;
            let sum: f32 = (0..channels).map(|c| sample(base + c)).sum();
            *slot = sum / channels as f32;
        }
        let written = producer.push_slice(&mono);
        if written < mono.len() {
            warn!("capture ring full: dropped {} samples", mono.len() - written);
        }
    };

    let on_error = |err: cpal::StreamError| error!("capture stream error: {err}");
    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            let running = Arc::clone(&running);
            device.build_input_stream(
                &config,
                move |data: &[f32], _info| {
                    if running.load(Ordering::Relaxed) {
                        push_mono(data.len() / channels, &|i| data[i]);
                    }
                },
                on_error,
                None,
            )
        }
        SampleFormat::I16 => {
            let running = Arc::clone(&running);
            device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    if running.load(Ordering::Relaxed) {
                        push_mono(data.len() / channels, &|i| data[i] as f32 / 32768.0);
                    }
                },
                on_error,
                None,
            )
        }
        SampleFormat::U8 => {
            let running = Arc::clone(&running);
            device.build_input_stream(
                &config,
                move |data: &[u8], _info| {
                    if running.load(Ordering::Relaxed) {
                        push_mono(data.len() / channels, &|i| (data[i] as f32 - 128.0) / 128.0);
                    }
                },
                on_error,
                None,
            )
        }
        fmt => {
            return Err(TutorError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }
    // Permission denial surfaces here on platforms that gate the microphone.
    .map_err(|e| TutorError::DeviceAccess(e.to_string()))?;

    stream
        .play()
        .map_err(|e| TutorError::DeviceAccess(e.to_string()))?;

    Ok((stream, device_rate))
}

#[cfg(test)]
mod tests {
    use std::thread::JoinHandle;
    use std::time::Instant;

    use ringbuf::traits::Observer;
    use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};

    use super::*;
    use crate::buffering::frame::OutboundFrame;

    struct Pump {
        producer: CaptureProducer,
        frames: UnboundedReceiver<OutboundFrame>,
        running: Arc<AtomicBool>,
        streaming: Arc<AtomicBool>,
        handle: JoinHandle<()>,
    }

    fn spawn_pump(device_rate: u32, frame_len: usize) -> Pump {
        let (producer, consumer) = create_capture_ring();
        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let streaming = Arc::new(AtomicBool::new(false));
        let ctx = PumpContext {
            consumer,
            running: Arc::clone(&running),
            streaming: Arc::clone(&streaming),
            device_rate,
            sample_rate: 16_000,
            frame_len,
            frames: tx,
        };
        Pump {
            producer,
            frames: rx,
            running,
            streaming,
            handle: std::thread::spawn(move || run_pump(ctx)),
        }
    }

    impl Pump {
        fn push(&mut self, samples: &[f32]) {
            assert_eq!(self.producer.push_slice(samples), samples.len());
        }

        /// Wait for the pump to pop everything, plus one loop iteration.
        fn drain(&self) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !self.producer.is_empty() {
                assert!(Instant::now() < deadline, "pump never drained the ring");
                std::thread::sleep(Duration::from_millis(1));
            }
            std::thread::sleep(EMPTY_SLEEP * 4);
        }

        fn set_streaming(&self, on: bool) {
            self.streaming.store(on, Ordering::Release);
        }

        fn collect(&mut self) -> Vec<OutboundFrame> {
            let mut out = Vec::new();
            while let Ok(frame) = self.frames.try_recv() {
                out.push(frame);
            }
            out
        }
    }

    fn wait_finished(handle: &JoinHandle<()>) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "pump thread still running");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn samples_before_start_are_dropped() {
        let mut pump = spawn_pump(16_000, 1024);
        pump.push(&vec![0.5; 1024 * 8]);
        pump.drain();
        assert!(matches!(pump.frames.try_recv(), Err(TryRecvError::Empty)));

        pump.set_streaming(true);
        pump.push(&vec![0.25; 1024]);
        pump.drain();
        let frames = pump.collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].samples.iter().all(|&s| s == 0.25));

        pump.running.store(false, Ordering::Release);
        wait_finished(&pump.handle);
    }

    #[test]
    fn device_rate_audio_becomes_exact_16k_frames_in_order() {
        let mut pump = spawn_pump(48_000, 4096);
        pump.set_streaming(true);

        // One second of a rising ramp at 48 kHz.
        let ramp: Vec<f32> = (0..48_000).map(|i| i as f32 / 48_000.0).collect();
        pump.push(&ramp);
        pump.drain();

        let frames = pump.collect();
        assert!(frames.len() >= 3, "got {} frames", frames.len());
        for frame in &frames {
            assert_eq!(frame.samples.len(), 4096);
            assert_eq!(frame.sample_rate, 16_000);
        }
        for pair in frames.windows(2) {
            assert!(pair[0].samples[0] < pair[1].samples[0]);
        }

        pump.running.store(false, Ordering::Release);
        wait_finished(&pump.handle);
    }

    #[test]
    fn stopping_the_stream_discards_the_partial_frame() {
        let mut pump = spawn_pump(16_000, 8);
        pump.set_streaming(true);
        pump.push(&[1.0; 5]);
        pump.drain();

        pump.set_streaming(false);
        pump.push(&[9.0; 3]);
        pump.drain();

        pump.set_streaming(true);
        pump.push(&[2.0; 8]);
        pump.drain();

        let frames = pump.collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, vec![2.0; 8]);

        pump.running.store(false, Ordering::Release);
        wait_finished(&pump.handle);
    }

    #[test]
    fn pump_exits_when_running_clears() {
        let pump = spawn_pump(48_000, 4096);
        pump.running.store(false, Ordering::Release);
        wait_finished(&pump.handle);
    }

    #[test]
    fn pump_exits_when_frame_receiver_is_dropped() {
        let pump = spawn_pump(16_000, 4);
        pump.set_streaming(true);
        let Pump {
            mut producer,
            frames,
            running,
            handle,
            ..
        } = pump;
        drop(frames);
        assert_eq!(producer.push_slice(&[0.1; 8]), 8);
        wait_finished(&handle);
        assert!(running.load(Ordering::Acquire));
    }
}
