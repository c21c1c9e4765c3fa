//! Realtime playback mixer.
//!
//! Owned by the output callback. Sources arrive as commands over a bounded
//! queue and carry a start position on the device frame clock; each render
//! pass sums every active source at the device rate, resampling from the
//! source rate with linear interpolation. Finished and stopped sources are
//! reported on the `ended` queue so the session can drop them from its
//! active set off the realtime thread.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

use super::SourceId;

/// Upper bound on simultaneously mixed sources before the voice list grows.
const VOICE_CAPACITY: usize = 64;

/// Queue depth for start/stop commands and ended notifications.
pub const MIXER_QUEUE_DEPTH: usize = 256;

#[derive(Debug)]
pub enum MixerCommand {
    Start(Voice),
    Stop(SourceId),
}

/// A source scheduled on the device clock.
#[derive(Debug, Clone)]
pub struct Voice {
    pub id: SourceId,
    pub samples: Arc<[f32]>,
    /// First device frame at which this voice is audible.
    pub start_frame: u64,
    /// Source samples advanced per device frame (`source_rate / device_rate`).
    pub step: f64,
}

impl Voice {
    pub fn new(
        id: SourceId,
        samples: Arc<[f32]>,
        source_rate: u32,
        device_rate: u32,
        start_secs: f64,
    ) -> Self {
        let start_frame = (start_secs.max(0.0) * device_rate as f64).round() as u64;
        Self {
            id,
            samples,
            start_frame,
            step: source_rate as f64 / device_rate as f64,
        }
    }

    fn sample_at(&self, frame: u64) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        let pos = (frame - self.start_frame) as f64 * self.step;
        let idx = pos as usize;
        let Some(&a) = self.samples.get(idx) else {
            return 0.0;
        };
        let b = self.samples.get(idx + 1).copied().unwrap_or(a);
        let frac = (pos - idx as f64) as f32;
        a + (b - a) * frac
    }

    /// True once every sample has been rendered before `frame`.
    fn finished_by(&self, frame: u64) -> bool {
        if frame <= self.start_frame {
            return false;
        }
        ((frame - self.start_frame) as f64 * self.step) as usize >= self.samples.len()
    }
}

/// Mixer state moved into the output callback.
pub struct Mixer {
    commands: Receiver<MixerCommand>,
    ended: Sender<SourceId>,
    voices: Vec<Voice>,
    /// Frames added to every start since a late arrival, so chained
    /// sources keep their spacing. Zero whenever nothing is playing.
    drift: u64,
    /// Device frames rendered so far; the playback clock.
    clock: Arc<AtomicU64>,
}

impl Mixer {
    pub fn new(
        commands: Receiver<MixerCommand>,
        ended: Sender<SourceId>,
        clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            commands,
            ended,
            voices: Vec::with_capacity(VOICE_CAPACITY),
            drift: 0,
            clock,
        }
    }

    /// Render one block of mono device frames into `out`, advancing the clock.
    pub fn render(&mut self, out: &mut [f32]) {
        let base = self.clock.load(Ordering::Acquire);
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                MixerCommand::Start(mut voice) => {
                    if self.voices.is_empty() {
                        self.drift = 0;
                    }
                    voice.start_frame += self.drift;
                    // Arrived after its slot was rendered: play from the first
                    // sample now and push everything chained behind it back
                    // by the same amount.
                    if voice.start_frame < base {
                        self.drift += base - voice.start_frame;
                        voice.start_frame = base;
                    }
                    self.voices.push(voice);
                }
                MixerCommand::Stop(id) => {
                    if let Some(pos) = self.voices.iter().position(|v| v.id == id) {
                        self.voices.swap_remove(pos);
                        self.notify_ended(id);
                    }
                }
            }
        }

        for (i, o) in out.iter_mut().enumerate() {
            let frame = base + i as u64;
            let sum: f32 = self.voices.iter().map(|v| v.sample_at(frame)).sum();
            *o = sum.clamp(-1.0, 1.0);
        }

        let end = base + out.len() as u64;
        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].finished_by(end) {
                let done = self.voices.swap_remove(i);
                self.notify_ended(done.id);
            } else {
                i += 1;
            }
        }

        self.clock.store(end, Ordering::Release);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn notify_ended(&self, id: SourceId) {
        if let Err(TrySendError::Full(_)) = self.ended.try_send(id) {
            warn!(source = id, "ended queue full, dropping notification");
        }
    }
}
