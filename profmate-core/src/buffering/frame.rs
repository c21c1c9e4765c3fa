//! Typed audio blocks flowing through the session.

use std::sync::Arc;

/// One fixed-size block of captured mono samples at the input rate.
///
/// Produced by the capture pump, encoded and dropped by the uplink task.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl OutboundFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decoded output-rate samples ready to be scheduled on the playback clock.
///
/// Samples sit behind an `Arc` so the realtime mixer can hold them without
/// copying.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Duration in seconds on the output clock.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Slices an arbitrary stream of samples into exact `frame_len` frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_len: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        Self {
            frame_len: frame_len.max(1),
            sample_rate,
            pending: Vec::with_capacity(frame_len.max(1)),
        }
    }

    /// Append samples, returning every frame that became complete.
    /// Any remainder stays buffered for the next call.
    pub fn push(&mut self, samples: &[f32]) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        let mut rest = samples;
        while !rest.is_empty() {
            let need = self.frame_len - self.pending.len();
            let take = need.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.frame_len {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_len));
                frames.push(OutboundFrame::new(full, self.sample_rate));
            }
        }
        frames
    }

    /// Discard any partially assembled frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
