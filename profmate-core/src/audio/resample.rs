//! Capture-rate to endpoint-rate conversion.
//!
//! Microphones rarely run at 16 kHz natively (48 kHz is typical). The capture
//! pump thread feeds raw device-rate mono samples through a rubato
//! `FastFixedIn` resampler before slicing outbound frames. Allocation is fine
//! here; this never runs on the realtime callback.
//!
//! When the device already runs at the target rate the converter is a
//! passthrough and no rubato state exists.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{Result, TutorError};

/// Converts mono f32 audio between two fixed rates.
pub struct RateConverter {
    resampler: Option<FastFixedIn<f32>>,
    /// Device-rate samples waiting for a full rubato block.
    pending: Vec<f32>,
    block_len: usize,
    scratch_out: Vec<Vec<f32>>,
}

impl RateConverter {
    /// `block_len` is the number of input samples handed to rubato per call.
    ///
    /// # Errors
    /// `TutorError::AudioStream` if rubato rejects the ratio.
    pub fn new(from_rate: u32, to_rate: u32, block_len: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                block_len,
                scratch_out: Vec::new(),
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            block_len,
            1,
        )
        .map_err(|e| TutorError::AudioStream(format!("resampler init: {e}")))?;

        let scratch_out = vec![vec![0f32; resampler.output_frames_max()]; 1];
        info!(from_rate, to_rate, block_len, "capture resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(block_len * 2),
            block_len,
            scratch_out,
        })
    }

    /// Feed samples, returning whatever converted output is ready.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.block_len {
            let block = &self.pending[consumed..consumed + self.block_len];
            match resampler.process_into_buffer(&[block], &mut self.scratch_out, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.scratch_out[0][..produced]),
                Err(e) => error!("capture resampler error: {e}"),
            }
            consumed += self.block_len;
        }
        self.pending.drain(..consumed);
        out
    }

    /// Drop buffered input and filter state.
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(ref mut resampler) = self.resampler {
            resampler.reset();
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
