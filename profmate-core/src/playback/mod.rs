//! Gapless playback scheduling on the output clock.
//!
//! Inbound chunks are decoded into [`PlaybackBuffer`]s and chained on the
//! playback context's clock with a running cursor:
//!
//! ```text
//! start  = max(output.current_time(), cursor)
//! cursor = start + duration
//! ```
//!
//! so buffers play back-to-back in receipt order without overlapping. When
//! decoding falls behind the live clock the next buffer starts "now",
//! which may leave a gap but never reorders or overlaps.
//!
//! The active-sources set is shared with the device's ended handler, which
//! fires from a device thread, so it sits behind a `parking_lot::Mutex`.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    audio::{DeviceClosing, EndedHandler, OutputDevice, SourceId},
    buffering::frame::PlaybackBuffer,
    error::Result,
};

/// Sources scheduled on the output device that have not yet ended.
#[derive(Debug, Clone, Default)]
pub struct ActiveSources(Arc<Mutex<HashSet<SourceId>>>);

impl ActiveSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.0.lock().contains(&id)
    }

    fn insert(&self, id: SourceId) {
        self.0.lock().insert(id);
    }

    fn remove(&self, id: SourceId) -> bool {
        self.0.lock().remove(&id)
    }

    fn drain(&self) -> Vec<SourceId> {
        self.0.lock().drain().collect()
    }

    /// Handler for the output device: removes a source when it ends.
    pub fn ended_handler(&self) -> EndedHandler {
        let sources = self.clone();
        Arc::new(move |id| {
            if sources.remove(id) {
                debug!(source = id, "playback source ended");
            }
        })
    }
}

/// Where and when one buffer was placed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start: f64,
    pub duration: f64,
}

impl ScheduledSource {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Owns the playback context, the cursor, and the active-sources set.
pub struct PlaybackScheduler {
    output: Box<dyn OutputDevice>,
    active: ActiveSources,
    /// Next free start time on the output clock.
    cursor: f64,
    next_id: SourceId,
}

impl PlaybackScheduler {
    /// `active` must be the set whose [`ActiveSources::ended_handler`] was
    /// given to the device when `output` was opened.
    pub fn new(output: Box<dyn OutputDevice>, active: ActiveSources) -> Self {
        Self {
            output,
            active,
            cursor: 0.0,
            next_id: 0,
        }
    }

    /// Place `buffer` right after the previous one, or now if the clock has
    /// already passed the cursor.
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<ScheduledSource> {
        let start = self.output.current_time().max(self.cursor);
        let duration = buffer.duration_secs();
        let id = self.next_id;
        self.next_id += 1;

        // Insert first: a very short buffer may end before start_source returns.
        self.active.insert(id);
        if let Err(e) = self.output.start_source(id, buffer, start) {
            self.active.remove(id);
            return Err(e);
        }
        self.cursor = start + duration;

        debug!(source = id, start, duration, cursor = self.cursor, "scheduled playback");
        Ok(ScheduledSource {
            id,
            start,
            duration,
        })
    }

    /// Stop every active source immediately and clear the set.
    /// Returns how many sources were stopped.
    pub fn stop_all(&mut self) -> usize {
        let ids = self.active.drain();
        for &id in &ids {
            self.output.stop_source(id);
        }
        if !ids.is_empty() {
            debug!(stopped = ids.len(), "stopped active playback sources");
        }
        ids.len()
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    pub fn active(&self) -> &ActiveSources {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Stop all sources and release the playback context.
    pub fn close(&mut self) -> DeviceClosing {
        let stopped = self.stop_all();
        if stopped > 0 {
            warn!(stopped, "playback interrupted by close");
        }
        self.output.close()
    }
}
