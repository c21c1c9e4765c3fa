use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-client counters, reset on each connect.
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub frames_captured: AtomicUsize,
    pub frames_sent: AtomicUsize,
    pub send_failures: AtomicUsize,
    pub inbound_messages: AtomicUsize,
    pub chunks_scheduled: AtomicUsize,
    pub malformed_chunks: AtomicUsize,
    pub sources_stopped: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.send_failures.store(0, Ordering::Relaxed);
        self.inbound_messages.store(0, Ordering::Relaxed);
        self.chunks_scheduled.store(0, Ordering::Relaxed);
        self.malformed_chunks.store(0, Ordering::Relaxed);
        self.sources_stopped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            inbound_messages: self.inbound_messages.load(Ordering::Relaxed),
            chunks_scheduled: self.chunks_scheduled.load(Ordering::Relaxed),
            malformed_chunks: self.malformed_chunks.load(Ordering::Relaxed),
            sources_stopped: self.sources_stopped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_captured: usize,
    pub frames_sent: usize,
    pub send_failures: usize,
    pub inbound_messages: usize,
    pub chunks_scheduled: usize,
    pub malformed_chunks: usize,
    pub sources_stopped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_every_counter() {
        let d = SessionDiagnostics::default();
        SessionDiagnostics::bump(&d.frames_sent);
        SessionDiagnostics::bump(&d.malformed_chunks);
        d.sources_stopped.fetch_add(4, Ordering::Relaxed);
        assert_eq!(d.snapshot().frames_sent, 1);
        assert_eq!(d.snapshot().sources_stopped, 4);

        d.reset();
        assert_eq!(d.snapshot(), DiagnosticsSnapshot::default());
    }
}
