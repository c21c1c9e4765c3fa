//! Sample buffers shared between device threads and the session.
//!
//! The capture side uses a lock-free SPSC `ringbuf::HeapRb<f32>`: the cpal
//! callback is the producer, the capture pump thread is the consumer.

pub mod frame;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the realtime input callback.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the capture pump thread.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// 2^18 = 262 144 samples ≈ 5.4 s at 48 kHz.
/// The pump drains every few milliseconds; this only absorbs scheduler stalls.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair for the capture path.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(CAPTURE_RING_CAPACITY).split()
}
