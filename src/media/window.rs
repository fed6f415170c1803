use std::sync::Mutex;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::kernel::sync::lock;

/// The most recent mono samples of a microphone stream.
///
/// The capture callback overwrites the oldest samples when full, so readers
/// always see the latest `capacity` samples. Several readers may look at the
/// same window without consuming it.
pub struct SampleWindow {
    ring: Mutex<HeapRb<f32>>,
    capacity: usize,
    sample_rate: u32,
}

impl SampleWindow {
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        Self {
            ring: Mutex::new(HeapRb::new(capacity.max(1))),
            capacity: capacity.max(1),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.ring).occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, samples: &[f32]) {
        let mut ring = lock(&self.ring);
        for &sample in samples {
            ring.push_overwrite(sample);
        }
    }

    /// Fills `out` with the newest samples, oldest first. If fewer samples
    /// are buffered, the front of `out` is zero-filled. Returns how many real
    /// samples were copied.
    pub fn latest(&self, out: &mut [f32]) -> usize {
        let ring = lock(&self.ring);
        let available = ring.occupied_len();
        let n = available.min(out.len());
        let pad = out.len() - n;

        out[..pad].fill(0.0);
        for (dst, src) in out[pad..].iter_mut().zip(ring.iter().skip(available - n)) {
            *dst = *src;
        }
        n
    }

    pub fn clear(&self) {
        lock(&self.ring).clear();
    }
}
