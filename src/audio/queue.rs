//! FIFO of interleaved PCM samples shared with the device callback

use std::collections::VecDeque;

/// Bounded sample FIFO. When full, the oldest samples are dropped.
pub struct PcmQueue {
    samples: VecDeque<i16>,
    capacity: usize,
    /// Samples discarded because the queue was full
    dropped: u64,
}

impl PcmQueue {
    /// Create a queue holding at most `capacity` samples (all channels counted)
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append native-endian s16 samples. A trailing odd byte is ignored.
    /// Returns the number of samples appended.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let mut pushed = 0;
        for pair in bytes.chunks_exact(2) {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
                self.dropped += 1;
            }
            self.samples.push_back(i16::from_ne_bytes([pair[0], pair[1]]));
            pushed += 1;
        }
        pushed
    }

    /// Fill `out` from the front of the queue, converting each sample.
    /// Slots left over after the queue runs dry are set to `silence`.
    /// Returns the number of queued samples consumed.
    pub fn pop_into<T: Copy>(&mut self, out: &mut [T], convert: impl Fn(i16) -> T, silence: T) -> usize {
        let take = out.len().min(self.samples.len());
        for (slot, sample) in out.iter_mut().zip(self.samples.drain(..take)) {
            *slot = convert(sample);
        }
        out[take..].fill(silence);
        take
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Map an s16 sample to the [-1.0, 1.0) float range
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
