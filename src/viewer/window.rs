//! Fixed-capacity sliding window over one signal

use std::collections::VecDeque;

/// Keeps the most recent `capacity` samples of one signal
///
/// Snapshots are always exactly `capacity` long: until the window has filled, the
/// missing history reads as zeros on the left.
#[derive(Debug, Clone)]
pub struct SlidingWindowBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SlidingWindowBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of real samples held (never more than capacity)
    pub fn filled(&self) -> usize {
        self.samples.len()
    }

    /// Push a chunk, evicting the oldest samples on overflow
    pub fn append<I>(&mut self, chunk: I)
    where
        I: IntoIterator<Item = f32>,
    {
        if self.capacity == 0 {
            return;
        }
        for sample in chunk {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Exactly `capacity` values, oldest first, zero-padded on the left
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.capacity);
        out.resize(self.capacity - self.samples.len(), 0.0);
        out.extend(self.samples.iter().copied());
        out
    }

    /// Back to all zeros; capacity is unchanged
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
