//! Wire framing for the packet stream
//!
//! A packet is a `channels × samples_per_packet` grid of `f32` samples sent as raw
//! bytes: no header, no delimiter, native byte order, channel-major. With the default
//! layout (32 channels, 18 samples) every packet is exactly 2304 bytes, so the reader
//! only needs to know the layout to find packet boundaries.
//!
//! ```text
//! | ch1 s0 .. ch1 s17 | ch2 s0 .. ch2 s17 | ... | ch32 s0 .. ch32 s17 |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Channels carried by every packet on the wire
pub const DEFAULT_CHANNELS: usize = 32;

/// Time steps per channel in one packet
pub const DEFAULT_SAMPLES_PER_PACKET: usize = 18;

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Shape of one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub channels: usize,
    pub samples_per_packet: usize,
}

impl FrameLayout {
    pub const fn new(channels: usize, samples_per_packet: usize) -> Self {
        Self {
            channels,
            samples_per_packet,
        }
    }

    /// Number of samples in one packet across all channels
    pub fn samples_per_frame(&self) -> usize {
        self.channels * self.samples_per_packet
    }

    /// Exact byte length of one packet on the wire
    pub fn frame_len(&self) -> usize {
        self.samples_per_frame() * SAMPLE_BYTES
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNELS, DEFAULT_SAMPLES_PER_PACKET)
    }
}

/// One time slice across all channels
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    samples: Array2<f32>,
}

impl Packet {
    /// Wrap a `channels × samples_per_packet` grid
    pub fn new(samples: Array2<f32>) -> Self {
        Self { samples }
    }

    pub fn layout(&self) -> FrameLayout {
        let (channels, samples_per_packet) = self.samples.dim();
        FrameLayout::new(channels, samples_per_packet)
    }

    /// Samples of one channel by zero-based index
    pub fn channel(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.samples.nrows()).then(|| self.samples.row(index))
    }

    pub fn samples(&self) -> &Array2<f32> {
        &self.samples
    }

    /// Serialize to the wire representation
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.layout().frame_len());
        // Logical iteration order of an Array2 is row-major, which is channel-major here
        for &sample in self.samples.iter() {
            buf.put_f32_ne(sample);
        }
        buf.freeze()
    }
}

/// Reasons a byte blob could not be turned into a packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("short frame: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("oversized frame: expected {expected} bytes, got {actual}")]
    Oversized { expected: usize, actual: usize },
}

/// Turns fixed-size wire frames back into packets
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelFrameDecoder {
    layout: FrameLayout,
}

impl ChannelFrameDecoder {
    pub fn new(layout: FrameLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Decode exactly one frame
    pub fn decode(&self, frame: &[u8]) -> Result<Packet, DecodeError> {
        let expected = self.layout.frame_len();
        if frame.len() < expected {
            return Err(DecodeError::ShortFrame {
                expected,
                actual: frame.len(),
            });
        }
        if frame.len() > expected {
            return Err(DecodeError::Oversized {
                expected,
                actual: frame.len(),
            });
        }

        let mut cursor = frame;
        let values: Vec<f32> = (0..self.layout.samples_per_frame())
            .map(|_| cursor.get_f32_ne())
            .collect();

        let shape = (self.layout.channels, self.layout.samples_per_packet);
        // Length was checked above so the shape always matches
        let samples = Array2::from_shape_vec(shape, values).map_err(|_| DecodeError::ShortFrame {
            expected,
            actual: frame.len(),
        })?;
        Ok(Packet::new(samples))
    }
}
