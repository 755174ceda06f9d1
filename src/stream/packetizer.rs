//! Cuts a recording into fixed-size packets, looping forever

use std::sync::Arc;
use std::time::Duration;

use ndarray::s;

use crate::frame::Packet;
use crate::recording::Recording;

/// Shortest period a client is ever paced at
const MIN_PACING: Duration = Duration::from_nanos(1);

/// Per-client cursor over a shared recording
///
/// Every client gets its own packetizer starting at sample 0. The cursor always sits
/// on a packet boundary and wraps to 0 after the last full packet.
#[derive(Debug, Clone)]
pub struct Packetizer {
    recording: Arc<Recording>,
    samples_per_packet: usize,
    cursor: usize,
    wraps: u64,
}

impl Packetizer {
    /// `samples_per_packet` must divide the recording length, which `Recording`
    /// guarantees for the layout it was loaded with
    pub fn new(recording: Arc<Recording>, samples_per_packet: usize) -> Self {
        Self {
            recording,
            samples_per_packet,
            cursor: 0,
            wraps: 0,
        }
    }

    /// Sample index the next packet starts at
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Index of the packet `next_packet` will return, counted from the start of the recording
    pub fn packet_index(&self) -> usize {
        self.cursor / self.samples_per_packet
    }

    /// Completed passes over the recording
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    /// Wall time one packet covers at the recording's sampling rate
    ///
    /// Never zero, so it is always usable as a timer period.
    pub fn pacing_interval(&self) -> Duration {
        self.recording
            .packet_period(self.samples_per_packet)
            .unwrap_or(MIN_PACING)
    }

    /// Slice the next packet and advance, wrapping at the end
    pub fn next_packet(&mut self) -> Packet {
        let end = self.cursor + self.samples_per_packet;
        let samples = self
            .recording
            .samples()
            .slice(s![.., self.cursor..end])
            .to_owned();

        self.cursor = end;
        if self.cursor + self.samples_per_packet > self.recording.sample_count() {
            self.cursor = 0;
            self.wraps += 1;
            tracing::debug!("Recording wrapped (pass {})", self.wraps);
        }

        Packet::new(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// 2 channels x 36 samples; channel c sample t = c * 100 + t
    fn recording() -> Arc<Recording> {
        let samples = Array2::from_shape_fn((2, 36), |(c, t)| (c * 100 + t) as f32);
        Arc::new(Recording::from_samples(samples, 18.0, 18).unwrap())
    }

    fn expected(range: std::ops::Range<usize>) -> Array2<f32> {
        Array2::from_shape_fn((2, range.len()), |(c, t)| (c * 100 + range.start + t) as f32)
    }

    #[test]
    fn test_packets_advance_and_wrap() {
        let mut packetizer = Packetizer::new(recording(), 18);

        assert_eq!(packetizer.next_packet().samples(), &expected(0..18));
        assert_eq!(packetizer.cursor(), 18);
        assert_eq!(packetizer.next_packet().samples(), &expected(18..36));
        assert_eq!(packetizer.cursor(), 0);
        assert_eq!(packetizer.wraps(), 1);
        assert_eq!(packetizer.next_packet().samples(), &expected(0..18));
    }

    #[test]
    fn test_packetizers_are_independent() {
        let shared = recording();
        let mut a = Packetizer::new(Arc::clone(&shared), 18);
        let mut b = Packetizer::new(shared, 18);

        a.next_packet();
        assert_eq!(a.packet_index(), 1);
        assert_eq!(b.packet_index(), 0);
        assert_eq!(b.next_packet().samples(), &expected(0..18));
    }

    #[test]
    fn test_pacing_interval() {
        let packetizer = Packetizer::new(recording(), 18);
        // 18 samples at 18 Hz
        assert_eq!(packetizer.pacing_interval(), Duration::from_secs(1));

        let samples = Array2::zeros((32, 36));
        let fast = Arc::new(Recording::from_samples(samples, 2048.0, 18).unwrap());
        let interval = Packetizer::new(fast, 18).pacing_interval();
        assert!((interval.as_secs_f64() - 18.0 / 2048.0).abs() < 1e-9);
    }

    #[test]
    fn test_pacing_interval_is_never_zero() {
        let samples = Array2::zeros((2, 40));
        let recording = Arc::new(Recording::from_samples(samples, 2e10, 40).unwrap());
        assert_eq!(Packetizer::new(recording, 4).pacing_interval(), MIN_PACING);
    }
}
