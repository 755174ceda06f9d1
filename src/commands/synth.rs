//! Synth command handler - Generate a synthetic recording
//!
//! Each channel carries its own sine tone plus a little deterministic noise, so a
//! viewer can tell channels apart and the frequency view has a clear peak.

use std::f64::consts::TAU;

use ndarray::Array2;
use serde::Serialize;

use crate::cli::{OutputFormat, SynthArgs};
use crate::commands::{to_json, CommandContext};
use crate::error::{RelayError, Result};
use crate::recording::Recording;

/// Tone frequency of channel 1; each further channel is `TONE_STEP_HZ` higher
const BASE_TONE_HZ: f64 = 20.0;
const TONE_STEP_HZ: f64 = 7.0;
const TONE_AMPLITUDE: f64 = 1.0;
const NOISE_AMPLITUDE: f64 = 0.05;

#[derive(Debug, Serialize)]
struct SynthReport {
    path: String,
    channels: usize,
    samples_per_channel: usize,
    sampling_rate_hz: f64,
    tones_hz: Vec<f64>,
}

/// Run the synth command
pub fn run_synth(args: &SynthArgs, ctx: &CommandContext) -> Result<String> {
    let samples_per_packet = ctx.config.stream.samples_per_packet;
    let recording = synthesize(args.channels, args.seconds, args.rate, samples_per_packet, args.seed)?;
    recording.to_file(samples_per_packet)?.write(&args.out)?;
    tracing::info!("Wrote synthetic recording to {}", args.out.display());

    let report = SynthReport {
        path: args.out.display().to_string(),
        channels: recording.channel_count(),
        samples_per_channel: recording.sample_count(),
        sampling_rate_hz: recording.sampling_rate_hz(),
        tones_hz: (0..args.channels).map(tone_hz).collect(),
    };
    Ok(match ctx.format {
        OutputFormat::Json => format!("{}\n", to_json(&report)),
        OutputFormat::Text => format!(
            "Wrote {}: {} channels x {} samples at {} Hz\n",
            report.path, report.channels, report.samples_per_channel, report.sampling_rate_hz
        ),
    })
}

fn tone_hz(channel: usize) -> f64 {
    BASE_TONE_HZ + TONE_STEP_HZ * channel as f64
}

/// Build the recording; the length is rounded down to whole packets
pub fn synthesize(
    channels: usize,
    seconds: f64,
    rate: f64,
    samples_per_packet: usize,
    seed: u64,
) -> Result<Recording> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(RelayError::RecordingShape {
            message: format!("invalid length: {} s", seconds),
        });
    }
    if !(rate.is_finite() && rate > 0.0) {
        return Err(RelayError::InvalidSamplingRate { rate });
    }
    let requested = (seconds * rate) as usize;
    let samples = requested - requested % samples_per_packet.max(1);

    let mut noise = NoiseSource::new(seed);
    let data = Array2::from_shape_fn((channels, samples), |(c, t)| {
        let phase = TAU * tone_hz(c) * t as f64 / rate;
        (TONE_AMPLITUDE * phase.sin() + NOISE_AMPLITUDE * noise.next()) as f32
    });
    Recording::from_samples(data, rate, samples_per_packet)
}

/// splitmix64, mapped to [-1, 1)
struct NoiseSource {
    state: u64,
}

impl NoiseSource {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp;
    use crate::frame::FrameLayout;
    use tempfile::TempDir;

    #[test]
    fn test_length_rounds_down_to_packets() {
        let recording = synthesize(2, 1.0, 100.0, 18, 0).unwrap();
        assert_eq!(recording.sample_count(), 90);
        assert_eq!(recording.channel_count(), 2);
    }

    #[test]
    fn test_same_seed_same_signal() {
        let a = synthesize(1, 0.5, 360.0, 18, 42).unwrap();
        let b = synthesize(1, 0.5, 360.0, 18, 42).unwrap();
        let c = synthesize(1, 0.5, 360.0, 18, 43).unwrap();
        assert_eq!(a.samples(), b.samples());
        assert_ne!(a.samples(), c.samples());
    }

    #[test]
    fn test_tone_dominates_spectrum() {
        // 1 s at 256 Hz: bin k is k Hz, channel 2 tone is 27 Hz
        let recording = synthesize(2, 1.0, 256.0, 16, 1).unwrap();
        let samples = recording.channel(1).unwrap().to_vec();
        let spectrum = dsp::spectrum(&samples, 256.0);
        let peak = spectrum
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(spectrum.frequencies[peak], 27.0);
    }

    #[test]
    fn test_rejects_bad_rate() {
        assert!(matches!(
            synthesize(1, 1.0, 0.0, 18, 0),
            Err(RelayError::InvalidSamplingRate { .. })
        ));
    }

    #[test]
    fn test_run_synth_writes_loadable_file() {
        let dir = TempDir::new().unwrap();
        let args = SynthArgs {
            out: dir.path().join("synth.bin"),
            channels: 32,
            seconds: 0.5,
            rate: 2048.0,
            seed: 0,
        };
        let text = run_synth(&args, &CommandContext::default()).unwrap();
        assert!(text.starts_with("Wrote"));

        let loaded = Recording::load(&args.out, FrameLayout::default()).unwrap();
        assert_eq!(loaded.channel_count(), 32);
        assert_eq!(loaded.sample_count(), 1008);
        assert_eq!(loaded.sampling_rate_hz(), 2048.0);
    }
}
