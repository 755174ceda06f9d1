//! Display filters for time-domain series
//!
//! Buffers always keep raw samples. A filter only shapes the copy that leaves a tick,
//! so switching between filters never loses history.
//!
//! ## Filters
//!
//! - **Raw**: samples pass through untouched
//! - **Bandpass**: Butterworth band-pass (20–450 Hz, 4th order per edge by default),
//!   a low-pass cascade at the upper edge followed by a high-pass cascade at the lower
//!   edge, run forward and then backward so the output has zero phase
//! - **Rms**: trailing-window RMS envelope; the window shrinks over the first samples

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest Butterworth order accepted per band edge
pub const MAX_ORDER: usize = 10;

/// Which display filter shapes emitted time-domain series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFilter {
    #[default]
    Raw,
    Bandpass,
    Rms,
}

impl SignalFilter {
    pub const ALL: [SignalFilter; 3] = [SignalFilter::Raw, SignalFilter::Bandpass, SignalFilter::Rms];

    pub fn name(&self) -> &'static str {
        match self {
            SignalFilter::Raw => "raw",
            SignalFilter::Bandpass => "bandpass",
            SignalFilter::Rms => "rms",
        }
    }
}

impl fmt::Display for SignalFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignalFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "none" => Ok(SignalFilter::Raw),
            "bandpass" | "band" | "filtered" => Ok(SignalFilter::Bandpass),
            "rms" => Ok(SignalFilter::Rms),
            other => Err(FilterError::Unknown(other.to_string())),
        }
    }
}

/// A filter that cannot be built with the given parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("unknown signal filter: {0}")]
    Unknown(String),

    #[error("pass band {low_hz}-{high_hz} Hz does not fit between 0 and {nyquist_hz} Hz")]
    BandOutOfRange {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
    },

    #[error("filter order must be within 1..={MAX_ORDER}, got {0}")]
    Order(usize),
}

/// Parameters of the non-raw filters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub low_hz: f64,
    pub high_hz: f64,
    /// Butterworth order of each band edge
    pub order: usize,
    pub rms_window: Duration,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            low_hz: 20.0,
            high_hz: 450.0,
            order: 4,
            rms_window: Duration::from_millis(100),
        }
    }
}

/// One second-order section, `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Lowpass,
    Highpass,
}

impl Biquad {
    /// Bilinear-transformed second-order section with quality factor `q`
    fn second_order(edge: Edge, cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        let b = match edge {
            Edge::Lowpass => [(1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0],
            Edge::Highpass => [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0],
        };
        Self {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [-2.0 * cos / a0, (1.0 - alpha) / a0],
        }
    }

    /// Real-pole section used by odd orders
    fn first_order(edge: Edge, cutoff_hz: f64, sample_rate: f64) -> Self {
        let w = (PI * cutoff_hz / sample_rate).tan();
        let norm = 1.0 + w;
        let b = match edge {
            Edge::Lowpass => [w / norm, w / norm, 0.0],
            Edge::Highpass => [1.0 / norm, -1.0 / norm, 0.0],
        };
        Self {
            b,
            a: [(w - 1.0) / norm, 0.0],
        }
    }

    /// Direct Form II transposed over `samples`, starting from rest
    fn run(&self, samples: &mut [f64]) {
        let mut state = [0.0f64; 2];
        for x in samples.iter_mut() {
            let input = *x;
            let output = self.b[0] * input + state[0];
            state[0] = self.b[1] * input - self.a[0] * output + state[1];
            state[1] = self.b[2] * input - self.a[1] * output;
            *x = output;
        }
    }
}

/// Butterworth sections for one band edge
fn butterworth(order: usize, edge: Edge, cutoff_hz: f64, sample_rate: f64) -> Vec<Biquad> {
    let mut sections: Vec<Biquad> = (0..order / 2)
        .map(|k| {
            // Angle of the k-th conjugate pole pair from the negative real axis
            let psi = PI * (order - 1 - 2 * k) as f64 / (2 * order) as f64;
            Biquad::second_order(edge, cutoff_hz, 1.0 / (2.0 * psi.cos()), sample_rate)
        })
        .collect();
    if order % 2 == 1 {
        sections.push(Biquad::first_order(edge, cutoff_hz, sample_rate));
    }
    sections
}

/// Butterworth band-pass as a cascade of biquad sections
#[derive(Debug, Clone, PartialEq)]
pub struct Bandpass {
    sections: Vec<Biquad>,
}

impl Bandpass {
    /// Design a band-pass passing `low_hz..high_hz` with `order` poles per edge
    pub fn butterworth(
        order: usize,
        low_hz: f64,
        high_hz: f64,
        sample_rate: f64,
    ) -> Result<Self, FilterError> {
        if order == 0 || order > MAX_ORDER {
            return Err(FilterError::Order(order));
        }
        let nyquist_hz = sample_rate / 2.0;
        let in_range = low_hz.is_finite()
            && high_hz.is_finite()
            && low_hz > 0.0
            && low_hz < high_hz
            && high_hz < nyquist_hz;
        if !in_range {
            return Err(FilterError::BandOutOfRange {
                low_hz,
                high_hz,
                nyquist_hz,
            });
        }

        let mut sections = butterworth(order, Edge::Lowpass, high_hz, sample_rate);
        sections.extend(butterworth(order, Edge::Highpass, low_hz, sample_rate));
        Ok(Self { sections })
    }

    /// Single forward pass through the cascade
    pub fn forward(&self, samples: &[f32]) -> Vec<f32> {
        let mut work: Vec<f64> = samples.iter().map(|&x| x as f64).collect();
        self.cascade(&mut work);
        work.into_iter().map(|x| x as f32).collect()
    }

    /// Zero-phase filtering: the cascade runs forward, then over the reversed output
    pub fn filtfilt(&self, samples: &[f32]) -> Vec<f32> {
        let mut work: Vec<f64> = samples.iter().map(|&x| x as f64).collect();
        self.cascade(&mut work);
        work.reverse();
        self.cascade(&mut work);
        work.reverse();
        work.into_iter().map(|x| x as f32).collect()
    }

    fn cascade(&self, work: &mut [f64]) {
        for section in &self.sections {
            section.run(work);
        }
    }
}

/// Trailing-window RMS envelope, same length as `samples`
///
/// Output `i` is the RMS of `samples[i + 1 - window ..= i]`, using fewer samples
/// while `i + 1 < window`. A zero window is treated as one sample.
pub fn rolling_rms(samples: &[f32], window: usize) -> Vec<f32> {
    let window = window.max(1);
    let mut sum_sq = 0.0f64;
    let mut out = Vec::with_capacity(samples.len());
    for (i, &x) in samples.iter().enumerate() {
        sum_sq += x as f64 * x as f64;
        if i >= window {
            let old = samples[i - window] as f64;
            sum_sq -= old * old;
        }
        let n = (i + 1).min(window) as f64;
        out.push((sum_sq.max(0.0) / n).sqrt() as f32);
    }
    out
}

/// A filter designed for one sampling rate, ready to apply each tick
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesFilter {
    Raw,
    Bandpass(Bandpass),
    Rms { window: usize },
}

impl SeriesFilter {
    pub fn design(
        filter: SignalFilter,
        settings: &FilterSettings,
        sampling_rate_hz: f64,
    ) -> Result<Self, FilterError> {
        Ok(match filter {
            SignalFilter::Raw => SeriesFilter::Raw,
            SignalFilter::Bandpass => SeriesFilter::Bandpass(Bandpass::butterworth(
                settings.order,
                settings.low_hz,
                settings.high_hz,
                sampling_rate_hz,
            )?),
            SignalFilter::Rms => SeriesFilter::Rms {
                window: (settings.rms_window.as_secs_f64() * sampling_rate_hz).round() as usize,
            },
        })
    }

    pub fn kind(&self) -> SignalFilter {
        match self {
            SeriesFilter::Raw => SignalFilter::Raw,
            SeriesFilter::Bandpass(_) => SignalFilter::Bandpass,
            SeriesFilter::Rms { .. } => SignalFilter::Rms,
        }
    }

    pub fn apply(&self, samples: Vec<f32>) -> Vec<f32> {
        match self {
            SeriesFilter::Raw => samples,
            SeriesFilter::Bandpass(bandpass) => bandpass.filtfilt(&samples),
            SeriesFilter::Rms { window } => rolling_rms(&samples, *window),
        }
    }
}
