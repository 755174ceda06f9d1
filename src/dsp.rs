//! Derived views over buffered samples
//!
//! Everything here is a pure transform: the same input always produces the same
//! output, and nothing keeps state between calls except the cached FFT plan inside
//! [`SpectrumAnalyzer`].

use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

/// Two inputs that had to be the same length were not
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("length mismatch: {left} vs {right}")]
pub struct LengthMismatch {
    pub left: usize,
    pub right: usize,
}

/// Element-wise `a - b`
pub fn difference(a: &[f32], b: &[f32]) -> Result<Vec<f32>, LengthMismatch> {
    if a.len() != b.len() {
        return Err(LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x - y).collect())
}

/// `n` evenly spaced instants over `[0, window_seconds)`
pub fn time_axis(window_seconds: f32, n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    let step = window_seconds as f64 / n as f64;
    (0..n).map(|i| (i as f64 * step) as f32).collect()
}

/// Frequencies of the first `n / 2` bins of an `n`-point transform
pub fn frequency_axis(n: usize, sampling_rate_hz: f64) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    let resolution = sampling_rate_hz / n as f64;
    (0..n / 2).map(|k| (k as f64 * resolution) as f32).collect()
}

/// Root mean square; zero for an empty slice
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&x| x as f64 * x as f64).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Magnitude spectrum with its frequency axis
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub frequencies: Vec<f32>,
    pub magnitudes: Vec<f32>,
}

/// One-shot magnitude spectrum of `samples`
///
/// Plans a fresh transform each call; use [`SpectrumAnalyzer`] when the length is
/// fixed and the transform runs repeatedly.
pub fn spectrum(samples: &[f32], sampling_rate_hz: f64) -> Spectrum {
    let mut analyzer = SpectrumAnalyzer::new(samples.len());
    let magnitudes = analyzer.magnitudes(samples).unwrap_or_default();
    Spectrum {
        frequencies: frequency_axis(samples.len(), sampling_rate_hz),
        magnitudes,
    }
}

/// Forward FFT magnitude for a fixed transform length
///
/// Output bin `k` is `2/N * |X[k]|` for `k < N/2`.
pub struct SpectrumAnalyzer {
    len: usize,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            len,
            fft,
            buffer: Vec::with_capacity(len),
            scratch,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bins produced per call
    pub fn bins(&self) -> usize {
        self.len / 2
    }

    pub fn magnitudes(&mut self, samples: &[f32]) -> Result<Vec<f32>, LengthMismatch> {
        if samples.len() != self.len {
            return Err(LengthMismatch {
                left: samples.len(),
                right: self.len,
            });
        }
        if self.len == 0 {
            return Ok(Vec::new());
        }

        self.buffer.clear();
        self.buffer
            .extend(samples.iter().map(|&re| Complex { re, im: 0.0 }));
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 2.0 / self.len as f32;
        Ok(self.buffer[..self.bins()]
            .iter()
            .map(|c| c.norm() * scale)
            .collect())
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("len", &self.len)
            .finish()
    }
}
