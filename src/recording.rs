//! Recording store
//!
//! A recording is loaded once at startup and shared read-only by every client loop.
//! On disk it is a serde document holding a `[channels, samples_per_window, windows]`
//! array and the device's sampling frequency, stored as JSON (`.json`) or bincode
//! (anything else).
//!
//! In memory the windows are flattened so each channel is one contiguous time series:
//! window 0's samples, then window 1's, and so on.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use ndarray::{s, Array2, Array3, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::frame::FrameLayout;

/// Metadata describing the acquisition device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInformation {
    #[serde(default)]
    pub sampling_frequency: Option<f64>,
}

/// On-disk recording document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFile {
    /// `[channels, samples_per_window, windows]`
    pub biosignal: Array3<f32>,
    #[serde(default)]
    pub device_information: DeviceInformation,
}

impl RecordingFile {
    /// Read a recording document without validating it
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RelayError::RecordingNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let corrupt = |message: String| RelayError::RecordingCorrupt {
            path: path.to_path_buf(),
            message,
        };

        if is_json(path) {
            serde_json::from_reader(reader).map_err(|e| corrupt(e.to_string()))
        } else {
            bincode::deserialize_from(reader).map_err(|e| corrupt(e.to_string()))
        }
    }

    /// Write a recording document, picking the encoding from the extension
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        let failed = |message: String| RelayError::RecordingCorrupt {
            path: path.to_path_buf(),
            message,
        };

        if is_json(path) {
            serde_json::to_writer(writer, self).map_err(|e| failed(e.to_string()))
        } else {
            bincode::serialize_into(writer, self).map_err(|e| failed(e.to_string()))
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Immutable multi-channel recording, `channels × samples`
#[derive(Debug, Clone)]
pub struct Recording {
    samples: Array2<f32>,
    sampling_rate_hz: f64,
}

impl Recording {
    /// Build a recording from a `channels × samples` array
    ///
    /// The sample count must be a positive multiple of `samples_per_packet` so every
    /// packet the stream produces is full.
    pub fn from_samples(
        samples: Array2<f32>,
        sampling_rate_hz: f64,
        samples_per_packet: usize,
    ) -> Result<Self> {
        validate_rate(sampling_rate_hz)?;

        let (channels, sample_count) = samples.dim();
        if channels == 0 {
            return Err(RelayError::RecordingShape {
                message: "recording has no channels".to_string(),
            });
        }
        if samples_per_packet == 0 || sample_count == 0 || sample_count % samples_per_packet != 0 {
            return Err(RelayError::RecordingShape {
                message: format!(
                    "{} samples per channel is not a positive multiple of {} samples per packet",
                    sample_count, samples_per_packet
                ),
            });
        }

        packet_period(samples_per_packet, sampling_rate_hz)?;

        Ok(Self {
            samples,
            sampling_rate_hz,
        })
    }

    /// Flatten and validate an on-disk document against the wire layout
    pub fn from_file(file: RecordingFile, layout: FrameLayout) -> Result<Self> {
        let rate = file
            .device_information
            .sampling_frequency
            .ok_or(RelayError::MissingSamplingRate)?;

        let (channels, per_window, windows) = file.biosignal.dim();
        if channels < layout.channels {
            return Err(RelayError::RecordingShape {
                message: format!(
                    "recording has {} channels, the stream needs {}",
                    channels, layout.channels
                ),
            });
        }

        // [channel, in-window, window] -> [channel, window, in-window] -> [channel, time]
        let mut kept = file.biosignal.slice_move(s![..layout.channels, .., ..]);
        kept.swap_axes(1, 2);
        let flat: Vec<f32> = kept.iter().copied().collect();
        let samples = Array2::from_shape_vec((layout.channels, per_window * windows), flat)
            .map_err(|e| RelayError::RecordingShape {
                message: e.to_string(),
            })?;

        Self::from_samples(samples, rate, layout.samples_per_packet)
    }

    /// Load and validate a recording; any failure is fatal for the server
    pub fn load(path: &Path, layout: FrameLayout) -> Result<Self> {
        let file = RecordingFile::read(path)?;
        let recording = Self::from_file(file, layout)?;
        tracing::info!(
            "Loaded recording {}: {} channels x {} samples at {} Hz",
            path.display(),
            recording.channel_count(),
            recording.sample_count(),
            recording.sampling_rate_hz()
        );
        Ok(recording)
    }

    /// Convert back into the windowed on-disk form
    pub fn to_file(&self, samples_per_window: usize) -> Result<RecordingFile> {
        let (channels, sample_count) = self.samples.dim();
        if samples_per_window == 0 || sample_count % samples_per_window != 0 {
            return Err(RelayError::RecordingShape {
                message: format!(
                    "{} samples cannot be split into windows of {}",
                    sample_count, samples_per_window
                ),
            });
        }
        let windows = sample_count / samples_per_window;

        let flat: Vec<f32> = self.samples.iter().copied().collect();
        let mut biosignal = Array3::from_shape_vec((channels, windows, samples_per_window), flat)
            .map_err(|e| RelayError::RecordingShape {
                message: e.to_string(),
            })?;
        biosignal.swap_axes(1, 2);

        Ok(RecordingFile {
            biosignal: biosignal.as_standard_layout().into_owned(),
            device_information: DeviceInformation {
                sampling_frequency: Some(self.sampling_rate_hz),
            },
        })
    }

    pub fn channel_count(&self) -> usize {
        self.samples.nrows()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.ncols()
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        self.sampling_rate_hz
    }

    /// Wall time one packet of `samples_per_packet` covers
    ///
    /// Fails when that time rounds to zero or is too long to represent.
    pub fn packet_period(&self, samples_per_packet: usize) -> Result<Duration> {
        packet_period(samples_per_packet, self.sampling_rate_hz)
    }

    /// Playback length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / self.sampling_rate_hz
    }

    pub fn channel(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.channel_count()).then(|| self.samples.index_axis(Axis(0), index))
    }

    pub fn samples(&self) -> &Array2<f32> {
        &self.samples
    }
}

fn packet_period(samples_per_packet: usize, rate: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(samples_per_packet as f64 / rate) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(RelayError::InvalidSamplingRate { rate }),
    }
}

fn validate_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(RelayError::InvalidSamplingRate { rate })
    }
}
