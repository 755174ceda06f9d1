//! Error types and exit codes for emg-relay

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for emg-relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Recording not found: {path}")]
    RecordingNotFound { path: PathBuf },

    #[error("Failed to read recording {path}: {message}")]
    RecordingCorrupt { path: PathBuf, message: String },

    #[error("Recording has the wrong shape: {message}")]
    RecordingShape { message: String },

    #[error("Recording has no sampling frequency in its device information")]
    MissingSamplingRate,

    #[error("Invalid sampling rate: {rate} Hz")]
    InvalidSamplingRate { rate: f64 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error("Failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("Viewer task is no longer running")]
    ViewerClosed,

    #[error(transparent)]
    Selection(#[from] crate::viewer::SelectionError),

    #[error(transparent)]
    Filter(#[from] crate::filters::FilterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Convert error to a process exit code:
    /// - 1: IO error
    /// - 2: Recording missing, corrupt, misshapen or without a sampling rate
    /// - 3: Configuration error
    /// - 4: Network bind/connect failure
    /// - 5: Viewer closed / invalid selection or filter
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::RecordingNotFound { .. }
            | Self::RecordingCorrupt { .. }
            | Self::RecordingShape { .. }
            | Self::MissingSamplingRate
            | Self::InvalidSamplingRate { .. } => ExitCode::from(2),
            Self::ConfigError { .. } => ExitCode::from(3),
            Self::Bind { .. } | Self::Connect { .. } => ExitCode::from(4),
            Self::ViewerClosed | Self::Selection(_) | Self::Filter(_) => ExitCode::from(5),
        }
    }

    /// True for errors that must stop the server before it accepts anyone
    pub fn is_recording_error(&self) -> bool {
        matches!(
            self,
            Self::RecordingNotFound { .. }
                | Self::RecordingCorrupt { .. }
                | Self::RecordingShape { .. }
                | Self::MissingSamplingRate
                | Self::InvalidSamplingRate { .. }
        )
    }
}

/// Result type alias for emg-relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
