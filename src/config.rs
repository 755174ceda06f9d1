//! emg-relay configuration management.
//!
//! Handles the configuration file at:
//! - Linux: ~/.config/emg-relay/config.toml
//! - macOS: ~/Library/Application Support/emg-relay/config.toml
//! - Windows: %APPDATA%\emg-relay\config.toml
//!
//! A missing file yields defaults; command-line flags override whatever is loaded.

use crate::error::{RelayError, Result};
use crate::filters::{Bandpass, FilterSettings, SignalFilter, MAX_ORDER};
use crate::frame::{FrameLayout, DEFAULT_CHANNELS, DEFAULT_SAMPLES_PER_PACKET};
use crate::viewer::WindowSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log levels accepted by `logging.level`
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// emg-relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RelayConfig {
    /// Packet geometry shared by server and viewer
    #[serde(default)]
    pub stream: StreamConfig,

    /// Broadcast server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Viewer settings
    #[serde(default)]
    pub viewer: ViewerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default = "default_samples_per_packet")]
    pub samples_per_packet: usize,
}

fn default_channels() -> usize {
    DEFAULT_CHANNELS
}

fn default_samples_per_packet() -> usize {
    DEFAULT_SAMPLES_PER_PACKET
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            samples_per_packet: default_samples_per_packet(),
        }
    }
}

impl StreamConfig {
    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.channels, self.samples_per_packet)
    }
}

/// Broadcast server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Recording replayed to every client
    #[serde(default = "default_recording")]
    pub recording: PathBuf,
    /// Dump every outgoing packet to the console
    #[serde(default = "default_true")]
    pub print_data: bool,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    12345
}

fn default_recording() -> PathBuf {
    PathBuf::from("recording.json")
}

fn default_true() -> bool {
    true
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            recording: default_recording(),
            print_data: true,
            send_timeout_ms: default_send_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Viewer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds of history shown per buffer
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u32,
    /// Display refresh period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Longest a tick waits for one packet
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// Recording rate used to label the frequency axis
    #[serde(default = "default_sampling_rate_hz")]
    pub sampling_rate_hz: f64,
    /// Display filter applied when the viewer starts
    #[serde(default)]
    pub filter: SignalFilter,
    #[serde(default = "default_bandpass_low_hz")]
    pub bandpass_low_hz: f64,
    #[serde(default = "default_bandpass_high_hz")]
    pub bandpass_high_hz: f64,
    /// Butterworth order of each band edge
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,
    /// Trailing window of the RMS envelope
    #[serde(default = "default_rms_window_ms")]
    pub rms_window_ms: u64,
}

fn default_window_seconds() -> u32 {
    10
}

fn default_tick_interval_ms() -> u64 {
    33
}

fn default_receive_timeout_ms() -> u64 {
    200
}

fn default_sampling_rate_hz() -> f64 {
    2048.0
}

fn default_bandpass_low_hz() -> f64 {
    20.0
}

fn default_bandpass_high_hz() -> f64 {
    450.0
}

fn default_filter_order() -> usize {
    4
}

fn default_rms_window_ms() -> u64 {
    100
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            window_seconds: default_window_seconds(),
            tick_interval_ms: default_tick_interval_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
            sampling_rate_hz: default_sampling_rate_hz(),
            filter: SignalFilter::default(),
            bandpass_low_hz: default_bandpass_low_hz(),
            bandpass_high_hz: default_bandpass_high_hz(),
            filter_order: default_filter_order(),
            rms_window_ms: default_rms_window_ms(),
        }
    }
}

impl ViewerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Samples per second the display advances by: one packet per tick
    pub fn effective_sampling_rate(&self, samples_per_packet: usize) -> usize {
        let ticks_per_second = 1000 / self.tick_interval_ms.max(1) as usize;
        samples_per_packet * ticks_per_second
    }

    /// Samples held by each display buffer
    pub fn window_capacity(&self, samples_per_packet: usize) -> usize {
        self.effective_sampling_rate(samples_per_packet) * self.window_seconds as usize
    }

    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            low_hz: self.bandpass_low_hz,
            high_hz: self.bandpass_high_hz,
            order: self.filter_order,
            rms_window: Duration::from_millis(self.rms_window_ms),
        }
    }

    pub fn window_spec(&self, layout: FrameLayout) -> WindowSpec {
        WindowSpec {
            capacity: self.window_capacity(layout.samples_per_packet),
            window_seconds: self.window_seconds as f32,
            sampling_rate_hz: self.sampling_rate_hz,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RelayConfig {
    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("emg-relay").join("config.toml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| RelayError::ConfigError {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| RelayError::ConfigError {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| RelayError::ConfigError {
            message: format!("Failed to serialize config: {}", e),
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no component can run with
    pub fn validate(&self) -> Result<()> {
        if self.stream.channels == 0 || self.stream.samples_per_packet == 0 {
            return Err(config_error("stream.channels and stream.samples_per_packet must be positive"));
        }
        if self.viewer.window_seconds == 0 {
            return Err(config_error("viewer.window_seconds must be at least 1"));
        }
        if self.viewer.tick_interval_ms == 0 || self.viewer.tick_interval_ms > 1000 {
            return Err(config_error("viewer.tick_interval_ms must be within 1..=1000"));
        }
        if !(self.viewer.sampling_rate_hz.is_finite() && self.viewer.sampling_rate_hz > 0.0) {
            return Err(config_error("viewer.sampling_rate_hz must be positive"));
        }
        if self.viewer.rms_window_ms == 0 {
            return Err(config_error("viewer.rms_window_ms must be positive"));
        }
        if self.viewer.filter_order == 0 || self.viewer.filter_order > MAX_ORDER {
            return Err(config_error(&format!(
                "viewer.filter_order must be within 1..={}",
                MAX_ORDER
            )));
        }
        let viewer = &self.viewer;
        if viewer.filter == SignalFilter::Bandpass {
            Bandpass::butterworth(
                viewer.filter_order,
                viewer.bandpass_low_hz,
                viewer.bandpass_high_hz,
                viewer.sampling_rate_hz,
            )
            .map_err(|e| config_error(&format!("viewer band-pass: {}", e)))?;
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(config_error(&format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Get a configuration value by key path (e.g., "server.port")
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["stream", "channels"] => Some(self.stream.channels.to_string()),
            ["stream", "samples_per_packet"] => Some(self.stream.samples_per_packet.to_string()),
            ["server", "host"] => Some(self.server.host.clone()),
            ["server", "port"] => Some(self.server.port.to_string()),
            ["server", "recording"] => Some(self.server.recording.display().to_string()),
            ["server", "print_data"] => Some(self.server.print_data.to_string()),
            ["server", "send_timeout_ms"] => Some(self.server.send_timeout_ms.to_string()),
            ["server", "shutdown_grace_ms"] => Some(self.server.shutdown_grace_ms.to_string()),
            ["viewer", "host"] => Some(self.viewer.host.clone()),
            ["viewer", "port"] => Some(self.viewer.port.to_string()),
            ["viewer", "window_seconds"] => Some(self.viewer.window_seconds.to_string()),
            ["viewer", "tick_interval_ms"] => Some(self.viewer.tick_interval_ms.to_string()),
            ["viewer", "receive_timeout_ms"] => Some(self.viewer.receive_timeout_ms.to_string()),
            ["viewer", "sampling_rate_hz"] => Some(self.viewer.sampling_rate_hz.to_string()),
            ["viewer", "filter"] => Some(self.viewer.filter.to_string()),
            ["viewer", "bandpass_low_hz"] => Some(self.viewer.bandpass_low_hz.to_string()),
            ["viewer", "bandpass_high_hz"] => Some(self.viewer.bandpass_high_hz.to_string()),
            ["viewer", "filter_order"] => Some(self.viewer.filter_order.to_string()),
            ["viewer", "rms_window_ms"] => Some(self.viewer.rms_window_ms.to_string()),
            ["logging", "level"] => Some(self.logging.level.clone()),
            _ => None,
        }
    }

    /// Set a configuration value by key path
    ///
    /// The whole config is re-validated; on error nothing is changed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["stream", "channels"] => next.stream.channels = parse(key, value)?,
            ["stream", "samples_per_packet"] => next.stream.samples_per_packet = parse(key, value)?,
            ["server", "host"] => next.server.host = value.to_string(),
            ["server", "port"] => next.server.port = parse(key, value)?,
            ["server", "recording"] => next.server.recording = PathBuf::from(value),
            ["server", "print_data"] => next.server.print_data = parse(key, value)?,
            ["server", "send_timeout_ms"] => next.server.send_timeout_ms = parse(key, value)?,
            ["server", "shutdown_grace_ms"] => next.server.shutdown_grace_ms = parse(key, value)?,
            ["viewer", "host"] => next.viewer.host = value.to_string(),
            ["viewer", "port"] => next.viewer.port = parse(key, value)?,
            ["viewer", "window_seconds"] => next.viewer.window_seconds = parse(key, value)?,
            ["viewer", "tick_interval_ms"] => next.viewer.tick_interval_ms = parse(key, value)?,
            ["viewer", "receive_timeout_ms"] => next.viewer.receive_timeout_ms = parse(key, value)?,
            ["viewer", "sampling_rate_hz"] => next.viewer.sampling_rate_hz = parse(key, value)?,
            ["viewer", "filter"] => next.viewer.filter = parse(key, value)?,
            ["viewer", "bandpass_low_hz"] => next.viewer.bandpass_low_hz = parse(key, value)?,
            ["viewer", "bandpass_high_hz"] => next.viewer.bandpass_high_hz = parse(key, value)?,
            ["viewer", "filter_order"] => next.viewer.filter_order = parse(key, value)?,
            ["viewer", "rms_window_ms"] => next.viewer.rms_window_ms = parse(key, value)?,
            ["logging", "level"] => next.logging.level = value.to_ascii_lowercase(),
            _ => {
                return Err(config_error(&format!("Unknown configuration key: {}", key)));
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| config_error(&format!("Invalid value for {}: {}", key, value)))
}

fn config_error(message: &str) -> RelayError {
    RelayError::ConfigError {
        message: message.to_string(),
    }
}
