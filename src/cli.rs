//! CLI argument definitions using clap with subcommand architecture
//!
//! The `emg-relay` client binary: watch a live stream, generate synthetic recordings,
//! inspect recordings on disk and manage the config file. The server lives in its own
//! binary, `emg-relay-server`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::filters::SignalFilter;
use crate::viewer::ViewMode;

/// EMG stream client and recording tools
#[derive(Parser, Debug)]
#[command(name = "emg-relay")]
#[command(about = "Watch a live EMG stream and work with recordings")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "EMG_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

// ============================================
// Main Commands Enum
// ============================================

/// Available subcommands for emg-relay
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a server and print one summary per displayed frame
    #[command(visible_alias = "v")]
    View(ViewArgs),

    /// Write a synthetic recording
    Synth(SynthArgs),

    /// Print what a recording contains
    Inspect(InspectArgs),

    /// Manage emg-relay configuration
    Config(ConfigArgs),
}

// ============================================
// View Subcommand
// ============================================

/// Arguments for the view command
#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// View mode: individual, differential, frequency or multi
    #[arg(short, long, default_value = "individual")]
    pub mode: ViewMode,

    /// Display filter: raw, bandpass or rms (defaults to viewer.filter)
    #[arg(long)]
    pub filter: Option<SignalFilter>,

    /// Channels to select, 1-based and comma separated (differential takes two)
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub channels: Vec<usize>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    pub ticks: Option<u64>,

    /// Seconds of history per display buffer
    #[arg(long)]
    pub window_seconds: Option<u32>,

    /// Recording rate used to label the frequency axis
    #[arg(long)]
    pub sampling_rate: Option<f64>,
}

// ============================================
// Synth Subcommand
// ============================================

/// Arguments for the synth command
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Output file (.json, anything else is written as bincode)
    #[arg(short, long, value_name = "FILE")]
    pub out: PathBuf,

    /// Number of channels
    #[arg(long, default_value = "32")]
    pub channels: usize,

    /// Length in seconds (rounded down to whole windows)
    #[arg(long, default_value = "10")]
    pub seconds: f64,

    /// Sampling rate in Hz
    #[arg(long, default_value = "2048")]
    pub rate: f64,

    /// Seed for the noise component
    #[arg(long, default_value = "0")]
    pub seed: u64,
}

// ============================================
// Inspect Subcommand
// ============================================

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Recording to read
    #[arg(value_name = "FILE")]
    pub path: PathBuf,
}

// ============================================
// Config Subcommand
// ============================================

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config operation: show, get, set, reset, path
    #[command(subcommand)]
    pub operation: ConfigOperation,
}

/// Config subcommand operations
#[derive(Subcommand, Debug)]
pub enum ConfigOperation {
    /// Show current configuration
    Show,

    /// Print one configuration value
    Get {
        /// Configuration key (e.g., server.port, viewer.window_seconds)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., server.port, logging.level)
        key: String,
        /// Value to set
        value: String,
    },

    /// Reset configuration to defaults
    Reset,

    /// Print the config file location
    Path,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    #[value(alias = "pretty")]
    Text,
    /// JSON - one object per line for streams, pretty-printed otherwise
    Json,
}
