//! Command modules for the emg-relay CLI
//!
//! Each command module implements a single top-level command:
//! - `view` - Connect to a server and summarize every displayed frame
//! - `synth` - Generate a synthetic recording
//! - `inspect` - Describe a recording on disk
//! - `config` - Show and edit the config file
//!
//! All command handlers take their respective `Args` struct from `cli.rs`
//! and a shared `CommandContext`, and return the text to print on success.

pub mod config;
pub mod inspect;
pub mod synth;
pub mod view;

pub use config::run_config;
pub use inspect::run_inspect;
pub use synth::run_synth;
pub use view::run_view;

use std::path::PathBuf;

use crate::cli::{Cli, OutputFormat};
use crate::config::RelayConfig;
use crate::error::Result;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Output format (text or json)
    pub format: OutputFormat,
    /// Loaded configuration with global flags applied
    pub config: RelayConfig,
    /// Where `config` came from and where `config set` writes
    pub config_path: Option<PathBuf>,
}

impl CommandContext {
    /// Load the config file and apply global flags
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().or_else(RelayConfig::default_path);
        let mut config = match &config_path {
            Some(path) => RelayConfig::load_from(path)?,
            None => RelayConfig::default(),
        };
        if let Some(level) = &cli.log_level {
            config.set("logging.level", level)?;
        }
        Ok(Self {
            format: cli.format,
            config,
            config_path,
        })
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            config: RelayConfig::default(),
            config_path: None,
        }
    }
}

/// Pretty JSON for command output
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
