//! Config command handler - Show and edit the config file

use crate::cli::{ConfigArgs, ConfigOperation, OutputFormat};
use crate::commands::{to_json, CommandContext};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};

/// Run the config command
pub fn run_config(args: &ConfigArgs, ctx: &CommandContext) -> Result<String> {
    match &args.operation {
        ConfigOperation::Show => Ok(show(&ctx.config, ctx.format)),
        ConfigOperation::Get { key } => ctx
            .config
            .get(key)
            .map(|value| format!("{}\n", value))
            .ok_or_else(|| RelayError::ConfigError {
                message: format!("Unknown configuration key: {}", key),
            }),
        ConfigOperation::Set { key, value } => {
            let path = require_path(ctx)?;
            // Start from the file, not from flag overrides
            let mut config = RelayConfig::load_from(&path)?;
            config.set(key, value)?;
            config.save_to(&path)?;
            Ok(format!("Set {} = {}\n", key, value))
        }
        ConfigOperation::Reset => {
            let path = require_path(ctx)?;
            RelayConfig::default().save_to(&path)?;
            Ok(format!("Reset {}\n", path.display()))
        }
        ConfigOperation::Path => match &ctx.config_path {
            Some(path) => Ok(format!("{}\n", path.display())),
            None => Ok("(no config directory on this platform)\n".to_string()),
        },
    }
}

fn show(config: &RelayConfig, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format!("{}\n", to_json(config)),
        OutputFormat::Text => toml::to_string_pretty(config).unwrap_or_default(),
    }
}

fn require_path(ctx: &CommandContext) -> Result<std::path::PathBuf> {
    ctx.config_path.clone().ok_or_else(|| RelayError::ConfigError {
        message: "No config path; pass --config".to_string(),
    })
}
