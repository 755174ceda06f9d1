//! emg-relay CLI entry point

use std::process::ExitCode;

use clap::Parser;

use emg_relay::cli::{Cli, Commands};
use emg_relay::commands::{run_config, run_inspect, run_synth, run_view, CommandContext};
use emg_relay::logging::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

async fn run() -> emg_relay::Result<String> {
    let cli = Cli::parse();
    let ctx = CommandContext::from_cli(&cli)?;
    init_tracing(&ctx.config.logging.level);

    match &cli.command {
        Commands::View(args) => run_view(args, &ctx).await,
        Commands::Synth(args) => run_synth(args, &ctx),
        Commands::Inspect(args) => run_inspect(args, &ctx),
        Commands::Config(args) => run_config(args, &ctx),
    }
}
