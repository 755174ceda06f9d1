//! emg-relay broadcast server
//!
//! Replays a multi-channel EMG recording to every TCP client in real time.
//!
//! # Usage
//!
//! ```bash
//! emg-relay-server --recording session.json
//! emg-relay-server --port 12345 --host 0.0.0.0 --ndp
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use emg_relay::config::RelayConfig;
use emg_relay::logging::init_tracing;
use emg_relay::recording::Recording;
use emg_relay::stream::{BroadcastOptions, BroadcastServer};
use emg_relay::RelayError;

/// EMG recording broadcast server
#[derive(Parser, Debug)]
#[command(name = "emg-relay-server")]
#[command(about = "Stream a recorded EMG session to TCP clients in real time")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Recording to replay (.json, anything else is read as bincode)
    #[arg(short, long)]
    recording: Option<PathBuf>,

    /// Do not print outgoing packets
    #[arg(long)]
    ndp: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "EMG_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn resolve(&self) -> Result<RelayConfig, RelayError> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load_from(path)?,
            None => RelayConfig::load()?,
        };
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(recording) = &self.recording {
            config.server.recording = recording.clone();
        }
        if self.ndp {
            config.server.print_data = false;
        }
        if let Some(level) = &self.log_level {
            config.set("logging.level", level)?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match args.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };
    init_tracing(&config.logging.level);

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let relay = e.downcast_ref::<RelayError>();
            if relay.is_some_and(RelayError::is_recording_error) {
                tracing::error!("Recording rejected, no client was accepted: {:#}", e);
            } else {
                tracing::error!("{:#}", e);
            }
            eprintln!("Error: {:#}", e);
            relay.map(RelayError::exit_code).unwrap_or(ExitCode::FAILURE)
        }
    }
}

async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let layout = config.stream.layout();
    // Fail before binding: a server without data must never accept anyone
    let recording = Recording::load(&config.server.recording, layout)
        .with_context(|| format!("Cannot serve {}", config.server.recording.display()))?;

    let server = BroadcastServer::bind(
        &config.server.addr(),
        recording,
        BroadcastOptions::from_config(&config),
    )
    .await?;
    let handle = server.spawn();
    tracing::info!("Serving on {} (Ctrl-C to stop)", handle.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    let registry = handle.registry();
    let stats = registry.stats();
    tracing::info!(
        "Interrupted with {} client(s) connected, {} accepted in total",
        stats.connected,
        stats.total_accepted
    );
    for client in registry.snapshot() {
        tracing::info!(
            "Closing {} from {} (connected {})",
            client.id,
            client
                .peer
                .map_or_else(|| "unknown peer".to_string(), |p| p.to_string()),
            client.connected_at.format("%H:%M:%S")
        );
    }
    handle.shutdown().await?;
    Ok(())
}
