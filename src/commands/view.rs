//! View command handler - Watch a live stream from the terminal
//!
//! Runs the viewer against a server and prints one line per emitted frame instead of
//! drawing it. Status changes are printed as they happen.

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{OutputFormat, ViewArgs};
use crate::commands::CommandContext;
use crate::dsp;
use crate::error::Result;
use crate::filters::SignalFilter;
use crate::viewer::{
    ConnectionStatus, SeriesLabel, TcpPacketSource, ViewFrame, ViewMode, ViewSession, ViewerHandle,
};

/// Condensed form of one frame
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub sequence: u64,
    pub mode: ViewMode,
    pub filter: SignalFilter,
    pub series: Vec<SeriesSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    #[serde(flatten)]
    pub label: SeriesLabel,
    pub len: usize,
    pub rms: f32,
    /// Largest absolute value
    pub peak: f32,
    /// Axis value (seconds or Hz) where the peak sits
    pub peak_at: f32,
}

impl FrameSummary {
    pub fn of(frame: &ViewFrame) -> Self {
        let series = frame
            .series
            .iter()
            .map(|series| {
                let (index, peak) = series
                    .values
                    .iter()
                    .map(|v| v.abs())
                    .enumerate()
                    .fold((0, 0.0f32), |best, (i, v)| if v > best.1 { (i, v) } else { best });
                SeriesSummary {
                    label: series.label,
                    len: series.values.len(),
                    rms: dsp::rms(&series.values),
                    peak,
                    peak_at: frame.axis.get(index).copied().unwrap_or(0.0),
                }
            })
            .collect();
        Self {
            sequence: frame.sequence,
            mode: frame.mode,
            filter: frame.filter,
            series,
        }
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string(self).unwrap_or_default(),
            OutputFormat::Text => {
                let parts: Vec<String> = self
                    .series
                    .iter()
                    .map(|s| {
                        format!(
                            "{} n={} rms={:.4} peak={:.4}@{:.3}",
                            describe(&s.label),
                            s.len,
                            s.rms,
                            s.peak,
                            s.peak_at
                        )
                    })
                    .collect();
                match self.filter {
                    SignalFilter::Raw => {
                        format!("#{} {}: {}", self.sequence, self.mode, parts.join(" | "))
                    }
                    filter => format!(
                        "#{} {} ({}): {}",
                        self.sequence,
                        self.mode,
                        filter,
                        parts.join(" | ")
                    ),
                }
            }
        }
    }
}

fn describe(label: &SeriesLabel) -> String {
    match label {
        SeriesLabel::Channel { channel } => format!("ch{}", channel),
        SeriesLabel::Difference {
            minuend,
            subtrahend,
        } => format!("ch{}-ch{}", minuend, subtrahend),
        SeriesLabel::Spectrum { channel } => format!("fft(ch{})", channel),
    }
}

fn render_status(status: ConnectionStatus, format: OutputFormat) -> String {
    match (format, status) {
        (OutputFormat::Json, ConnectionStatus::Connected { peer }) => serde_json::json!({
            "status": "connected",
            "peer": peer.map(|p| p.to_string()),
        })
        .to_string(),
        (OutputFormat::Json, ConnectionStatus::Disconnected) => {
            serde_json::json!({ "status": "disconnected" }).to_string()
        }
        (OutputFormat::Text, ConnectionStatus::Connected { peer: Some(peer) }) => {
            format!("connected to {}", peer)
        }
        (OutputFormat::Text, ConnectionStatus::Connected { peer: None }) => "connected".to_string(),
        (OutputFormat::Text, ConnectionStatus::Disconnected) => "disconnected".to_string(),
    }
}

/// Run the view command
///
/// Prints frames as they arrive; the returned text is the closing summary.
pub async fn run_view(args: &ViewArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.config.clone();
    if let Some(host) = &args.host {
        config.viewer.host = host.clone();
    }
    if let Some(port) = args.port {
        config.viewer.port = port;
    }
    if let Some(seconds) = args.window_seconds {
        config.viewer.window_seconds = seconds;
    }
    if let Some(rate) = args.sampling_rate {
        config.viewer.sampling_rate_hz = rate;
    }
    if let Some(filter) = args.filter {
        config.viewer.filter = filter;
    }
    config.validate()?;

    let layout = config.stream.layout();
    let source =
        TcpPacketSource::connect(&config.viewer.addr(), layout, config.viewer.receive_timeout()).await?;
    let peer = source.peer_addr();

    let session = ViewSession::new(layout, config.viewer.window_spec(layout), args.mode)
        .with_filter_settings(config.viewer.filter_settings());
    let viewer = ViewerHandle::spawn(session, source, config.viewer.tick_interval(), peer);
    let mut frames = viewer.subscribe();
    let mut status = viewer.status_changes();

    viewer.set_selection(args.channels.clone()).await?;
    viewer.set_filter(config.viewer.filter).await?;
    println!("{}", render_status(viewer.status(), ctx.format));
    viewer.start().await?;

    let mut received = 0u64;
    let mut lagged = 0u64;
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    received += 1;
                    println!("{}", FrameSummary::of(&frame).render(ctx.format));
                    if args.ticks.is_some_and(|limit| received >= limit) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Output fell behind, skipped {} frame(s)", missed);
                    lagged += missed;
                }
                Err(RecvError::Closed) => break,
            },

            changed = status.changed() => {
                let current = *status.borrow_and_update();
                println!("{}", render_status(current, ctx.format));
                if changed.is_err() || current == ConnectionStatus::Disconnected {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    // After a server-side close the task has already ended on its own
    if !viewer.is_finished() {
        let _ = viewer.stop().await;
    }
    viewer.shutdown().await?;

    Ok(match ctx.format {
        OutputFormat::Json => format!(
            "{}\n",
            serde_json::json!({ "frames": received, "skipped": lagged })
        ),
        OutputFormat::Text => format!("{} frame(s) shown, {} skipped\n", received, lagged),
    })
}
