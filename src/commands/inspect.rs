//! Inspect command handler - Describe a recording on disk

use serde::Serialize;

use crate::cli::{InspectArgs, OutputFormat};
use crate::commands::{to_json, CommandContext};
use crate::dsp;
use crate::error::Result;
use crate::frame::FrameLayout;
use crate::recording::{Recording, RecordingFile};

#[derive(Debug, Serialize)]
struct RecordingReport {
    path: String,
    channels: usize,
    samples_per_window: usize,
    windows: usize,
    samples_per_channel: usize,
    sampling_rate_hz: f64,
    duration_secs: f64,
    /// Packets per pass at the configured packet size
    packets: usize,
    channel_rms: Vec<f32>,
}

/// Run the inspect command
pub fn run_inspect(args: &InspectArgs, ctx: &CommandContext) -> Result<String> {
    let file = RecordingFile::read(&args.path)?;
    let (channels, samples_per_window, windows) = file.biosignal.dim();

    let samples_per_packet = ctx.config.stream.samples_per_packet;
    let recording = Recording::from_file(file, FrameLayout::new(channels, samples_per_packet))?;

    let report = RecordingReport {
        path: args.path.display().to_string(),
        channels,
        samples_per_window,
        windows,
        samples_per_channel: recording.sample_count(),
        sampling_rate_hz: recording.sampling_rate_hz(),
        duration_secs: recording.duration_secs(),
        packets: recording.sample_count() / samples_per_packet,
        channel_rms: (0..channels)
            .filter_map(|c| recording.channel(c))
            .map(|row| dsp::rms(&row.to_vec()))
            .collect(),
    };

    Ok(match ctx.format {
        OutputFormat::Json => format!("{}\n", to_json(&report)),
        OutputFormat::Text => render_text(&report),
    })
}

fn render_text(report: &RecordingReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("recording: {}\n", report.path));
    out.push_str(&format!(
        "shape: [{}, {}, {}] (channels, samples/window, windows)\n",
        report.channels, report.samples_per_window, report.windows
    ));
    out.push_str(&format!("sampling_rate: {} Hz\n", report.sampling_rate_hz));
    out.push_str(&format!(
        "samples: {} per channel ({:.2} s)\n",
        report.samples_per_channel, report.duration_secs
    ));
    out.push_str(&format!("packets: {} per pass\n", report.packets));
    out.push_str("rms:\n");
    for (i, rms) in report.channel_rms.iter().enumerate() {
        out.push_str(&format!("  ch{:<3} {:.4}\n", i + 1, rms));
    }
    out
}
