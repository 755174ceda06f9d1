//! Console dump of outgoing packets
//!
//! Not logging: this redraws the terminal from the top-left corner with the packet
//! being sent, the way a bench operator watches the stream. Disabled with `--ndp`.
//! Terminal writes run on the blocking pool, never on a client task.

use std::sync::Arc;

use console::{style, Term};
use tokio::sync::watch;

use crate::frame::Packet;

/// Terminal width used when stdout is not a terminal
const FALLBACK_WIDTH: usize = 120;

/// A packet handed to the terminal writer
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub index: usize,
    pub packet: Packet,
}

/// Shows sent packets on the terminal from a single writer task
///
/// Client tasks only publish the latest packet. The writer redraws whatever is newest
/// when the previous redraw finishes, so a slow terminal skips packets instead of
/// holding up any client.
pub struct DataDump {
    latest: Option<watch::Sender<Option<SentPacket>>>,
}

impl DataDump {
    /// Dump to stdout when `enabled`; the writer task needs a tokio runtime
    pub fn stdout(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let term = Term::stdout();
        Self::with_writer(move |sent| draw(&term, sent))
    }

    pub fn disabled() -> Self {
        Self { latest: None }
    }

    /// Run `draw` on a blocking thread for each packet the writer picks up
    pub fn with_writer<F>(draw: F) -> Self
    where
        F: Fn(&SentPacket) + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(write_loop(rx, Arc::new(draw)));
        Self { latest: Some(tx) }
    }

    pub fn is_enabled(&self) -> bool {
        self.latest.is_some()
    }

    /// Publish packet `index` as the newest one sent
    pub fn show(&self, index: usize, packet: Packet) {
        if let Some(latest) = &self.latest {
            latest.send_replace(Some(SentPacket { index, packet }));
        }
    }
}

async fn write_loop<F>(mut latest: watch::Receiver<Option<SentPacket>>, draw: Arc<F>)
where
    F: Fn(&SentPacket) + Send + Sync + 'static,
{
    // Ends once the dump, and with it the sender, is dropped
    while latest.changed().await.is_ok() {
        let Some(sent) = latest.borrow_and_update().clone() else {
            continue;
        };
        let draw = Arc::clone(&draw);
        if let Err(e) = tokio::task::spawn_blocking(move || draw(&sent)).await {
            tracing::warn!("Data dump writer stopped: {}", e);
            break;
        }
    }
}

/// Redraw the screen from the top-left corner
fn draw(term: &Term, sent: &SentPacket) {
    let width = match term.size_checked() {
        Some((_, cols)) => cols as usize,
        None => FALLBACK_WIDTH,
    };
    let text = render(sent.index, &sent.packet, width);
    // Ignore write errors (stdout may be closed)
    let _ = term.move_cursor_to(0, 0);
    let _ = term.write_str(&text);
    let _ = term.flush();
}

/// Text for one packet, each line clipped to `width` columns
pub fn render(index: usize, packet: &Packet, width: usize) -> String {
    let layout = packet.layout();
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        style(format!("Sending window {}:", index)).bold()
    ));
    out.push_str(&format!(
        "shape: [{}, {}]\n",
        layout.channels, layout.samples_per_packet
    ));

    for (channel, row) in packet.samples().rows().into_iter().enumerate() {
        let values: Vec<String> = row.iter().map(|v| format!("{:>9.3}", v)).collect();
        let line = format!("ch{:<3} {}", channel + 1, values.join(" "));
        out.push_str(&clip(&line, width));
        out.push('\n');
    }
    out
}

fn clip(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        line.to_string()
    } else {
        line.chars().take(width).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn test_render_lists_every_channel() {
        let packet = Packet::new(Array2::from_shape_fn((3, 2), |(c, t)| (c * 10 + t) as f32));
        let text = render(7, &packet, 200);

        assert!(text.contains("Sending window 7:"));
        assert!(text.contains("shape: [3, 2]"));
        assert!(text.contains("ch1"));
        assert!(text.contains("ch3"));
        assert!(text.contains("21.000"));
    }

    #[test]
    fn test_render_clips_to_width() {
        let packet = Packet::new(Array2::from_elem((2, 18), 1234.5));
        let text = render(0, &packet, 40);
        for line in text.lines().skip(2) {
            assert!(line.chars().count() <= 40);
        }
    }

    #[test]
    fn test_disabled_dump_is_silent() {
        let dump = DataDump::disabled();
        assert!(!dump.is_enabled());
        dump.show(0, Packet::new(Array2::zeros((1, 1))));
    }

    #[tokio::test]
    async fn test_writer_catches_up_to_newest_packet() {
        let drawn = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&drawn);
        let dump = DataDump::with_writer(move |sent| {
            std::thread::sleep(Duration::from_millis(5));
            seen.lock().push(sent.index);
        });
        assert!(dump.is_enabled());

        // Publishing never waits on the slow writer
        let started = Instant::now();
        for index in 0..200 {
            dump.show(index, Packet::new(Array2::from_elem((1, 2), index as f32)));
        }
        assert!(started.elapsed() < Duration::from_millis(500));

        let deadline = Instant::now() + Duration::from_secs(5);
        while drawn.lock().last() != Some(&199) {
            assert!(Instant::now() < deadline, "writer never reached the newest packet");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let drawn = drawn.lock();
        assert!(drawn.len() < 200);
        assert!(drawn.windows(2).all(|w| w[0] < w[1]));
    }
}
