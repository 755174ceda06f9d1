//! Viewer task: the tick loop and its command channel
//!
//! One task owns the session and the packet source. User actions arrive as commands
//! and are applied between ticks, so a tick never observes a half-applied mode or
//! selection change. Commands that change state are acknowledged; once `stop()`
//! returns, no further tick will run until `start()`.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::{RelayError, Result};
use crate::filters::{FilterError, SignalFilter};
use crate::viewer::mode::{SelectionError, ViewMode};
use crate::viewer::session::{SkipReason, TickOutcome, ViewFrame, ViewSession};
use crate::viewer::source::PacketSource;

/// Frames buffered per subscriber before the slowest starts lagging
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Connection state visible to the display layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected { peer: Option<SocketAddr> },
    Disconnected,
}

enum Command {
    Start {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetMode {
        mode: ViewMode,
        reply: oneshot::Sender<()>,
    },
    Select {
        channel: usize,
        reply: oneshot::Sender<std::result::Result<bool, SelectionError>>,
    },
    Deselect {
        channel: usize,
        reply: oneshot::Sender<std::result::Result<bool, SelectionError>>,
    },
    SetSelection {
        channels: Vec<usize>,
        reply: oneshot::Sender<std::result::Result<(), SelectionError>>,
    },
    SetFilter {
        filter: SignalFilter,
        reply: oneshot::Sender<std::result::Result<(), FilterError>>,
    },
    Shutdown,
}

/// Handle to a running viewer task
pub struct ViewerHandle {
    commands: mpsc::Sender<Command>,
    frames: broadcast::Sender<ViewFrame>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl ViewerHandle {
    /// Spawn the viewer task; it starts stopped
    pub fn spawn<S>(session: ViewSession, source: S, tick: Duration, peer: Option<SocketAddr>) -> Self
    where
        S: PacketSource + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (frame_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected { peer });

        let player = Player {
            session,
            source,
            commands: command_rx,
            frames: frame_tx.clone(),
            status: status_tx,
            tick,
            playing: false,
        };
        let task = tokio::spawn(player.run());

        Self {
            commands: command_tx,
            frames: frame_tx,
            status: status_rx,
            task,
        }
    }

    /// Receive every frame emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ViewFrame> {
        self.frames.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch for connection status changes
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Begin ticking; buffers start from zeros
    pub async fn start(&self) -> Result<()> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Stop ticking and zero every buffer; the connection stays open
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn set_mode(&self, mode: ViewMode) -> Result<()> {
        self.request(|reply| Command::SetMode { mode, reply }).await
    }

    pub async fn select(&self, channel: usize) -> Result<bool> {
        Ok(self
            .request(|reply| Command::Select { channel, reply })
            .await??)
    }

    pub async fn deselect(&self, channel: usize) -> Result<bool> {
        Ok(self
            .request(|reply| Command::Deselect { channel, reply })
            .await??)
    }

    pub async fn set_selection(&self, channels: Vec<usize>) -> Result<()> {
        Ok(self
            .request(|reply| Command::SetSelection { channels, reply })
            .await??)
    }

    /// Change the display filter; buffers keep their contents
    pub async fn set_filter(&self, filter: SignalFilter) -> Result<()> {
        Ok(self
            .request(|reply| Command::SetFilter { filter, reply })
            .await??)
    }

    /// Stop the task and close the connection
    pub async fn shutdown(self) -> Result<()> {
        // The task may already be gone after a server-side close
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|e| {
            RelayError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| RelayError::ViewerClosed)?;
        reply_rx.await.map_err(|_| RelayError::ViewerClosed)
    }
}

struct Player<S> {
    session: ViewSession,
    source: S,
    commands: mpsc::Receiver<Command>,
    frames: broadcast::Sender<ViewFrame>,
    status: watch::Sender<ConnectionStatus>,
    tick: Duration,
    playing: bool,
}

impl<S: PacketSource> Player<S> {
    async fn run(mut self) {
        let mut ticker = time::interval(self.tick);
        // A tick that overruns delays the ones behind it rather than overlapping
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle(command, &mut ticker),
                    }
                }

                _ = ticker.tick(), if self.playing => {
                    if !self.tick_once().await {
                        break;
                    }
                }
            }
        }

        self.session.clear();
        let _ = self.status.send(ConnectionStatus::Disconnected);
        tracing::debug!("Viewer task finished");
    }

    fn handle(&mut self, command: Command, ticker: &mut time::Interval) {
        match command {
            Command::Start { reply } => {
                if !self.playing {
                    self.playing = true;
                    self.session.clear();
                    ticker.reset_immediately();
                    tracing::info!("Playback started in {} mode", self.session.mode());
                }
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                if self.playing {
                    self.playing = false;
                    self.session.clear();
                    tracing::info!("Playback stopped");
                }
                let _ = reply.send(());
            }
            Command::SetMode { mode, reply } => {
                self.session.set_mode(mode);
                tracing::debug!("View mode set to {}", mode);
                let _ = reply.send(());
            }
            Command::Select { channel, reply } => {
                let _ = reply.send(self.session.select(channel));
            }
            Command::Deselect { channel, reply } => {
                let _ = reply.send(self.session.deselect(channel));
            }
            Command::SetSelection { channels, reply } => {
                let _ = reply.send(self.session.set_selection(&channels));
            }
            Command::SetFilter { filter, reply } => {
                let result = self.session.set_filter(filter);
                match &result {
                    Ok(()) => tracing::debug!("Display filter set to {}", filter),
                    Err(e) => tracing::warn!("Display filter {} rejected: {}", filter, e),
                }
                let _ = reply.send(result);
            }
            Command::Shutdown => {}
        }
    }

    /// Returns false once the stream is gone
    async fn tick_once(&mut self) -> bool {
        let delivery = self.source.receive().await;
        match self.session.process(delivery) {
            TickOutcome::Emitted(frame) => {
                // No subscribers is not an error
                let _ = self.frames.send(frame);
            }
            TickOutcome::Skipped(SkipReason::NoData) => {
                tracing::debug!("No data received this tick");
            }
            TickOutcome::Skipped(reason) => {
                tracing::trace!("Tick skipped: {:?}", reason);
            }
            TickOutcome::DecodeFailed(e) => {
                tracing::warn!("Dropped malformed packet: {}", e);
            }
            TickOutcome::Disconnected => {
                tracing::info!("Stream closed by server");
                self.playing = false;
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameLayout, Packet};
    use crate::viewer::session::WindowSpec;
    use crate::viewer::source::{Delivery, ScriptedSource};
    use ndarray::Array2;

    const LAYOUT: FrameLayout = FrameLayout::new(4, 2);

    fn session(mode: ViewMode) -> ViewSession {
        ViewSession::new(
            LAYOUT,
            WindowSpec {
                capacity: 6,
                window_seconds: 1.0,
                sampling_rate_hz: 6.0,
            },
            mode,
        )
    }

    fn data(value: f32) -> Delivery {
        let samples = Array2::from_elem((LAYOUT.channels, LAYOUT.samples_per_packet), value);
        Delivery::Data(Packet::new(samples).encode())
    }

    #[tokio::test]
    async fn test_emits_frames_after_start() {
        let source = ScriptedSource::new([data(1.0), data(2.0)]);
        let viewer = ViewerHandle::spawn(session(ViewMode::Individual), source, Duration::from_millis(5), None);
        let mut frames = viewer.subscribe();

        viewer.select(1).await.unwrap();
        viewer.start().await.unwrap();

        let first = frames.recv().await.unwrap();
        assert_eq!(first.series[0].values, vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        let second = frames.recv().await.unwrap();
        assert_eq!(second.series[0].values, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);

        // Script exhausted -> closed -> task ends
        let mut status = viewer.status_changes();
        status
            .wait_for(|s| *s == ConnectionStatus::Disconnected)
            .await
            .unwrap();
        assert!(matches!(viewer.start().await, Err(RelayError::ViewerClosed)));
    }

    #[tokio::test]
    async fn test_selection_errors_propagate() {
        let viewer = ViewerHandle::spawn(
            session(ViewMode::Differential),
            ScriptedSource::default(),
            Duration::from_millis(5),
            None,
        );
        assert!(viewer.select(2).await.unwrap());
        assert!(viewer.select(3).await.unwrap());
        assert!(matches!(
            viewer.select(4).await,
            Err(RelayError::Selection(SelectionError::Full { .. }))
        ));
        assert!(matches!(
            viewer.select(99).await,
            Err(RelayError::Selection(SelectionError::OutOfRange { .. }))
        ));
        viewer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_change_applies_to_next_frame() {
        let source = ScriptedSource::new([data(3.0), data(-3.0)]);
        let viewer = ViewerHandle::spawn(session(ViewMode::Individual), source, Duration::from_millis(5), None);
        let mut frames = viewer.subscribe();
        viewer.select(1).await.unwrap();
        viewer.set_filter(SignalFilter::Rms).await.unwrap();
        viewer.start().await.unwrap();

        let first = frames.recv().await.unwrap();
        assert_eq!(first.filter, SignalFilter::Rms);
        let second = frames.recv().await.unwrap();
        // At 6 Hz the 100 ms RMS window is one sample, so the envelope is |x|
        assert!((second.series[0].values[5] - 3.0).abs() < 1e-5);
        viewer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unbuildable_filter_is_reported() {
        let viewer = ViewerHandle::spawn(
            session(ViewMode::Individual),
            ScriptedSource::default(),
            Duration::from_millis(5),
            None,
        );
        // A 6 Hz stream cannot hold a 20-450 Hz band
        assert!(matches!(
            viewer.set_filter(SignalFilter::Bandpass).await,
            Err(RelayError::Filter(FilterError::BandOutOfRange { .. }))
        ));
        viewer.shutdown().await.unwrap();
    }
}
