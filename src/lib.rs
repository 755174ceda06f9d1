//! emg-relay: real-time EMG stream relay and viewer core
//!
//! A server replays a recorded multi-channel EMG session over TCP as fixed-size
//! packets, paced at the recording's own sampling rate. A viewer connects, keeps a
//! sliding window per selected channel and turns each tick into a display frame in
//! one of four modes: single channel, channel difference, magnitude spectrum or
//! several channels side by side.
//!
//! # Modules
//!
//! - [`frame`] - packet layout and the wire codec
//! - [`recording`] - on-disk recordings and their validated in-memory form
//! - [`stream`] - packetizer, connection registry and broadcast server
//! - [`viewer`] - sliding windows, view modes, sessions and the tick loop
//! - [`dsp`] - difference, axes and FFT magnitude spectra
//! - [`filters`] - band-pass and RMS envelope display filters
//!
//! # Example
//!
//! ```ignore
//! use emg_relay::{BroadcastOptions, BroadcastServer, FrameLayout, Recording};
//!
//! let recording = Recording::load("session.json".as_ref(), FrameLayout::default())?;
//! let server = BroadcastServer::bind("localhost:12345", recording, BroadcastOptions::default()).await?;
//! let handle = server.spawn();
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await?;
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod dsp;
pub mod error;
pub mod filters;
pub mod frame;
pub mod logging;
pub mod recording;
pub mod stream;
pub mod viewer;

// Re-export commonly used types
pub use config::RelayConfig;
pub use dsp::{difference, spectrum, LengthMismatch, Spectrum, SpectrumAnalyzer};
pub use error::{RelayError, Result};
pub use filters::{Bandpass, FilterError, FilterSettings, SignalFilter};
pub use frame::{ChannelFrameDecoder, DecodeError, FrameLayout, Packet};
pub use recording::{Recording, RecordingFile};
pub use stream::{BroadcastOptions, BroadcastServer, ConnectionRegistry, Packetizer, ServerHandle};
pub use viewer::{
    ConnectionStatus, SelectionError, SlidingWindowBuffer, TickOutcome, ViewFrame, ViewMode,
    ViewSession, ViewerHandle,
};
