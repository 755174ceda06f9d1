//! Common test utilities and fixtures for emg-relay integration tests
//!
//! This module provides:
//! - Synthetic recordings with recognisable per-channel values
//! - A helper that binds a server on an ephemeral loopback port
//! - Raw packet readers for the client side of a socket

#![allow(dead_code)]

use std::time::Duration;

use ndarray::Array2;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use emg_relay::{
    BroadcastOptions, BroadcastServer, ChannelFrameDecoder, FrameLayout, Packet, Recording,
    ServerHandle,
};

/// Small layout keeping packets readable in assertions
pub const SMALL: FrameLayout = FrameLayout::new(4, 6);

/// Channel `c` (0-based) at time `t` reads `c * 1000 + t`
pub fn ramp_recording(layout: FrameLayout, packets: usize, rate: f64) -> Recording {
    let samples = Array2::from_shape_fn(
        (layout.channels, layout.samples_per_packet * packets),
        |(c, t)| (c * 1000 + t) as f32,
    );
    Recording::from_samples(samples, rate, layout.samples_per_packet).unwrap()
}

/// Every sample of channel `c` (0-based) is `levels[c]`
pub fn constant_recording(layout: FrameLayout, levels: &[f32], packets: usize, rate: f64) -> Recording {
    let samples = Array2::from_shape_fn(
        (layout.channels, layout.samples_per_packet * packets),
        |(c, _)| levels.get(c).copied().unwrap_or(0.0),
    );
    Recording::from_samples(samples, rate, layout.samples_per_packet).unwrap()
}

pub fn options(layout: FrameLayout) -> BroadcastOptions {
    BroadcastOptions {
        layout,
        send_timeout: Duration::from_millis(300),
        shutdown_grace: Duration::from_millis(500),
        print_data: false,
    }
}

/// Bind on 127.0.0.1:0 and start serving
pub async fn start_server(recording: Recording, options: BroadcastOptions) -> ServerHandle {
    BroadcastServer::bind("127.0.0.1:0", recording, options)
        .await
        .unwrap()
        .spawn()
}

/// Read and decode exactly one packet
pub async fn read_packet(stream: &mut TcpStream, layout: FrameLayout) -> Packet {
    let mut buf = vec![0u8; layout.frame_len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("packet did not arrive in time")
        .unwrap();
    ChannelFrameDecoder::new(layout).decode(&buf).unwrap()
}

/// Poll `check` until it holds or `limit` passes
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
