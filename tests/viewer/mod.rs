//! Viewer driven by real servers and scripted sources

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

use emg_relay::commands::synth::synthesize;
use emg_relay::viewer::{
    Delivery, ScriptedSource, SeriesLabel, StreamPacketSource, TcpPacketSource, WindowSpec,
};
use emg_relay::{
    ConnectionStatus, FrameLayout, Packetizer, RelayError, ViewFrame, ViewMode, ViewSession,
    ViewerHandle,
};

use crate::common::{constant_recording, options, start_server};

const TICK: Duration = Duration::from_millis(15);

fn window(capacity: usize) -> WindowSpec {
    WindowSpec {
        capacity,
        window_seconds: 1.0,
        sampling_rate_hz: capacity as f64,
    }
}

async fn next_frame(frames: &mut broadcast::Receiver<ViewFrame>) -> ViewFrame {
    tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("no frame in time")
        .unwrap()
}

fn drain(frames: &mut broadcast::Receiver<ViewFrame>) {
    while frames.try_recv().is_ok() {}
}

async fn connect_viewer(
    addr: std::net::SocketAddr,
    layout: FrameLayout,
    capacity: usize,
    mode: ViewMode,
) -> ViewerHandle {
    let source = TcpPacketSource::connect(&addr.to_string(), layout, Duration::from_millis(200))
        .await
        .unwrap();
    let peer = source.peer_addr();
    ViewerHandle::spawn(ViewSession::new(layout, window(capacity), mode), source, TICK, peer)
}

#[tokio::test]
async fn test_differential_pair_over_tcp() {
    let layout = FrameLayout::default();
    let mut levels = vec![0.0f32; 32];
    levels[2] = 1.0; // channel 3
    levels[6] = 0.5; // channel 7
    let server = start_server(constant_recording(layout, &levels, 4, 1800.0), options(layout)).await;

    let viewer = connect_viewer(server.local_addr(), layout, 90, ViewMode::Differential).await;
    assert!(matches!(viewer.status(), ConnectionStatus::Connected { peer: Some(_) }));
    let mut frames = viewer.subscribe();
    viewer.set_selection(vec![3, 7]).await.unwrap();
    viewer.start().await.unwrap();

    let first = next_frame(&mut frames).await;
    assert_eq!(first.mode, ViewMode::Differential);
    assert_eq!(first.axis.len(), 90);
    let values = &first.series[0].values;
    assert_eq!(values.len(), 90);
    assert!(values[..72].iter().all(|&v| v == 0.0));
    assert!(values[72..].iter().all(|&v| v == 0.5));

    let second = next_frame(&mut frames).await;
    assert!(second.series[0].values[54..].iter().all(|&v| v == 0.5));
    assert!(second.sequence > first.sequence);

    viewer.shutdown().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mode_switch_discards_old_buffers() {
    let layout = FrameLayout::new(8, 18);
    let levels: Vec<f32> = (1..=8).map(|c| c as f32 * 10.0).collect();
    let server = start_server(constant_recording(layout, &levels, 4, 1800.0), options(layout)).await;

    let viewer = connect_viewer(server.local_addr(), layout, 72, ViewMode::Individual).await;
    let mut frames = viewer.subscribe();
    viewer.select(5).await.unwrap();
    viewer.start().await.unwrap();
    let individual = next_frame(&mut frames).await;
    assert_eq!(*individual.series[0].values.last().unwrap(), 50.0);

    viewer.set_mode(ViewMode::MultiChannel).await.unwrap();
    viewer.set_selection(vec![1, 2, 3]).await.unwrap();
    let mut frames = viewer.subscribe();

    let multi = next_frame(&mut frames).await;
    assert_eq!(multi.mode, ViewMode::MultiChannel);
    let channels: Vec<usize> = multi
        .series
        .iter()
        .map(|s| match s.label {
            SeriesLabel::Channel { channel } => channel.number(),
            other => panic!("unexpected label {:?}", other),
        })
        .collect();
    assert_eq!(channels, vec![1, 2, 3]);
    for (series, level) in multi.series.iter().zip([10.0, 20.0, 30.0]) {
        // Only zeros or this channel's own samples; nothing left over from channel 5
        assert!(series.values.iter().all(|&v| v == 0.0 || v == level));
        assert_eq!(*series.values.last().unwrap(), level);
        assert_eq!(series.values[0], 0.0);
    }

    viewer.shutdown().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_no_frames_after_stop() {
    let layout = FrameLayout::new(4, 6);
    let server = start_server(constant_recording(layout, &[1.0; 4], 4, 600.0), options(layout)).await;

    let viewer = connect_viewer(server.local_addr(), layout, 60, ViewMode::Individual).await;
    let mut frames = viewer.subscribe();
    viewer.select(1).await.unwrap();
    viewer.start().await.unwrap();
    next_frame(&mut frames).await;

    viewer.stop().await.unwrap();
    drain(&mut frames);
    let late = tokio::time::timeout(TICK * 10, frames.recv()).await;
    assert!(late.is_err(), "frame emitted after stop");

    // Restarting begins again from an empty window
    viewer.start().await.unwrap();
    let restarted = next_frame(&mut frames).await;
    assert_eq!(restarted.series[0].values.iter().filter(|&&v| v != 0.0).count(), 6);
    assert_eq!(viewer.status(), ConnectionStatus::Connected { peer: Some(server.local_addr()) });

    viewer.shutdown().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_shutdown_disconnects_viewer() {
    let layout = FrameLayout::new(4, 6);
    let server = start_server(constant_recording(layout, &[2.0; 4], 4, 600.0), options(layout)).await;

    let viewer = connect_viewer(server.local_addr(), layout, 60, ViewMode::Individual).await;
    let mut status = viewer.status_changes();
    viewer.select(2).await.unwrap();
    viewer.start().await.unwrap();

    server.shutdown().await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == ConnectionStatus::Disconnected),
    )
    .await
    .expect("viewer never saw the disconnect")
    .unwrap();
    assert!(matches!(viewer.select(3).await, Err(RelayError::ViewerClosed)));
    viewer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_short_read_fails_one_tick_only() {
    let layout = FrameLayout::new(4, 6);
    let full = |level: f32| {
        let samples = ndarray::Array2::from_elem((4, 6), level);
        Delivery::Data(emg_relay::Packet::new(samples).encode())
    };
    let short = Delivery::Data(Bytes::from(vec![0u8; layout.frame_len() - 10]));
    let source = ScriptedSource::new([full(1.0), short, full(2.0)]);

    let mut session = ViewSession::new(layout, window(24), ViewMode::Individual);
    session.select(1).unwrap();
    let viewer = ViewerHandle::spawn(session, source, TICK, None);
    let mut frames = viewer.subscribe();
    viewer.start().await.unwrap();

    let first = next_frame(&mut frames).await;
    let second = next_frame(&mut frames).await;
    assert_eq!(second.sequence, first.sequence + 1);

    let mut expected = vec![0.0; 12];
    expected.extend([1.0; 6]);
    expected.extend([2.0; 6]);
    assert_eq!(second.series[0].values, expected);

    viewer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_packet_keeps_framing() {
    let layout = FrameLayout::new(2, 4);
    let (mut tx, rx) = tokio::io::duplex(4096);
    let source = StreamPacketSource::new(rx, layout, Duration::from_millis(20));

    let mut session = ViewSession::new(layout, window(8), ViewMode::MultiChannel);
    session.set_selection(&[1, 2]).unwrap();
    let viewer = ViewerHandle::spawn(session, source, TICK, None);
    let mut frames = viewer.subscribe();
    viewer.start().await.unwrap();

    let bytes = emg_relay::Packet::new(ndarray::Array2::from_shape_fn((2, 4), |(c, t)| {
        (c * 10 + t) as f32
    }))
    .encode();
    // Half a packet, a few timed-out ticks, then the rest
    tx.write_all(&bytes[..12]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.write_all(&bytes[12..]).await.unwrap();

    let frame = next_frame(&mut frames).await;
    assert_eq!(frame.series[0].values, vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    assert_eq!(frame.series[1].values, vec![0.0, 0.0, 0.0, 0.0, 10.0, 11.0, 12.0, 13.0]);

    viewer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_frequency_view_finds_tone() {
    // 256 Hz recording, 256-sample window: bin k is k Hz; channel 1 carries 20 Hz
    let layout = FrameLayout::new(4, 32);
    let recording = Arc::new(synthesize(4, 2.0, 256.0, 32, 7).unwrap());
    let mut packetizer = Packetizer::new(recording, 32);
    let script: Vec<Delivery> = (0..8)
        .map(|_| Delivery::Data(packetizer.next_packet().encode()))
        .collect();

    let mut session = ViewSession::new(
        layout,
        WindowSpec {
            capacity: 256,
            window_seconds: 1.0,
            sampling_rate_hz: 256.0,
        },
        ViewMode::Frequency,
    );
    session.select(1).unwrap();
    let viewer = ViewerHandle::spawn(session, ScriptedSource::new(script), Duration::from_millis(2), None);
    let mut frames = viewer.subscribe();
    viewer.start().await.unwrap();

    let mut last = next_frame(&mut frames).await;
    for _ in 1..8 {
        last = next_frame(&mut frames).await;
    }
    assert_eq!(last.axis.len(), 128);
    let peak = last.series[0]
        .values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(last.axis[peak], 20.0);
    assert!((last.series[0].values[peak] - 1.0).abs() < 0.1);

    viewer.shutdown().await.unwrap();
}
