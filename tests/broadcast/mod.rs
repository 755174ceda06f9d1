//! Broadcast server over real sockets

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use emg_relay::{BroadcastServer, FrameLayout, RelayError};

use crate::common::{eventually, options, ramp_recording, read_packet, start_server, SMALL};

fn expected_row(channel: usize, packet: usize, layout: FrameLayout) -> Vec<f32> {
    let start = packet * layout.samples_per_packet;
    (start..start + layout.samples_per_packet)
        .map(|t| (channel * 1000 + t) as f32)
        .collect()
}

#[tokio::test]
async fn test_each_client_starts_at_the_top() {
    // 6 samples at 600 Hz: one packet per 10 ms
    let handle = start_server(ramp_recording(SMALL, 5, 600.0), options(SMALL)).await;

    let mut first = TcpStream::connect(handle.local_addr()).await.unwrap();
    for packet in 0..3 {
        let received = read_packet(&mut first, SMALL).await;
        assert_eq!(received.channel(2).unwrap().to_vec(), expected_row(2, packet, SMALL));
    }

    let mut second = TcpStream::connect(handle.local_addr()).await.unwrap();
    let received = read_packet(&mut second, SMALL).await;
    assert_eq!(received.channel(0).unwrap().to_vec(), expected_row(0, 0, SMALL));
    assert_eq!(received.channel(3).unwrap().to_vec(), expected_row(3, 0, SMALL));

    // The first client carries on from where it was
    let received = read_packet(&mut first, SMALL).await;
    assert_eq!(received.channel(1).unwrap().to_vec(), expected_row(1, 3, SMALL));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stream_wraps_after_last_packet() {
    let layout = FrameLayout::new(2, 18);
    let handle = start_server(ramp_recording(layout, 2, 1800.0), options(layout)).await;
    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

    let p0 = read_packet(&mut client, layout).await;
    let p1 = read_packet(&mut client, layout).await;
    let p2 = read_packet(&mut client, layout).await;

    assert_eq!(p0.channel(0).unwrap().to_vec(), expected_row(0, 0, layout));
    assert_eq!(p1.channel(1).unwrap().to_vec(), expected_row(1, 1, layout));
    assert_eq!(p2, p0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_packets_are_paced_by_sampling_rate() {
    // 6 samples at 120 Hz: 50 ms per packet
    let handle = start_server(ramp_recording(SMALL, 10, 120.0), options(SMALL)).await;
    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();

    read_packet(&mut client, SMALL).await;
    let started = Instant::now();
    for _ in 0..4 {
        read_packet(&mut client, SMALL).await;
    }
    assert!(started.elapsed() >= Duration::from_millis(150), "{:?}", started.elapsed());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dropped_client_leaves_registry() {
    let handle = start_server(ramp_recording(SMALL, 5, 600.0), options(SMALL)).await;
    let registry = handle.registry();

    let mut staying = TcpStream::connect(handle.local_addr()).await.unwrap();
    let mut leaving = TcpStream::connect(handle.local_addr()).await.unwrap();
    read_packet(&mut staying, SMALL).await;
    read_packet(&mut leaving, SMALL).await;
    assert!(eventually(Duration::from_secs(2), || registry.len() == 2).await);

    drop(leaving);
    assert!(eventually(Duration::from_secs(3), || registry.len() == 1).await);

    // The other client is unaffected
    read_packet(&mut staying, SMALL).await;
    assert_eq!(registry.stats().total_accepted, 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_is_bounded_with_stalled_clients() {
    // Big packets sent fast so the socket buffers fill and writes block
    let layout = FrameLayout::new(32, 4096);
    let mut server_options = options(layout);
    // Only the stop signal may end these clients
    server_options.send_timeout = Duration::from_secs(30);
    let handle = start_server(ramp_recording(layout, 2, 4_096_000.0), server_options).await;

    let mut idle = Vec::new();
    for _ in 0..3 {
        idle.push(TcpStream::connect(handle.local_addr()).await.unwrap());
    }
    let registry = handle.registry();
    assert!(eventually(Duration::from_secs(2), || registry.len() == 3).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let handle = start_server(ramp_recording(SMALL, 1, 600.0), options(SMALL)).await;
    let addr = handle.local_addr().to_string();

    let result = BroadcastServer::bind(&addr, ramp_recording(SMALL, 1, 600.0), options(SMALL)).await;
    assert!(matches!(result, Err(RelayError::Bind { .. })));

    handle.shutdown().await.unwrap();
}
