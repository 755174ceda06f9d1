//! Recording files on disk feeding the packetizer

use std::fs;
use std::sync::Arc;

use ndarray::{Array2, Array3};
use tempfile::TempDir;

use emg_relay::recording::DeviceInformation;
use emg_relay::{FrameLayout, Packetizer, Recording, RecordingFile, RelayError};

/// `[channels, 18, windows]` where channel c, window w, offset i reads `c * 1000 + w * 18 + i`
fn windowed(channels: usize, windows: usize, rate: Option<f64>) -> RecordingFile {
    RecordingFile {
        biosignal: Array3::from_shape_fn((channels, 18, windows), |(c, i, w)| {
            (c * 1000 + w * 18 + i) as f32
        }),
        device_information: DeviceInformation {
            sampling_frequency: rate,
        },
    }
}

#[test]
fn test_json_file_streams_in_time_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    windowed(34, 3, Some(2048.0)).write(&path).unwrap();

    let recording = Recording::load(&path, FrameLayout::default()).unwrap();
    // Extra channels beyond the stream's 32 are ignored
    assert_eq!(recording.channel_count(), 32);
    assert_eq!(recording.sample_count(), 54);

    let mut packetizer = Packetizer::new(Arc::new(recording), 18);
    for window in 0..3 {
        let packet = packetizer.next_packet();
        let expected: Vec<f32> = (0..18).map(|i| (31 * 1000 + window * 18 + i) as f32).collect();
        assert_eq!(packet.channel(31).unwrap().to_vec(), expected);
    }
    assert_eq!(packetizer.cursor(), 0);
}

#[test]
fn test_bincode_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.bin");
    let samples = Array2::from_shape_fn((32, 36), |(c, t)| (c + t) as f32 * 0.25);
    let recording = Recording::from_samples(samples.clone(), 512.0, 18).unwrap();
    recording.to_file(18).unwrap().write(&path).unwrap();

    let loaded = Recording::load(&path, FrameLayout::default()).unwrap();
    assert_eq!(loaded.samples(), &samples);
    assert_eq!(loaded.sampling_rate_hz(), 512.0);
}

#[test]
fn test_missing_sampling_frequency_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no_rate.json");
    windowed(32, 2, None).write(&path).unwrap();

    let err = Recording::load(&path, FrameLayout::default()).unwrap_err();
    assert!(matches!(err, RelayError::MissingSamplingRate));
    assert!(err.is_recording_error());
}

#[test]
fn test_too_few_channels_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("narrow.json");
    windowed(8, 2, Some(2048.0)).write(&path).unwrap();

    assert!(matches!(
        Recording::load(&path, FrameLayout::default()),
        Err(RelayError::RecordingShape { .. })
    ));
}

#[test]
fn test_corrupt_and_missing_files() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("garbage.json");
    fs::write(&garbage, "{ not json").unwrap();

    assert!(matches!(
        Recording::load(&garbage, FrameLayout::default()),
        Err(RelayError::RecordingCorrupt { .. })
    ));
    assert!(matches!(
        Recording::load(&dir.path().join("absent.json"), FrameLayout::default()),
        Err(RelayError::RecordingNotFound { .. })
    ));
}
