use std::{
    io::Write,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use stream_engine::{
    AudioFormat, RestartPolicy, SoftDevice, SourceStream, StreamConfig, StreamError, Voice,
    VoiceState,
    device::{DeviceOp, ErrorCode},
    device_manager::{AudioSource, AudioSourceBufferKind},
};

fn config(buffers: usize) -> StreamConfig {
    StreamConfig::new(AudioFormat::mono16(8000))
        .with_buffer_count(buffers)
        .with_buffer_size(1000)
        .with_poll_interval(Duration::from_millis(2))
}

fn open(config: StreamConfig) -> (SoftDevice, Arc<Voice<SoftDevice>>, SourceStream<SoftDevice>) {
    let device = SoftDevice::new();
    let voice = Arc::new(Voice::new(device.clone()).unwrap());
    let stream = SourceStream::new(Arc::clone(&voice), config).unwrap();
    (device, voice, stream)
}

/// Completes one buffer every `interval` until `count` have been played.
fn spawn_player(
    device: &SoftDevice,
    voice: &Voice<SoftDevice>,
    count: usize,
    interval: Duration,
) -> thread::JoinHandle<()> {
    let device = device.clone();
    let id = voice.id();
    thread::spawn(move || {
        let mut done = 0;
        while done < count {
            thread::sleep(interval);
            done += device.complete_buffers(id, 1);
        }
    })
}

#[test]
fn third_write_blocks_until_a_buffer_is_played() {
    let (device, voice, mut stream) = open(config(2));
    stream.write(&[1; 1000]).unwrap();
    stream.write(&[2; 1000]).unwrap();
    assert_eq!(voice.queued_count().unwrap(), 2);

    let (tx, rx) = mpsc::channel();
    let writer = thread::spawn(move || {
        stream.write(&[3; 1000]).unwrap();
        tx.send(stream.samples_processed()).unwrap();
        stream
    });

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    device.complete_buffers(voice.id(), 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 500);

    let stream = writer.join().unwrap();
    assert_eq!(stream.depth(), 2);
    assert_eq!(voice.queued_count().unwrap(), 2);
}

#[test]
fn buffers_play_in_write_order() {
    let (device, voice, mut stream) = open(config(3));
    let player = spawn_player(&device, &voice, 6, Duration::from_millis(5));

    let mut seen = Vec::new();
    for tag in 1..=6u8 {
        stream.write(&[tag; 4]).unwrap();
        let queued = device.queued_buffers(voice.id());
        if let Some(last) = queued.last() {
            seen.push(device.buffer_contents(*last).unwrap()[0]);
        }
    }
    stream.drain().unwrap();
    player.join().unwrap();

    assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(stream.samples_processed(), 12);
    assert_eq!(stream.position().buffers_reclaimed(), 6);
}

#[test]
fn accounting_ignores_chunking() {
    let total = 4000;

    let (device, voice, mut coarse) = open(config(2));
    let player = spawn_player(&device, &voice, 4, Duration::from_millis(2));
    for _ in 0..4 {
        coarse.write(&vec![0; total / 4]).unwrap();
    }
    coarse.drain().unwrap();
    player.join().unwrap();

    let (device, voice, mut fine) = open(config(2));
    let player = spawn_player(&device, &voice, 40, Duration::from_millis(1));
    for _ in 0..40 {
        fine.write(&vec![0; total / 40]).unwrap();
    }
    fine.drain().unwrap();
    player.join().unwrap();

    assert_eq!(coarse.samples_processed(), 2000);
    assert_eq!(fine.samples_processed(), coarse.samples_processed());
}

#[test]
fn cancel_and_timeout_leave_stream_usable() {
    let (device, voice, mut stream) = open(config(1).with_timeout(Duration::from_millis(50)));
    stream.write(&[0; 8]).unwrap();

    assert!(matches!(stream.write(&[0; 8]), Err(StreamError::TimedOut(_))));

    let token = stream.cancel_token();
    token.cancel();
    assert!(matches!(stream.write(&[0; 8]), Err(StreamError::Interrupted)));
    token.reset();

    device.complete_buffers(voice.id(), 1);
    stream.write(&[0; 8]).unwrap();
    assert_eq!(stream.samples_processed(), 4);
    assert!(!stream.is_poisoned());
}

#[test]
fn cancel_reaches_io_writers() {
    let (_device, _voice, mut stream) = open(config(1));
    stream.write(&[0; 8]).unwrap();
    let token = stream.cancel_token();
    token.cancel();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let direct = stream.write_all(&[0; 8]).map_err(StreamError::from);
        let mut writer = stream.into_buffered();
        writer.write_all(&[0; 4]).unwrap();
        let drained = writer.drain();
        tx.send((direct, drained)).unwrap();
    });

    let (direct, drained) = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("cancelled writers return");
    assert!(matches!(direct, Err(StreamError::Interrupted)));
    assert!(matches!(drained, Err(StreamError::Interrupted)));
}

#[test]
fn underrun_restarts_without_replaying() {
    let (device, voice, mut stream) = open(config(3));
    stream.write(&[1; 4]).unwrap();
    device.complete_buffers(voice.id(), 1);
    assert_eq!(voice.state().unwrap(), VoiceState::Stopped);

    stream.write(&[2; 4]).unwrap();
    assert_eq!(voice.state().unwrap(), VoiceState::Playing);

    let mut out = [0.0f32; 4];
    let mut source = device.clone();
    source.fill_buffer(AudioSourceBufferKind::F32(&mut out), 4);
    // 0x0202 as a 16-bit sample, never 0x0101
    let expected = f32::from(0x0202i16) / 32768.0;
    assert!((out[0] - expected).abs() < 1e-4);
    assert_eq!(voice.state().unwrap(), VoiceState::Stopped);
}

#[test]
fn initial_only_needs_explicit_restart() {
    let (device, voice, mut stream) =
        open(config(2).with_restart_policy(RestartPolicy::InitialOnly));
    stream.write(&[1; 4]).unwrap();
    device.complete_buffers(voice.id(), 1);

    stream.write(&[2; 4]).unwrap();
    assert_eq!(voice.state().unwrap(), VoiceState::Stopped);

    voice.play().unwrap();
    // a native restart replays from the head of the queue
    assert_eq!(device.complete_buffers(voice.id(), 2), 2);
}

#[test]
fn device_fault_poisons_stream() {
    let (device, _voice, mut stream) = open(config(2));
    device.inject_fault(DeviceOp::BufferData, ErrorCode::OutOfMemory);

    let err = stream.write(&[0; 4]).unwrap_err();
    assert!(err.to_string().contains("0xa005"));
    assert!(matches!(stream.write(&[0; 4]), Err(StreamError::Poisoned)));
}

#[test]
fn shutdown_releases_everything() {
    let (device, voice, mut stream) = open(config(3));
    stream.write(&[0; 4]).unwrap();
    stream.write(&[0; 4]).unwrap();

    assert!(matches!(
        stream.close(),
        Err(StreamError::ResourceInUse { count: 2 })
    ));
    voice.close().unwrap();
    voice.close().unwrap();

    drop(stream);
    drop(voice);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_sources(), 0);
}

#[test]
fn buffered_writer_streams_a_clip() {
    let (device, voice, stream) = open(config(2).with_buffer_size(64));
    let mut writer = stream.into_buffered();
    let player = spawn_player(&device, &voice, 4, Duration::from_millis(3));

    for _ in 0..50 {
        writer.write_all(&[0; 4]).unwrap();
    }
    writer.drain().unwrap();
    player.join().unwrap();

    // 200 bytes as 64 + 64 + 64 + 8
    assert_eq!(writer.samples_processed(), 100);
    assert_eq!(writer.get_ref().position().buffers_reclaimed(), 4);
    writer.close().unwrap();
}
