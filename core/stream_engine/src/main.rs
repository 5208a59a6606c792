use std::{
    env,
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use stream_engine::{
    SoftDevice, SourceStream, StreamConfig, StreamError, Voice,
    device_manager::{AudioDeviceManager, cpal_dm::CpalAudioDeviceManager},
    wav::PcmClip,
};

const USAGE: &str = "usage: stream_engine <file.wav> [buffer_count] [buffer_size]";

/// Producer-side write size, kept small so the buffered writer has something
/// to coalesce.
const PRODUCER_CHUNK: usize = 256;

/// Tick of the stand-in clock used when no output device is available.
const SOFT_CLOCK_TICK: Duration = Duration::from_millis(10);

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("Streaming failed: {e}");
        std::process::exit(1);
    }
}

fn parse_arg(args: &[String], index: usize, default: usize) -> Result<usize, StreamError> {
    args.get(index).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|_| StreamError::InvalidConfig(format!("'{raw}' is not a number. {USAGE}")))
    })
}

fn run() -> Result<(), StreamError> {
    let args: Vec<String> = env::args().skip(1).collect();
    let path = args
        .first()
        .ok_or_else(|| StreamError::InvalidConfig(USAGE.into()))?;

    let clip = PcmClip::from_file(path)?;
    let defaults = StreamConfig::new(clip.format());
    let config = defaults
        .with_buffer_count(parse_arg(&args, 1, defaults.buffer_count)?)
        .with_buffer_size(parse_arg(&args, 2, defaults.buffer_size)?);

    let device = SoftDevice::new();
    let mut manager = CpalAudioDeviceManager::new();
    let soft_clock = match manager.start_output_stream(Box::new(device.clone())) {
        Ok(()) => {
            log::info!("Audio stream started");
            None
        }
        Err(e) => {
            log::warn!("No hardware output ({e}), playing against a soft clock");
            Some(spawn_soft_clock(device.clone(), clip.format().sample_rate))
        }
    };

    let voice = Arc::new(Voice::new(device.clone())?);
    let mut writer = SourceStream::new(Arc::clone(&voice), config)?.into_buffered();

    log::info!(
        "Streaming {} ({}, {:?})",
        clip.name(),
        clip.format(),
        clip.duration()
    );
    for chunk in clip.data().chunks(PRODUCER_CHUNK) {
        writer.write_all(chunk)?;
    }
    writer.drain()?;

    let played = writer.get_ref().elapsed();
    log::info!(
        "Played {} samples ({played:?})",
        writer.samples_processed()
    );
    writer.close()?;
    voice.close()?;

    manager.stop();
    if let Some((running, handle)) = soft_clock {
        running.store(false, Ordering::Release);
        if handle.join().is_err() {
            log::warn!("Soft clock thread panicked");
        }
    }
    Ok(())
}

/// Renders the soft device in real time without a sound card, so queued
/// buffers still complete at the clip's rate.
fn spawn_soft_clock(device: SoftDevice, sample_rate: u32) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
    let running = Arc::new(AtomicBool::new(true));
    let frames_per_tick = (u128::from(sample_rate) * SOFT_CLOCK_TICK.as_millis() / 1000) as usize;

    let handle = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut frames = vec![(0.0f32, 0.0f32); frames_per_tick.max(1)];
            while running.load(Ordering::Acquire) {
                frames.fill((0.0, 0.0));
                device.render(&mut frames);
                thread::sleep(SOFT_CLOCK_TICK);
            }
        })
    };
    (running, handle)
}
