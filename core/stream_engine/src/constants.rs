use std::time::Duration;

/// Buffers cycled by a stream when the caller does not say otherwise.
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Bytes per streaming buffer when the caller does not say otherwise.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Sleep between processed-count queries while a full ring waits for the device.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Tolerance for comparing rendered float samples in tests.
pub const AUDIO_SAMPLE_EPSILON: f32 = 1e-4;
