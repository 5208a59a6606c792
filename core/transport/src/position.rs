use std::time::Duration;

/// Running count of samples the device has finished playing.
///
/// Fed once per reclaimed buffer, so the total is independent of how the
/// producer chose to chunk its writes. A "sample" here is one sample word
/// (`bits_per_sample / 8` bytes), not one frame: a stereo buffer contributes
/// one sample per channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    samples_processed: u64,
    buffers_reclaimed: u64,
}

impl PlaybackPosition {
    pub const fn new() -> Self {
        Self {
            samples_processed: 0,
            buffers_reclaimed: 0,
        }
    }

    /// Account one reclaimed buffer of `byte_size` bytes.
    ///
    /// Returns the number of samples added. A `bytes_per_sample` of zero adds
    /// nothing.
    pub fn record(&mut self, byte_size: usize, bytes_per_sample: usize) -> u64 {
        let added = byte_size.checked_div(bytes_per_sample).unwrap_or(0) as u64;
        self.samples_processed = self.samples_processed.saturating_add(added);
        self.buffers_reclaimed += 1;
        added
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    pub fn buffers_reclaimed(&self) -> u64 {
        self.buffers_reclaimed
    }

    /// Frames played, given the stream's channel count.
    pub fn frames(&self, channels: u16) -> u64 {
        if channels == 0 {
            return 0;
        }
        self.samples_processed / u64::from(channels)
    }

    /// Wall-clock time the played samples represent.
    pub fn elapsed(&self, sample_rate: u32, channels: u16) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.frames(channels);
        let rate = u64::from(sample_rate);
        let secs = frames / rate;
        let nanos = (frames % rate) * 1_000_000_000 / rate;
        Duration::new(secs, nanos as u32)
    }
}
