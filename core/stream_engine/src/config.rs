use std::time::Duration;

use crate::{
    constants::{
        DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_SAMPLE_RATE,
    },
    error::{Result, StreamError},
    format::AudioFormat,
};

/// What a stream does when it finds its voice not playing after queuing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Start playback once, on the first queued buffer. A voice that later
    /// stops on underrun stays stopped until the caller plays it.
    InitialOnly,
    /// Also restart a voice that stopped because it ran dry. Buffers it had
    /// already played are reclaimed first so they are not heard twice.
    /// A paused voice is left alone.
    #[default]
    ResumeAfterUnderrun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub format: AudioFormat,
    /// Buffers in the ring.
    pub buffer_count: usize,
    /// Coalescing size used by the buffered writer.
    pub buffer_size: usize,
    /// Sleep between processed-count queries while waiting for a free buffer.
    pub poll_interval: Duration,
    /// Give up waiting for a free buffer after this long. `None` waits forever.
    pub timeout: Option<Duration>,
    pub restart: RestartPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(AudioFormat::stereo16(DEFAULT_SAMPLE_RATE))
    }
}

impl StreamConfig {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            restart: RestartPolicy::default(),
        }
    }

    pub fn with_buffer_count(mut self, buffer_count: usize) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_restart_policy(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.format.layout()?;

        if self.buffer_count == 0 {
            return Err(StreamError::InvalidConfig(
                "buffer_count must be at least 1".into(),
            ));
        }

        let frame = self.format.bytes_per_frame();
        if self.buffer_size == 0 || self.buffer_size % frame != 0 {
            return Err(StreamError::InvalidConfig(format!(
                "buffer_size {} must be a positive multiple of the {frame}-byte frame",
                self.buffer_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.buffer_count, 3);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.timeout, None);
        assert_eq!(config.restart, RestartPolicy::ResumeAfterUnderrun);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = StreamConfig::new(AudioFormat::mono16(8000))
            .with_buffer_count(2)
            .with_buffer_size(1000)
            .with_poll_interval(Duration::from_millis(1))
            .with_timeout(Duration::from_secs(1))
            .with_restart_policy(RestartPolicy::InitialOnly);

        assert_eq!(config.buffer_count, 2);
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.restart, RestartPolicy::InitialOnly);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let format = AudioFormat::stereo16(44100);

        assert!(matches!(
            StreamConfig::new(format).with_buffer_count(0).validate(),
            Err(StreamError::InvalidConfig(_))
        ));
        assert!(matches!(
            StreamConfig::new(format).with_buffer_size(0).validate(),
            Err(StreamError::InvalidConfig(_))
        ));
        // 1022 is not a whole number of 4-byte frames
        assert!(matches!(
            StreamConfig::new(format).with_buffer_size(1022).validate(),
            Err(StreamError::InvalidConfig(_))
        ));
        assert!(matches!(
            StreamConfig::new(AudioFormat::new(44100, 2, 12)).validate(),
            Err(StreamError::UnsupportedFormat(_))
        ));
    }
}
