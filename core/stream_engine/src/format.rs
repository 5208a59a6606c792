use std::fmt;

use crate::error::{Result, StreamError};

/// PCM layouts the device accepts. Anything else is rejected before a device
/// call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleLayout {
    Mono8,
    Stereo8,
    Mono16,
    Stereo16,
}

impl SampleLayout {
    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 => 1,
            Self::Stereo8 | Self::Stereo16 => 2,
        }
    }

    pub const fn bits_per_sample(self) -> u16 {
        match self {
            Self::Mono8 | Self::Stereo8 => 8,
            Self::Mono16 | Self::Stereo16 => 16,
        }
    }

    pub const fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    /// One sample per channel, interleaved left first.
    pub const fn bytes_per_frame(self) -> usize {
        self.bytes_per_sample() * self.channels() as usize
    }
}

/// Format shared by every buffer of one stream.
///
/// 8-bit data is unsigned (silence is `0x80`), 16-bit data is signed little
/// endian. Stereo frames are interleaved left first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    pub const fn mono16(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1, 16)
    }

    pub const fn stereo16(sample_rate: u32) -> Self {
        Self::new(sample_rate, 2, 16)
    }

    /// Maps the format onto a device layout.
    pub fn layout(&self) -> Result<SampleLayout> {
        if self.sample_rate == 0 {
            return Err(StreamError::UnsupportedFormat(*self));
        }

        match (self.channels, self.bits_per_sample) {
            (1, 8) => Ok(SampleLayout::Mono8),
            (2, 8) => Ok(SampleLayout::Stereo8),
            (1, 16) => Ok(SampleLayout::Mono16),
            (2, 16) => Ok(SampleLayout::Stereo16),
            _ => Err(StreamError::UnsupportedFormat(*self)),
        }
    }

    /// Size of one sample word. Position accounting divides buffer sizes by
    /// this, independent of the channel count.
    pub const fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    pub const fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Build a format from a WAV header. Only integer PCM maps.
    pub fn from_wav_spec(spec: hound::WavSpec) -> Result<Self> {
        let format = Self::new(spec.sample_rate, spec.channels, spec.bits_per_sample);
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(StreamError::UnsupportedFormat(format));
        }
        format.layout()?;
        Ok(format)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} channel(s), {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}
