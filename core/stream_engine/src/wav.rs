use std::{io::Read, path::Path};

use hound::WavReader;
use transport::position::PlaybackPosition;

use crate::{error::Result, format::AudioFormat};

/// Interleaved PCM loaded from a `.wav` file, already in the byte layout the
/// device expects.
///
/// Supports mono and stereo integer files at 8 or 16 bits. 8-bit samples are
/// stored unsigned (silence at 128) and 16-bit samples little-endian signed.
/// Anything else is rejected as [`crate::error::StreamError::UnsupportedFormat`].
///
/// # Example
/// ```no_run
/// use stream_engine::wav::PcmClip;
///
/// let clip = PcmClip::from_file("assets/wav/piano.wav").unwrap();
/// for chunk in clip.chunks(4096) {
///     // write each chunk to a stream
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmClip {
    name: String,
    format: AudioFormat,
    data: Vec<u8>,
}

impl PcmClip {
    fn from_reader<R: Read>(reader: WavReader<R>, name: &str) -> Result<Self> {
        let format = AudioFormat::from_wav_spec(reader.spec())?;
        let data = Self::encode_pcm(reader, format)?;

        log::debug!("Loaded {name}: {format}, {} bytes", data.len());
        Ok(Self {
            name: name.to_owned(),
            format,
            data,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clip.wav")
            .to_owned();
        let reader = WavReader::open(path)?;
        Self::from_reader(reader, &name)
    }

    pub fn from_stream<R: Read>(stream: R) -> Result<Self> {
        let reader = WavReader::new(stream)?;
        Self::from_reader(reader, "stream")
    }

    fn encode_pcm<R: Read>(reader: WavReader<R>, format: AudioFormat) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(reader.len() as usize * format.bytes_per_sample());

        if format.bits_per_sample == 8 {
            for sample in reader.into_samples::<i8>() {
                // hound hands 8-bit samples back signed
                data.push(sample?.cast_unsigned() ^ 0x80);
            }
        } else {
            for sample in reader.into_samples::<i16>() {
                data.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        Ok(data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payloads of at most `size` bytes, rounded down to whole frames. The
    /// last one may be shorter.
    pub fn chunks(&self, size: usize) -> std::slice::Chunks<'_, u8> {
        let frame = self.format.bytes_per_frame().max(1);
        let size = (size / frame).max(1) * frame;
        self.data.chunks(size)
    }

    /// Playing time of the whole clip.
    pub fn duration(&self) -> std::time::Duration {
        let mut position = PlaybackPosition::new();
        position.record(self.data.len(), self.format.bytes_per_sample());
        position.elapsed(self.format.sample_rate, self.format.channels)
    }
}
