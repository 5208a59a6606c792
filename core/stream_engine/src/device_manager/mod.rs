//! Hardware output: pulls mixed audio from an [`AudioSource`] on the output
//! device's own callback thread.

pub mod cpal_dm;

#[derive(Clone, Debug, thiserror::Error)]
pub enum AudioDeviceError {
    #[error("No default output device")]
    DeviceNotFound,
    #[error("Failed to build output stream: {0}")]
    StreamBuildFailed(String),
    #[error("Failed to start output stream: {0}")]
    StreamStartFailed(String),
    #[error("Unsupported output sample format '{0}'")]
    UnsupportedSampleFormat(String),
}

/// Interleaved output block handed to an [`AudioSource`], typed by what the
/// hardware stream was opened with.
#[derive(Debug)]
pub enum AudioSourceBufferKind<'a> {
    F32(&'a mut [f32]),
    I16(&'a mut [i16]),
    U16(&'a mut [u16]),
}

/// Something that can fill hardware output blocks.
pub trait AudioSource: Send {
    /// Fill `buffer` with `frame_size` interleaved frames.
    fn fill_buffer(&mut self, buffer: AudioSourceBufferKind<'_>, frame_size: usize);
}

pub trait AudioDeviceManager {
    fn start_output_stream(
        &mut self,
        audio_source: Box<dyn AudioSource>,
    ) -> Result<(), AudioDeviceError>;

    /// Stop pulling from the source and release the stream.
    fn stop(&mut self);
}
