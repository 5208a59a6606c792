//! Error types for the streaming engine

use std::{io, time::Duration};

use crate::{device::ErrorCode, format::AudioFormat, handle::BufferId};

#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// Sample size / channel combination the device cannot take
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(AudioFormat),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A device call latched an error code
    #[error("Device error during {op}: {code}")]
    Device { op: &'static str, code: ErrorCode },

    /// The backpressure wait was cancelled from outside
    #[error("Stream write interrupted while waiting for a free buffer")]
    Interrupted,

    #[error("Timed out after {0:?} waiting for a free buffer")]
    TimedOut(Duration),

    /// Buffers could not be released because a voice still holds them
    #[error("{count} buffer(s) still attached to a voice could not be released")]
    ResourceInUse { count: usize },

    /// The voice handed back a buffer the ring did not expect. Happens when
    /// something else queues to or unqueues from the same voice.
    #[error("Voice returned {actual} but the oldest queued buffer is {expected}")]
    BufferMismatch { expected: BufferId, actual: BufferId },

    /// Payload length is not a whole number of frames
    #[error("Payload of {len} bytes is not a whole number of {frame}-byte frames")]
    PartialFrame { len: usize, frame: usize },

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("Stream is unusable after an earlier failure")]
    Poisoned,

    #[error("Stream is closed")]
    Closed,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl StreamError {
    pub(crate) fn device(op: &'static str, code: ErrorCode) -> Self {
        Self::Device { op, code }
    }

    /// Errors after which the ring and the voice queue may disagree.
    pub(crate) fn poisons(&self) -> bool {
        matches!(self, Self::Device { .. } | Self::BufferMismatch { .. })
    }

    /// Recovers a stream error that went through an `io::Write` boundary.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(inner) => inner,
            Err(err) => Self::Io(err),
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        // `Interrupted` stays `Other`: std writers retry that kind, and a
        // cancelled token would fail every retry
        let kind = match err {
            StreamError::TimedOut(_) => io::ErrorKind::TimedOut,
            StreamError::UnsupportedFormat(_)
            | StreamError::InvalidConfig(_)
            | StreamError::PartialFrame { .. } => io::ErrorKind::InvalidInput,
            StreamError::Closed => io::ErrorKind::BrokenPipe,
            _ => io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;
