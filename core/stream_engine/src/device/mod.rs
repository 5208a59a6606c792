//! The native buffer-queue call surface the engine drives.
//!
//! Every call follows the device convention of a sticky error latch: a failing
//! call records an [`ErrorCode`] and returns a neutral value, and
//! [`AudioDevice::take_error`] reports and clears it. Engine code never calls
//! the trait directly; it goes through [`checked`], which clears the latch
//! before the call and reads it after, so a stale error can never be blamed
//! on an unrelated call.

use std::fmt;

use crate::{
    error::{Result, StreamError},
    format::SampleLayout,
    handle::{BufferId, SourceId},
    voice::VoiceState,
};

pub mod soft;

/// Error codes a device may latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidName,
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    OutOfMemory,
}

impl ErrorCode {
    pub const fn code(self) -> u32 {
        match self {
            Self::InvalidName => 0xA001,
            Self::InvalidEnum => 0xA002,
            Self::InvalidValue => 0xA003,
            Self::InvalidOperation => 0xA004,
            Self::OutOfMemory => 0xA005,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidName => "Invalid Name",
            Self::InvalidEnum => "Invalid Enum",
            Self::InvalidValue => "Invalid Value",
            Self::InvalidOperation => "Invalid Operation",
            Self::OutOfMemory => "Out of Memory",
        }
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0xA001 => Some(Self::InvalidName),
            0xA002 => Some(Self::InvalidEnum),
            0xA003 => Some(Self::InvalidValue),
            0xA004 => Some(Self::InvalidOperation),
            0xA005 => Some(Self::OutOfMemory),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} ({})", self.code(), self.message())
    }
}

/// Calls of the device surface, used to name a call when arming faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    GenBuffers,
    DeleteBuffers,
    BufferData,
    GenSource,
    DeleteSource,
    QueueBuffers,
    UnqueueBuffers,
    Query,
    Play,
    Pause,
    Stop,
    Rewind,
}

/// Buffer-queue playback device.
///
/// Handles are cheap to clone and all clones talk to the same device. Calls
/// take `&self`; the device serialises them internally, since its own
/// playback thread mutates the same state.
pub trait AudioDevice: Clone + Send + Sync + fmt::Debug {
    /// Create `n` empty buffers.
    fn gen_buffers(&self, n: usize) -> Vec<BufferId>;
    /// Delete buffers. Fails without deleting anything if one is queued.
    fn delete_buffers(&self, ids: &[BufferId]);
    /// Replace a buffer's contents. Fails if the buffer is queued.
    fn buffer_data(&self, id: BufferId, layout: SampleLayout, data: &[u8], sample_rate: u32);
    /// Size in bytes of the buffer's current contents.
    fn buffer_size(&self, id: BufferId) -> usize;

    fn gen_source(&self) -> SourceId;
    fn delete_source(&self, id: SourceId);

    /// Append buffers to the voice's queue, in order.
    fn queue_buffers(&self, source: SourceId, ids: &[BufferId]);
    /// Remove the `n` oldest buffers, which must all be processed. Returns
    /// their ids oldest first.
    fn unqueue_buffers(&self, source: SourceId, n: usize) -> Vec<BufferId>;

    fn buffers_queued(&self, source: SourceId) -> usize;
    fn buffers_processed(&self, source: SourceId) -> usize;
    fn source_state(&self, source: SourceId) -> VoiceState;

    fn play(&self, source: SourceId);
    fn pause(&self, source: SourceId);
    fn stop(&self, source: SourceId);
    fn rewind(&self, source: SourceId);

    /// Report and clear the latched error.
    fn take_error(&self) -> Option<ErrorCode>;
}

/// Run one device call with the error latch cleared before and checked after.
pub fn checked<D, T, F>(device: &D, op: &'static str, call: F) -> Result<T>
where
    D: AudioDevice,
    F: FnOnce(&D) -> T,
{
    if let Some(stale) = device.take_error() {
        log::trace!("Discarding stale device error {stale} before {op}");
    }

    let value = call(device);

    match device.take_error() {
        Some(code) => Err(StreamError::device(op, code)),
        None => Ok(value),
    }
}
