use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::{
    device::{AudioDevice, ErrorCode, checked},
    error::{Result, StreamError},
    format::AudioFormat,
    handle::BufferId,
};

/// One device buffer, released when dropped.
///
/// Contents are fixed from the moment the buffer is queued until the voice
/// reports it processed and it is unqueued; the device refuses to refill or
/// delete it in between.
pub struct Buffer<D: AudioDevice> {
    device: D,
    id: BufferId,
    closed: bool,
}

impl<D: AudioDevice> Buffer<D> {
    pub fn new(device: D) -> Result<Self> {
        let ids = checked(&device, "gen buffers", |d| d.gen_buffers(1))?;
        // a device that hands back nothing without latching is treated as out
        // of buffers
        let id = ids
            .first()
            .copied()
            .filter(|id| *id != BufferId::NONE)
            .ok_or_else(|| StreamError::device("gen buffers", ErrorCode::OutOfMemory))?;
        Ok(Self::from_id(device, id))
    }

    /// Takes ownership of an existing device buffer.
    pub fn from_id(device: D, id: BufferId) -> Self {
        Self {
            device,
            id,
            closed: false,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Replaces the contents with `payload`. The format must map to a device
    /// layout; this is checked before the device is touched.
    pub fn fill(&mut self, format: &AudioFormat, payload: &[u8]) -> Result<()> {
        let layout = format.layout()?;
        checked(&self.device, "buffer data", |d| {
            d.buffer_data(self.id, layout, payload, format.sample_rate);
        })
    }

    /// Current size in bytes, as the device sees it.
    pub fn size(&self) -> Result<usize> {
        checked(&self.device, "query buffer size", |d| d.buffer_size(self.id))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Deletes the buffer on the device.
    ///
    /// A buffer still queued on a live voice cannot be deleted; the error is
    /// returned and the buffer stays open, so a later close (or drop) tries
    /// again. Once deleted, further calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        checked(&self.device, "delete buffers", |d| d.delete_buffers(&[self.id]))?;
        self.closed = true;
        log::trace!("{} deleted", self.id);
        Ok(())
    }
}

impl<D: AudioDevice> Drop for Buffer<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("Leaking {}: {err}", self.id);
        }
    }
}

impl<D: AudioDevice> PartialEq for Buffer<D> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<D: AudioDevice> Eq for Buffer<D> {}

impl<D: AudioDevice> Hash for Buffer<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<D: AudioDevice> fmt::Debug for Buffer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
