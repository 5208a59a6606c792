use std::fmt;

use parking_lot::Mutex;

use crate::{
    buffer::Buffer,
    device::{AudioDevice, checked},
    error::Result,
    handle::{BufferId, SourceId},
};

/// Play state as reported by the device. A playing voice drops to `Stopped`
/// on its own when it runs out of queued buffers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A device playback voice with a FIFO buffer queue.
///
/// Counts and state are queried from the device on every call, never cached:
/// the device changes them from its own thread.
pub struct Voice<D: AudioDevice> {
    device: D,
    id: SourceId,
    closed: Mutex<bool>,
}

impl<D: AudioDevice> Voice<D> {
    pub fn new(device: D) -> Result<Self> {
        let id = checked(&device, "gen source", D::gen_source)?;
        log::debug!("{id} created");

        Ok(Self {
            device,
            id,
            closed: Mutex::new(false),
        })
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn queued_count(&self) -> Result<usize> {
        checked(&self.device, "query queued buffers", |d| {
            d.buffers_queued(self.id)
        })
    }

    pub fn processed_count(&self) -> Result<usize> {
        checked(&self.device, "query processed buffers", |d| {
            d.buffers_processed(self.id)
        })
    }

    pub fn state(&self) -> Result<VoiceState> {
        checked(&self.device, "query source state", |d| {
            d.source_state(self.id)
        })
    }

    pub fn play(&self) -> Result<()> {
        checked(&self.device, "play", |d| d.play(self.id))
    }

    pub fn pause(&self) -> Result<()> {
        checked(&self.device, "pause", |d| d.pause(self.id))
    }

    pub fn stop(&self) -> Result<()> {
        checked(&self.device, "stop", |d| d.stop(self.id))
    }

    pub fn rewind(&self) -> Result<()> {
        checked(&self.device, "rewind", |d| d.rewind(self.id))
    }

    pub fn queue_buffer(&self, buffer: &Buffer<D>) -> Result<()> {
        self.queue_buffers(&[buffer.id()])
    }

    pub fn queue_buffers(&self, ids: &[BufferId]) -> Result<()> {
        checked(&self.device, "queue buffers", |d| {
            d.queue_buffers(self.id, ids);
        })
    }

    /// Removes the oldest processed buffer and returns its id.
    pub fn unqueue_buffer(&self) -> Result<BufferId> {
        let ids = self.unqueue_buffers(1)?;
        Ok(ids.first().copied().unwrap_or(BufferId::NONE))
    }

    pub fn unqueue_buffers(&self, n: usize) -> Result<Vec<BufferId>> {
        checked(&self.device, "unqueue buffers", |d| {
            d.unqueue_buffers(self.id, n)
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Stops the voice, detaches whatever is still queued and deletes it on
    /// the device.
    ///
    /// The voice only counts as closed once the source is deleted; after a
    /// failure a later close (or drop) runs the whole sequence again. Once
    /// closed, further calls do nothing.
    pub fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        if *closed {
            return Ok(());
        }

        self.stop()?;
        let queued = self.queued_count()?;
        if queued > 0 {
            let detached = self.unqueue_buffers(queued)?;
            log::debug!("{} detached {} buffer(s) on close", self.id, detached.len());
        }
        checked(&self.device, "delete source", |d| d.delete_source(self.id))?;
        *closed = true;
        log::debug!("{} closed", self.id);
        Ok(())
    }
}

impl<D: AudioDevice> Drop for Voice<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("Failed to close {}: {err}", self.id);
        }
    }
}

impl<D: AudioDevice> PartialEq for Voice<D> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<D: AudioDevice> Eq for Voice<D> {}

impl<D: AudioDevice> fmt::Debug for Voice<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
