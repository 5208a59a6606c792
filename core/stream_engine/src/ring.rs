use crate::{
    buffer::Buffer,
    device::AudioDevice,
    error::{Result, StreamError},
};

/// Fixed pool of device buffers reused in FIFO order.
///
/// `head` is the next buffer to fill, `tail` the oldest one still queued.
/// `depth` is kept separately because `head == tail` means both "empty" and
/// "full".
#[derive(Debug)]
pub struct BufferRing<D: AudioDevice> {
    ring: Vec<Buffer<D>>,
    head: usize,
    tail: usize,
    depth: usize,
}

impl<D: AudioDevice> BufferRing<D> {
    /// Allocates `count` empty buffers. If any allocation fails, the buffers
    /// created so far are released before the error is returned.
    pub fn initialize(device: &D, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(StreamError::InvalidConfig(
                "Buffer ring needs at least one buffer".into(),
            ));
        }

        let mut ring = Vec::with_capacity(count);
        for _ in 0..count {
            // on error `ring` is dropped, deleting what was allocated
            ring.push(Buffer::new(device.clone())?);
        }

        Ok(Self {
            ring,
            head: 0,
            tail: 0,
            depth: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    /// Buffers currently queued to the voice.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_full(&self) -> bool {
        self.depth == self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Buffer to fill next, or `None` while every buffer is queued.
    pub fn current_fill_target(&mut self) -> Option<&mut Buffer<D>> {
        if self.is_full() {
            return None;
        }
        self.ring.get_mut(self.head)
    }

    /// Marks the head buffer as queued. The caller queues it first.
    pub fn advance_head(&mut self) {
        debug_assert!(!self.is_full(), "advanced head of a full ring");
        self.head = (self.head + 1) % self.ring.len();
        self.depth += 1;
    }

    /// Oldest queued buffer, or `None` when nothing is queued.
    pub fn oldest_queued(&self) -> Option<&Buffer<D>> {
        if self.is_empty() {
            return None;
        }
        self.ring.get(self.tail)
    }

    /// Marks the tail buffer as reclaimed. Only call once the voice has
    /// handed it back.
    pub fn advance_tail(&mut self) {
        debug_assert!(!self.is_empty(), "advanced tail of an empty ring");
        self.tail = (self.tail + 1) % self.ring.len();
        self.depth -= 1;
    }

    /// Deletes every buffer that is not already deleted. Buffers a voice still
    /// holds stay alive and are counted in the returned error.
    pub fn close(&mut self) -> Result<()> {
        let mut in_use = 0;
        for buffer in &mut self.ring {
            if let Err(err) = buffer.close() {
                log::debug!("{} not released: {err}", buffer.id());
                in_use += 1;
            }
        }

        if in_use > 0 {
            return Err(StreamError::ResourceInUse { count: in_use });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::{DeviceOp, ErrorCode, soft::SoftDevice},
        handle::BufferId,
    };

    fn head_id(ring: &mut BufferRing<SoftDevice>) -> BufferId {
        ring.current_fill_target().map(|b| b.id()).unwrap()
    }

    #[test]
    fn test_initialize_allocates_capacity() {
        let device = SoftDevice::new();
        let ring = BufferRing::initialize(&device, 3).unwrap();
        assert_eq!(ring.capacity(), 3);
        assert_eq!(ring.depth(), 0);
        assert!(ring.is_empty());
        assert_eq!(device.live_buffers(), 3);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let device = SoftDevice::new();
        assert!(matches!(
            BufferRing::initialize(&device, 0),
            Err(StreamError::InvalidConfig(_))
        ));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_failed_allocation_releases_partial_ring() {
        let device = SoftDevice::new();
        device.inject_fault_after(DeviceOp::GenBuffers, 2, ErrorCode::OutOfMemory);

        let result = BufferRing::initialize(&device, 4);
        assert!(matches!(
            result,
            Err(StreamError::Device {
                code: ErrorCode::OutOfMemory,
                ..
            })
        ));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_head_and_tail_wrap_in_fifo_order() {
        let device = SoftDevice::new();
        let mut ring = BufferRing::initialize(&device, 2).unwrap();

        let first = head_id(&mut ring);
        ring.advance_head();
        let second = head_id(&mut ring);
        ring.advance_head();

        assert!(ring.is_full());
        assert!(ring.current_fill_target().is_none());
        assert_eq!(ring.oldest_queued().map(Buffer::id), Some(first));

        ring.advance_tail();
        assert_eq!(ring.depth(), 1);
        assert_eq!(ring.oldest_queued().map(Buffer::id), Some(second));
        // the reclaimed slot is next to fill
        assert_eq!(head_id(&mut ring), first);
    }

    #[test]
    fn test_capacity_one_alternates_full_and_empty() {
        let device = SoftDevice::new();
        let mut ring = BufferRing::initialize(&device, 1).unwrap();
        let only = head_id(&mut ring);

        for _ in 0..3 {
            ring.advance_head();
            assert!(ring.is_full());
            assert_eq!(ring.oldest_queued().map(Buffer::id), Some(only));
            ring.advance_tail();
            assert!(ring.is_empty());
            assert!(ring.oldest_queued().is_none());
        }
    }

    #[test]
    fn test_close_releases_everything_once() {
        let device = SoftDevice::new();
        let mut ring = BufferRing::initialize(&device, 3).unwrap();

        ring.close().unwrap();
        ring.close().unwrap();
        assert_eq!(device.live_buffers(), 0);
    }
}
