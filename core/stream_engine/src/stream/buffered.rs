use std::io::{self, BufWriter, Write};

use crate::{
    device::AudioDevice,
    error::{Result, StreamError},
};

use super::SourceStream;

/// Coalesces small writes into chunks of at most `buffer_size` bytes before
/// they reach the ring, so a producer writing a few frames at a time does not
/// spend a device buffer per write.
///
/// Writes accumulate until the next one would not fit; the held bytes then go
/// out as one device buffer, which may be shorter than `buffer_size`. Writes
/// of at least `buffer_size` bytes bypass the buffer and become one device
/// buffer each. Whatever is held at the end waits for
/// [`BufferedSourceStream::flush`], [`BufferedSourceStream::drain`] or
/// [`BufferedSourceStream::into_inner`].
pub struct BufferedSourceStream<D: AudioDevice> {
    inner: BufWriter<SourceStream<D>>,
}

impl<D: AudioDevice> BufferedSourceStream<D> {
    pub fn new(stream: SourceStream<D>) -> Self {
        let capacity = stream.config().buffer_size;
        Self {
            inner: BufWriter::with_capacity(capacity, stream),
        }
    }

    pub fn get_ref(&self) -> &SourceStream<D> {
        self.inner.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut SourceStream<D> {
        self.inner.get_mut()
    }

    pub fn samples_processed(&self) -> u64 {
        self.get_ref().samples_processed()
    }

    /// Bytes held back waiting for a full chunk.
    pub fn pending(&self) -> usize {
        self.inner.buffer().len()
    }

    /// Sends the partial chunk, then waits for every queued buffer to play.
    pub fn drain(&mut self) -> Result<()> {
        self.inner.flush().map_err(StreamError::from_io)?;
        self.inner.get_mut().drain()
    }

    /// Flushes and hands back the underlying stream.
    pub fn into_inner(self) -> Result<SourceStream<D>> {
        self.inner
            .into_inner()
            .map_err(|err| StreamError::from_io(err.into_error()))
    }

    /// Flushes, drains and releases the ring.
    pub fn close(mut self) -> Result<()> {
        self.drain()?;
        let mut stream = self.into_inner()?;
        stream.close()
    }
}

impl<D: AudioDevice> Write for BufferedSourceStream<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<D: AudioDevice> std::fmt::Debug for BufferedSourceStream<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedSourceStream")
            .field("stream", self.get_ref())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, mpsc},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{
        config::StreamConfig, device::soft::SoftDevice, format::AudioFormat, voice::Voice,
    };

    fn buffered(count: usize, size: usize) -> (SoftDevice, Arc<Voice<SoftDevice>>, BufferedSourceStream<SoftDevice>) {
        let device = SoftDevice::new();
        let voice = Arc::new(Voice::new(device.clone()).unwrap());
        let config = StreamConfig::new(AudioFormat::mono16(8000))
            .with_buffer_count(count)
            .with_buffer_size(size)
            .with_poll_interval(Duration::from_millis(2));
        let stream = SourceStream::new(Arc::clone(&voice), config).unwrap();
        (device, voice, stream.into_buffered())
    }

    #[test]
    fn test_small_writes_coalesce_into_one_buffer() {
        let (device, voice, mut writer) = buffered(3, 8);

        for _ in 0..3 {
            writer.write_all(&[1, 2]).unwrap();
        }
        assert_eq!(writer.pending(), 6);
        assert_eq!(writer.get_ref().depth(), 0);

        writer.write_all(&[3, 4]).unwrap();
        writer.write_all(&[5, 6]).unwrap();
        assert_eq!(writer.get_ref().depth(), 1);
        assert_eq!(writer.pending(), 2);

        let queued = device.queued_buffers(voice.id());
        assert_eq!(
            device.buffer_contents(queued[0]),
            Some(vec![1, 2, 1, 2, 1, 2, 3, 4])
        );
    }

    #[test]
    fn test_write_that_does_not_fit_sends_held_bytes_first() {
        let (device, voice, mut writer) = buffered(3, 8);

        writer.write_all(&[1; 6]).unwrap();
        writer.write_all(&[2; 6]).unwrap();
        assert_eq!(writer.get_ref().depth(), 1);
        assert_eq!(writer.pending(), 6);

        let queued = device.queued_buffers(voice.id());
        assert_eq!(device.buffer_contents(queued[0]), Some(vec![1; 6]));
    }

    #[test]
    fn test_flush_sends_partial_chunk() {
        let (device, voice, mut writer) = buffered(3, 8);

        writer.write_all(&[7, 7]).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.pending(), 0);

        let queued = device.queued_buffers(voice.id());
        assert_eq!(device.buffer_contents(queued[0]), Some(vec![7, 7]));
    }

    #[test]
    fn test_drain_flushes_and_accounts_remainder() {
        let (device, voice, mut writer) = buffered(2, 8);
        writer.write_all(&[0; 12]).unwrap();

        let player = {
            let device = device.clone();
            let id = voice.id();
            thread::spawn(move || {
                for _ in 0..2 {
                    thread::sleep(Duration::from_millis(10));
                    device.complete_buffers(id, 1);
                }
            })
        };

        writer.drain().unwrap();
        player.join().unwrap();
        assert_eq!(writer.samples_processed(), 6);
        assert_eq!(writer.get_ref().depth(), 0);
    }

    #[test]
    fn test_cancelled_drain_returns_instead_of_retrying() {
        let (_device, _voice, mut writer) = buffered(1, 8);
        writer.write_all(&[0; 8]).unwrap();
        writer.write_all(&[0; 4]).unwrap();
        writer.get_ref().cancel_token().cancel();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = writer.drain();
            tx.send((result, writer.pending())).unwrap();
        });

        let (result, pending) = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("drain returns once cancelled");
        assert!(matches!(result, Err(StreamError::Interrupted)));
        // the unsent tail stays buffered for a later retry
        assert_eq!(pending, 4);
    }

    #[test]
    fn test_partial_frame_surfaces_through_io() {
        let (_device, _voice, mut writer) = buffered(2, 8);

        writer.write_all(&[1]).unwrap();
        let err = writer.flush().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(matches!(
            StreamError::from_io(err),
            StreamError::PartialFrame { len: 1, frame: 2 }
        ));
    }
}
