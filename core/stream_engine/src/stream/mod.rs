//! Producer-facing streaming writer.
//!
//! A [`SourceStream`] turns a sequence of byte chunks into a steady queue of
//! device buffers on one [`Voice`]. Each `write` fills exactly one ring buffer
//! and queues it; when every buffer is already queued the call blocks until
//! the voice reports one processed, reclaims it, and reuses it.

use std::{io, sync::Arc, time::Duration};

use transport::position::PlaybackPosition;

use crate::{
    buffer::Buffer,
    config::{RestartPolicy, StreamConfig},
    device::AudioDevice,
    error::{Result, StreamError},
    format::AudioFormat,
    ring::BufferRing,
    voice::{Voice, VoiceState},
};

pub mod buffered;
pub mod wait;

pub use buffered::BufferedSourceStream;
pub use wait::CancelToken;

use wait::Backpressure;

pub struct SourceStream<D: AudioDevice> {
    voice: Arc<Voice<D>>,
    ring: BufferRing<D>,
    config: StreamConfig,
    position: PlaybackPosition,
    cancel: CancelToken,
    poisoned: bool,
    closed: bool,
}

impl<D: AudioDevice> SourceStream<D> {
    /// Allocates the buffer ring on the voice's device. The format is checked
    /// before any device call.
    pub fn new(voice: Arc<Voice<D>>, config: StreamConfig) -> Result<Self> {
        config.validate()?;
        let ring = BufferRing::initialize(voice.device(), config.buffer_count)?;

        log::debug!(
            "Streaming {} to {} through {} buffer(s)",
            config.format,
            voice.id(),
            config.buffer_count
        );

        Ok(Self {
            voice,
            ring,
            config,
            position: PlaybackPosition::new(),
            cancel: CancelToken::new(),
            poisoned: false,
            closed: false,
        })
    }

    /// Queues `payload` as one buffer, blocking while the ring is full.
    ///
    /// Payloads are never split or merged and an empty payload still takes a
    /// slot. A device error or a foreign buffer coming back from the voice
    /// leaves the stream unusable; a cancelled or timed-out wait does not,
    /// since nothing was touched yet.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_writable()?;

        let frame = self.config.format.bytes_per_frame();
        if payload.len() % frame != 0 {
            return Err(StreamError::PartialFrame {
                len: payload.len(),
                frame,
            });
        }

        let result = self.write_inner(payload);
        self.poison_on(result)
    }

    fn write_inner(&mut self, payload: &[u8]) -> Result<()> {
        if self.ring.is_full() {
            self.wait_for_processed()?;
            self.reclaim_one()?;
        }

        let format = self.config.format;
        // the reclaim above guarantees a free slot
        let buffer = self
            .ring
            .current_fill_target()
            .ok_or(StreamError::Poisoned)?;
        buffer.fill(&format, payload)?;
        let id = buffer.id();

        self.voice.queue_buffers(&[id])?;
        self.ring.advance_head();
        log::trace!(
            "Queued {id} ({} bytes), depth {}/{}",
            payload.len(),
            self.ring.depth(),
            self.ring.capacity()
        );

        self.ensure_playing()
    }

    /// Reclaims every queued buffer, waiting for the voice to play them.
    ///
    /// Used once the producer has nothing more to write, so the tail of the
    /// stream is accounted for and the ring can be closed cleanly. A paused
    /// voice makes this wait until it is resumed or the timeout fires.
    pub fn drain(&mut self) -> Result<()> {
        self.ensure_writable()?;

        let result = self.drain_inner();
        self.poison_on(result)
    }

    fn drain_inner(&mut self) -> Result<()> {
        while !self.ring.is_empty() {
            self.wait_for_processed()?;
            self.reclaim_one()?;
        }
        log::debug!(
            "Drained {}: {} samples played",
            self.voice.id(),
            self.position.samples_processed()
        );
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if self.poisoned {
            return Err(StreamError::Poisoned);
        }
        Ok(())
    }

    fn poison_on(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = &result
            && err.poisons()
        {
            log::error!("Stream on {} failed: {err}", self.voice.id());
            self.poisoned = true;
        }
        result
    }

    fn wait_for_processed(&self) -> Result<()> {
        let voice = &self.voice;
        Backpressure {
            poll_interval: self.config.poll_interval,
            timeout: self.config.timeout,
            cancel: &self.cancel,
        }
        .wait_until(|| Ok(voice.processed_count()? > 0))
    }

    /// Unqueues the oldest buffer and accounts it. The voice must hand back
    /// exactly the buffer the ring expects.
    fn reclaim_one(&mut self) -> Result<()> {
        let Some(expected) = self.ring.oldest_queued().map(Buffer::id) else {
            return Ok(());
        };

        let actual = self.voice.unqueue_buffer()?;
        if actual != expected {
            return Err(StreamError::BufferMismatch { expected, actual });
        }

        let size = match self.ring.oldest_queued() {
            Some(buffer) => buffer.size()?,
            None => 0,
        };
        let added = self
            .position
            .record(size, self.config.format.bytes_per_sample());
        self.ring.advance_tail();

        log::trace!("Reclaimed {actual}, +{added} samples");
        Ok(())
    }

    /// Starts the voice according to the restart policy.
    fn ensure_playing(&mut self) -> Result<()> {
        match (self.voice.state()?, self.config.restart) {
            (VoiceState::Initial, _) => {
                log::debug!("Starting playback on {}", self.voice.id());
                self.voice.play()
            }
            (VoiceState::Stopped, RestartPolicy::ResumeAfterUnderrun) => {
                // a stopped voice replays its queue from the head; drop what it
                // already played so only new audio is heard
                let played = self.voice.processed_count()?.min(self.ring.depth());
                for _ in 0..played {
                    self.reclaim_one()?;
                }
                log::warn!(
                    "{} ran dry, resuming playback after reclaiming {played} buffer(s)",
                    self.voice.id()
                );
                self.voice.play()
            }
            _ => Ok(()),
        }
    }

    /// Samples the device has finished playing, counted per reclaimed buffer.
    pub fn samples_processed(&self) -> u64 {
        self.position.samples_processed()
    }

    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    /// Playing time represented by [`Self::samples_processed`].
    pub fn elapsed(&self) -> Duration {
        let format = self.config.format;
        self.position.elapsed(format.sample_rate, format.channels)
    }

    /// Buffers currently queued to the voice.
    pub fn depth(&self) -> usize {
        self.ring.depth()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn format(&self) -> AudioFormat {
        self.config.format
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn voice(&self) -> &Arc<Voice<D>> {
        &self.voice
    }

    /// Token that interrupts a blocked `write` or `drain` from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wraps the stream in a writer that coalesces small writes into
    /// `buffer_size` chunks.
    pub fn into_buffered(self) -> BufferedSourceStream<D> {
        BufferedSourceStream::new(self)
    }

    /// Releases the ring buffers.
    ///
    /// Expects the voice to be drained, stopped or closed first. Buffers it
    /// still holds cannot be released and are reported as
    /// [`StreamError::ResourceInUse`]; they are retried once more when the
    /// stream is dropped. Only the first call does anything.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.ring.close()?;
        log::debug!("Stream on {} closed", self.voice.id());
        Ok(())
    }
}

impl<D: AudioDevice> Drop for SourceStream<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("Closing stream on {}: {err}", self.voice.id());
        }
    }
}

impl<D: AudioDevice> std::fmt::Debug for SourceStream<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("voice", &self.voice.id())
            .field("ring", &self.ring)
            .field("format", &self.config.format)
            .field("samples_processed", &self.position.samples_processed())
            .field("poisoned", &self.poisoned)
            .field("closed", &self.closed)
            .finish()
    }
}

/// One `write` call is one device buffer; the whole slice is always taken.
impl<D: AudioDevice> io::Write for SourceStream<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Self::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
