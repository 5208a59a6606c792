//! In-process buffer-queue device.
//!
//! Plays queued PCM buffers into a stereo `f32` mix, either pulled by an
//! output stream through [`AudioSource`] or advanced by hand with
//! [`SoftDevice::complete_buffers`]. Queue semantics follow native devices:
//! a voice plays its queue in order, buffers before the play cursor are
//! processed, running off the end of the queue stops the voice, and playing a
//! stopped voice starts again from the head of its queue.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use cpal::Sample;
use parking_lot::Mutex;

use crate::{
    device::{AudioDevice, DeviceOp, ErrorCode},
    device_manager::{AudioSource, AudioSourceBufferKind},
    format::SampleLayout,
    handle::{BufferId, SourceId},
    voice::VoiceState,
};

#[derive(Debug, Default)]
struct BufferSlot {
    layout: Option<SampleLayout>,
    data: Vec<u8>,
    queued_on: Option<SourceId>,
}

#[derive(Debug, Default)]
struct SourceSlot {
    state: VoiceState,
    queue: VecDeque<BufferId>,
    /// index of the buffer being played; everything before it is processed
    cursor: usize,
    /// byte offset into the buffer at `cursor`
    offset: usize,
}

impl SourceSlot {
    fn advance(&mut self) {
        self.cursor += 1;
        self.offset = 0;
    }

    fn exhausted(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    fn stop_if_exhausted(&mut self) {
        if self.state == VoiceState::Playing && self.exhausted() {
            log::debug!("Voice ran out of queued buffers");
            self.state = VoiceState::Stopped;
        }
    }
}

#[derive(Debug)]
struct Fault {
    op: DeviceOp,
    skip: usize,
    code: ErrorCode,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u32,
    buffers: BTreeMap<BufferId, BufferSlot>,
    sources: BTreeMap<SourceId, SourceSlot>,
    error: Option<ErrorCode>,
    faults: Vec<Fault>,
}

impl DeviceState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Only the first error sticks until it is read.
    fn fail(&mut self, code: ErrorCode) {
        if self.error.is_none() {
            self.error = Some(code);
        }
    }

    /// Fires an armed fault for `op`, if one is due.
    fn trip(&mut self, op: DeviceOp) -> bool {
        let Some(index) = self.faults.iter().position(|fault| fault.op == op) else {
            return false;
        };

        if self.faults[index].skip > 0 {
            self.faults[index].skip -= 1;
            return false;
        }

        let fault = self.faults.remove(index);
        self.fail(fault.code);
        true
    }

    fn source_mut(&mut self, id: SourceId) -> Option<&mut SourceSlot> {
        if !self.sources.contains_key(&id) {
            self.fail(ErrorCode::InvalidName);
        }
        self.sources.get_mut(&id)
    }

    fn source(&mut self, id: SourceId) -> Option<&SourceSlot> {
        if !self.sources.contains_key(&id) {
            self.fail(ErrorCode::InvalidName);
        }
        self.sources.get(&id)
    }
}

/// Shared handle to a software playback device.
#[derive(Debug, Clone, Default)]
pub struct SoftDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SoftDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` latch `code` and do nothing.
    pub fn inject_fault(&self, op: DeviceOp, code: ErrorCode) {
        self.inject_fault_after(op, 0, code);
    }

    /// Let `calls` calls of `op` succeed, then fail the next one with `code`.
    pub fn inject_fault_after(&self, op: DeviceOp, calls: usize, code: ErrorCode) {
        self.state.lock().faults.push(Fault {
            op,
            skip: calls,
            code,
        });
    }

    /// Marks up to `n` pending buffers of a playing voice as played, as if the
    /// device had rendered them. Returns how many were completed.
    pub fn complete_buffers(&self, source: SourceId, n: usize) -> usize {
        let mut state = self.state.lock();
        let Some(slot) = state.sources.get_mut(&source) else {
            return 0;
        };
        if slot.state != VoiceState::Playing {
            return 0;
        }

        let mut done = 0;
        while done < n && !slot.exhausted() {
            slot.advance();
            done += 1;
        }
        slot.stop_if_exhausted();
        done
    }

    /// Mixes every playing voice into `frames`, advancing their queues.
    pub fn render(&self, frames: &mut [(f32, f32)]) {
        let mut state = self.state.lock();
        let DeviceState {
            sources, buffers, ..
        } = &mut *state;

        for source in sources.values_mut() {
            if source.state == VoiceState::Playing {
                render_source(source, buffers, frames);
            }
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_sources(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Copy of a buffer's current bytes.
    pub fn buffer_contents(&self, id: BufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&id).map(|b| b.data.clone())
    }

    /// Ids queued on a voice, oldest first, processed ones included.
    pub fn queued_buffers(&self, source: SourceId) -> Vec<BufferId> {
        self.state
            .lock()
            .sources
            .get(&source)
            .map(|s| s.queue.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn render_source(
    source: &mut SourceSlot,
    buffers: &BTreeMap<BufferId, BufferSlot>,
    out: &mut [(f32, f32)],
) {
    let mut written = 0;

    while written < out.len() {
        let Some(id) = source.queue.get(source.cursor).copied() else {
            break;
        };
        let Some((layout, data)) = buffers
            .get(&id)
            .and_then(|slot| slot.layout.map(|layout| (layout, &slot.data)))
        else {
            source.advance();
            continue;
        };

        let frame_bytes = layout.bytes_per_frame();
        let remaining = data.len().saturating_sub(source.offset) / frame_bytes;
        let take = remaining.min(out.len() - written);

        let start = source.offset;
        for (i, frame) in out[written..written + take].iter_mut().enumerate() {
            let at = start + i * frame_bytes;
            let (l, r) = decode_frame(layout, &data[at..at + frame_bytes]);
            frame.0 += l;
            frame.1 += r;
        }

        written += take;
        source.offset += take * frame_bytes;
        if source.offset >= data.len() {
            source.advance();
        }
    }

    source.stop_if_exhausted();
}

fn decode_sample(bits: u16, bytes: &[u8]) -> f32 {
    if bits == 8 {
        (f32::from(bytes[0]) - 128.0) / 128.0
    } else {
        f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32768.0
    }
}

/// Decodes one interleaved frame to (L, R). Mono is duplicated.
fn decode_frame(layout: SampleLayout, frame: &[u8]) -> (f32, f32) {
    let bits = layout.bits_per_sample();
    let width = layout.bytes_per_sample();
    let left = decode_sample(bits, &frame[..width]);

    if layout.channels() == 1 {
        (left, left)
    } else {
        (left, decode_sample(bits, &frame[width..2 * width]))
    }
}

impl AudioDevice for SoftDevice {
    fn gen_buffers(&self, n: usize) -> Vec<BufferId> {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::GenBuffers) {
            return Vec::new();
        }

        (0..n)
            .map(|_| {
                let id = BufferId(state.next_id());
                state.buffers.insert(id, BufferSlot::default());
                id
            })
            .collect()
    }

    fn delete_buffers(&self, ids: &[BufferId]) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::DeleteBuffers) {
            return;
        }

        for id in ids {
            match state.buffers.get(id).map(|slot| slot.queued_on.is_some()) {
                None => return state.fail(ErrorCode::InvalidName),
                Some(true) => return state.fail(ErrorCode::InvalidOperation),
                Some(false) => {}
            }
        }

        for id in ids {
            state.buffers.remove(id);
        }
    }

    fn buffer_data(&self, id: BufferId, layout: SampleLayout, data: &[u8], sample_rate: u32) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::BufferData) {
            return;
        }
        if sample_rate == 0 || data.len() % layout.bytes_per_frame() != 0 {
            return state.fail(ErrorCode::InvalidValue);
        }

        let Some(slot) = state.buffers.get_mut(&id) else {
            return state.fail(ErrorCode::InvalidName);
        };
        if slot.queued_on.is_some() {
            return state.fail(ErrorCode::InvalidOperation);
        }

        slot.layout = Some(layout);
        slot.data.clear();
        slot.data.extend_from_slice(data);
    }

    fn buffer_size(&self, id: BufferId) -> usize {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Query) {
            return 0;
        }

        match state.buffers.get(&id) {
            Some(slot) => slot.data.len(),
            None => {
                state.fail(ErrorCode::InvalidName);
                0
            }
        }
    }

    fn gen_source(&self) -> SourceId {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::GenSource) {
            return SourceId::NONE;
        }

        let id = SourceId(state.next_id());
        state.sources.insert(id, SourceSlot::default());
        id
    }

    fn delete_source(&self, id: SourceId) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::DeleteSource) {
            return;
        }

        let Some(slot) = state.sources.remove(&id) else {
            return state.fail(ErrorCode::InvalidName);
        };
        for buffer in slot.queue {
            if let Some(b) = state.buffers.get_mut(&buffer) {
                b.queued_on = None;
            }
        }
    }

    fn queue_buffers(&self, source: SourceId, ids: &[BufferId]) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::QueueBuffers) {
            return;
        }
        if state.source(source).is_none() {
            return;
        }

        // every buffer on one queue must share a layout
        let mut layout = state.sources[&source]
            .queue
            .iter()
            .find_map(|id| state.buffers.get(id).and_then(|b| b.layout));

        for (i, id) in ids.iter().enumerate() {
            let Some(slot) = state.buffers.get(id) else {
                return state.fail(ErrorCode::InvalidName);
            };
            if slot.queued_on.is_some() || ids[..i].contains(id) {
                return state.fail(ErrorCode::InvalidOperation);
            }
            match (layout, slot.layout) {
                (Some(expected), Some(actual)) if expected != actual => {
                    return state.fail(ErrorCode::InvalidOperation);
                }
                (None, Some(actual)) => layout = Some(actual),
                _ => {}
            }
        }

        for id in ids {
            if let Some(slot) = state.buffers.get_mut(id) {
                slot.queued_on = Some(source);
            }
        }
        if let Some(slot) = state.sources.get_mut(&source) {
            slot.queue.extend(ids.iter().copied());
        }
    }

    fn unqueue_buffers(&self, source: SourceId, n: usize) -> Vec<BufferId> {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::UnqueueBuffers) {
            return Vec::new();
        }

        let Some(slot) = state.source_mut(source) else {
            return Vec::new();
        };
        if n > slot.cursor {
            state.fail(ErrorCode::InvalidValue);
            return Vec::new();
        }

        let removed: Vec<BufferId> = slot.queue.drain(..n).collect();
        slot.cursor -= n;

        for id in &removed {
            if let Some(buffer) = state.buffers.get_mut(id) {
                buffer.queued_on = None;
            }
        }
        removed
    }

    fn buffers_queued(&self, source: SourceId) -> usize {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Query) {
            return 0;
        }
        state.source(source).map_or(0, |s| s.queue.len())
    }

    fn buffers_processed(&self, source: SourceId) -> usize {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Query) {
            return 0;
        }
        state.source(source).map_or(0, |s| s.cursor)
    }

    fn source_state(&self, source: SourceId) -> VoiceState {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Query) {
            return VoiceState::Initial;
        }
        state.source(source).map_or(VoiceState::Initial, |s| s.state)
    }

    fn play(&self, source: SourceId) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Play) {
            return;
        }
        let Some(slot) = state.source_mut(source) else {
            return;
        };

        match slot.state {
            VoiceState::Playing => return,
            VoiceState::Paused => {}
            VoiceState::Initial | VoiceState::Stopped => {
                slot.cursor = 0;
                slot.offset = 0;
            }
        }
        slot.state = VoiceState::Playing;
        slot.stop_if_exhausted();
    }

    fn pause(&self, source: SourceId) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Pause) {
            return;
        }
        if let Some(slot) = state.source_mut(source)
            && slot.state == VoiceState::Playing
        {
            slot.state = VoiceState::Paused;
        }
    }

    fn stop(&self, source: SourceId) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Stop) {
            return;
        }
        if let Some(slot) = state.source_mut(source) {
            slot.state = VoiceState::Stopped;
            slot.cursor = slot.queue.len();
            slot.offset = 0;
        }
    }

    fn rewind(&self, source: SourceId) {
        let mut state = self.state.lock();
        if state.trip(DeviceOp::Rewind) {
            return;
        }
        if let Some(slot) = state.source_mut(source) {
            slot.state = VoiceState::Initial;
            slot.cursor = 0;
            slot.offset = 0;
        }
    }

    fn take_error(&self) -> Option<ErrorCode> {
        self.state.lock().error.take()
    }
}

impl AudioSource for SoftDevice {
    fn fill_buffer(&mut self, buffer: AudioSourceBufferKind<'_>, frame_size: usize) {
        let mut frames = vec![(0.0f32, 0.0f32); frame_size];
        self.render(&mut frames);

        match buffer {
            AudioSourceBufferKind::F32(data) => fill_sample(data, &frames),
            AudioSourceBufferKind::I16(data) => fill_sample(data, &frames),
            AudioSourceBufferKind::U16(data) => fill_sample(data, &frames),
        }
    }
}

/// Writes stereo frames into an interleaved output of any channel count.
/// Mono outputs get the average, channels past the second stay silent.
fn fill_sample<T>(data: &mut [T], frames: &[(f32, f32)])
where
    T: cpal::FromSample<f32>,
{
    if frames.is_empty() {
        return;
    }
    let channels = (data.len() / frames.len()).max(1);

    for (i, sample) in data.iter_mut().enumerate() {
        let Some(&(l, r)) = frames.get(i / channels) else {
            break;
        };
        let raw_sample = match (channels, i % channels) {
            (1, _) => (l + r) * 0.5,
            (_, 0) => l,
            (_, 1) => r,
            _ => 0.0,
        };
        *sample = raw_sample.to_sample::<T>();
    }
}
