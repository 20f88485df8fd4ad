//! Headless backend
//!
//! Keeps full buffer-queue bookkeeping but never touches an audio device.
//! Queued buffers only become processed when the owner calls
//! [`NullBackend::consume`] or [`NullBackend::consume_all`].

use super::queue::{QueueState, MUSIC_SOURCE};
use super::{AudioBackend, BufferHandle, SourceId, SourceState};
use crate::codec::PcmFormat;
use crate::error::Result;

#[derive(Default)]
pub struct NullBackend {
    state: QueueState,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the device played `count` buffers
    pub fn consume(&mut self, count: usize) -> usize {
        self.state.consume(count)
    }

    /// Pretend the device played everything queued
    pub fn consume_all(&mut self) -> usize {
        self.state.consume(usize::MAX)
    }

    pub fn gain(&self) -> f32 {
        self.state.gain()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.live_buffers()
    }
}

impl AudioBackend for NullBackend {
    fn source(&self) -> SourceId {
        MUSIC_SOURCE
    }

    fn gen_buffer(&mut self) -> Result<BufferHandle> {
        Ok(self.state.gen_buffer())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.state.delete_buffer(buffer)
    }

    fn submit_buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<()> {
        self.state.submit(buffer, format, pcm, sample_rate)
    }

    fn enqueue_buffer(&mut self, source: SourceId, buffer: BufferHandle) -> Result<()> {
        self.state.enqueue(source, buffer)
    }

    fn dequeue_buffer(&mut self, source: SourceId) -> Result<BufferHandle> {
        self.state.dequeue(source)
    }

    fn queued_count(&self, source: SourceId) -> usize {
        self.state.queued_count(source)
    }

    fn processed_count(&self, source: SourceId) -> usize {
        self.state.processed_count(source)
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        self.state.set_gain(source, gain);
    }

    fn source_state(&self, source: SourceId) -> SourceState {
        self.state.source_state(source)
    }

    fn play(&mut self, source: SourceId) -> Result<()> {
        self.state.play(source)
    }

    fn stop(&mut self, source: SourceId) {
        self.state.stop(source);
    }
}
