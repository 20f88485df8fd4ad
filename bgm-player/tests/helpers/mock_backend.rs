//! Recording backend
//!
//! Wraps [`NullBackend`] bookkeeping and logs every call so tests can assert
//! on the exact sequence the scheduler issued.

use bgm_player::backend::{AudioBackend, BufferHandle, NullBackend, SourceId, SourceState};
use bgm_player::codec::PcmFormat;
use bgm_player::Result;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Gen(BufferHandle),
    Delete(BufferHandle),
    Submit {
        buffer: BufferHandle,
        format: PcmFormat,
        bytes: usize,
        rate: u32,
    },
    Enqueue(BufferHandle),
    Dequeue(BufferHandle),
    SetGain(f32),
    Play,
    Stop,
}

#[derive(Default)]
pub struct MockBackend {
    inner: NullBackend,
    pub calls: Vec<BackendCall>,
    /// Every handle ever generated
    generated: HashSet<BufferHandle>,
    /// Every handle ever deleted
    deleted: HashSet<BufferHandle>,
    /// Refuse `gen_buffer` once this many buffers have been generated
    pub gen_limit: Option<usize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consume(&mut self, count: usize) -> usize {
        self.inner.consume(count)
    }

    pub fn consume_all(&mut self) -> usize {
        self.inner.consume_all()
    }

    pub fn gain(&self) -> f32 {
        self.inner.gain()
    }

    pub fn queued(&self) -> usize {
        self.inner.queued_count(self.inner.source())
    }

    /// Generated handles not yet deleted
    pub fn live_handles(&self) -> usize {
        self.generated.difference(&self.deleted).count()
    }

    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn play_calls(&self) -> usize {
        self.calls.iter().filter(|c| **c == BackendCall::Play).count()
    }

    pub fn submitted_bytes(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::Submit { bytes, .. } => Some(*bytes),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl AudioBackend for MockBackend {
    fn source(&self) -> SourceId {
        self.inner.source()
    }

    fn gen_buffer(&mut self) -> Result<BufferHandle> {
        if let Some(limit) = self.gen_limit {
            if self.generated.len() >= limit {
                return Err(bgm_player::Error::Backend("out of buffers".to_string()));
            }
        }
        let buffer = self.inner.gen_buffer()?;
        self.generated.insert(buffer);
        self.calls.push(BackendCall::Gen(buffer));
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.inner.delete_buffer(buffer)?;
        assert!(self.deleted.insert(buffer), "buffer {:?} deleted twice", buffer);
        self.calls.push(BackendCall::Delete(buffer));
        Ok(())
    }

    fn submit_buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<()> {
        self.inner.submit_buffer_data(buffer, format, pcm, sample_rate)?;
        self.calls.push(BackendCall::Submit {
            buffer,
            format,
            bytes: pcm.len(),
            rate: sample_rate,
        });
        Ok(())
    }

    fn enqueue_buffer(&mut self, source: SourceId, buffer: BufferHandle) -> Result<()> {
        self.inner.enqueue_buffer(source, buffer)?;
        self.calls.push(BackendCall::Enqueue(buffer));
        Ok(())
    }

    fn dequeue_buffer(&mut self, source: SourceId) -> Result<BufferHandle> {
        let buffer = self.inner.dequeue_buffer(source)?;
        self.calls.push(BackendCall::Dequeue(buffer));
        Ok(buffer)
    }

    fn queued_count(&self, source: SourceId) -> usize {
        self.inner.queued_count(source)
    }

    fn processed_count(&self, source: SourceId) -> usize {
        self.inner.processed_count(source)
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        self.inner.set_gain(source, gain);
        self.calls.push(BackendCall::SetGain(gain));
    }

    fn source_state(&self, source: SourceId) -> SourceState {
        self.inner.source_state(source)
    }

    fn play(&mut self, source: SourceId) -> Result<()> {
        self.inner.play(source)?;
        self.calls.push(BackendCall::Play);
        Ok(())
    }

    fn stop(&mut self, source: SourceId) {
        self.inner.stop(source);
        self.calls.push(BackendCall::Stop);
    }
}
