//! Buffer-queue audio backend
//!
//! The contract follows the classic buffer-queue model: buffers are
//! generated, filled with PCM, queued on a source, and handed back once the
//! source has finished playing them. A buffer that is queued belongs to the
//! backend until [`AudioBackend::dequeue_buffer`] returns it.

mod cpal_output;
mod null;
mod queue;
mod resample;

pub use cpal_output::CpalQueueBackend;
pub use null::NullBackend;
pub use queue::QueueState;
pub use resample::RateConverter;

use crate::codec::PcmFormat;
use crate::error::Result;

/// Opaque backend buffer name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Opaque backend source name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Playback state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Never played
    Initial,
    Playing,
    Paused,
    /// Explicitly stopped, or starved after playing every queued buffer
    Stopped,
}

/// Minimal buffer-queue surface the scheduler drives.
pub trait AudioBackend {
    /// The source that streamed music is queued on
    fn source(&self) -> SourceId;

    /// Allocate a new, empty buffer.
    fn gen_buffer(&mut self) -> Result<BufferHandle>;

    /// Free a buffer. Fails for buffers still queued on a source.
    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()>;

    /// Copy `pcm` (16-bit little-endian, interleaved if stereo) into `buffer`.
    fn submit_buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<()>;

    /// Append `buffer` to the source queue.
    fn enqueue_buffer(&mut self, source: SourceId, buffer: BufferHandle) -> Result<()>;

    /// Remove the oldest processed buffer from the source queue.
    fn dequeue_buffer(&mut self, source: SourceId) -> Result<BufferHandle>;

    /// Buffers on the source queue, processed or not, that have not been dequeued
    fn queued_count(&self, source: SourceId) -> usize;

    /// Buffers the source has finished playing and that await dequeue
    fn processed_count(&self, source: SourceId) -> usize;

    fn set_gain(&mut self, source: SourceId, gain: f32);

    fn source_state(&self, source: SourceId) -> SourceState;

    /// Start or resume playback. A source with nothing left to play stops
    /// again immediately.
    fn play(&mut self, source: SourceId) -> Result<()>;

    /// Halt playback and mark every queued buffer processed.
    fn stop(&mut self, source: SourceId);
}
