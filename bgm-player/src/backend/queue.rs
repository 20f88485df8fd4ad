//! Buffer and source bookkeeping shared by the concrete backends
//!
//! Holds buffer storage, the single music source queue, and the playback
//! cursor used when rendering. Backends wrap this state either directly
//! (headless) or behind a mutex shared with the device callback. Buffers
//! are stored as normalized `f32` frames already at the rate they will be
//! played at.

use super::{BufferHandle, SourceId, SourceState};
use crate::codec::PcmFormat;
use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};

/// Id of the one source this state manages
pub const MUSIC_SOURCE: SourceId = SourceId(1);

struct BufferData {
    /// Interleaved samples
    samples: Vec<f32>,
    channels: u16,
    /// Queued on the source (processed or not)
    in_use: bool,
}

pub struct QueueState {
    buffers: HashMap<BufferHandle, BufferData>,
    next_id: u32,
    /// Buffers waiting to play, front is playing
    pending: VecDeque<BufferHandle>,
    /// Finished buffers awaiting dequeue, oldest first
    processed: VecDeque<BufferHandle>,
    gain: f32,
    state: SourceState,
    /// Frame position inside the front pending buffer
    cursor: usize,
}

impl Default for QueueState {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueState {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            next_id: 1,
            pending: VecDeque::new(),
            processed: VecDeque::new(),
            gain: 1.0,
            state: SourceState::Initial,
            cursor: 0,
        }
    }

    fn check_source(source: SourceId) -> Result<()> {
        if source == MUSIC_SOURCE {
            Ok(())
        } else {
            Err(Error::Backend(format!("unknown source {:?}", source)))
        }
    }

    pub fn gen_buffer(&mut self) -> BufferHandle {
        let handle = BufferHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.buffers.insert(
            handle,
            BufferData {
                samples: Vec::new(),
                channels: 0,
                in_use: false,
            },
        );
        handle
    }

    pub fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        match self.buffers.get(&buffer) {
            None => Err(Error::Backend(format!("delete of unknown buffer {:?}", buffer))),
            Some(data) if data.in_use => Err(Error::Backend(format!(
                "delete of queued buffer {:?}",
                buffer
            ))),
            Some(_) => {
                self.buffers.remove(&buffer);
                Ok(())
            }
        }
    }

    /// Store 16-bit PCM in `buffer` at its own rate, without conversion
    pub fn submit(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        pcm: &[u8],
        _sample_rate: u32,
    ) -> Result<()> {
        let samples = decode_pcm(format, pcm)?;
        self.store(buffer, format.channels(), samples)
    }

    /// Store frames that are already at the output rate.
    pub fn store(&mut self, buffer: BufferHandle, channels: u16, samples: Vec<f32>) -> Result<()> {
        let data = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::Backend(format!("submit to unknown buffer {:?}", buffer)))?;
        if data.in_use {
            return Err(Error::Backend(format!("submit to queued buffer {:?}", buffer)));
        }
        data.samples = samples;
        data.channels = channels;
        Ok(())
    }

    pub fn enqueue(&mut self, source: SourceId, buffer: BufferHandle) -> Result<()> {
        Self::check_source(source)?;
        let data = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::Backend(format!("enqueue of unknown buffer {:?}", buffer)))?;
        if data.in_use {
            return Err(Error::Backend(format!("buffer {:?} already queued", buffer)));
        }
        data.in_use = true;
        self.pending.push_back(buffer);
        Ok(())
    }

    pub fn dequeue(&mut self, source: SourceId) -> Result<BufferHandle> {
        Self::check_source(source)?;
        let buffer = self
            .processed
            .pop_front()
            .ok_or_else(|| Error::Backend("no processed buffers to dequeue".to_string()))?;
        if let Some(data) = self.buffers.get_mut(&buffer) {
            data.in_use = false;
        }
        Ok(buffer)
    }

    pub fn queued_count(&self, source: SourceId) -> usize {
        if source != MUSIC_SOURCE {
            return 0;
        }
        self.pending.len() + self.processed.len()
    }

    pub fn processed_count(&self, source: SourceId) -> usize {
        if source != MUSIC_SOURCE {
            return 0;
        }
        self.processed.len()
    }

    pub fn set_gain(&mut self, source: SourceId, gain: f32) {
        if source == MUSIC_SOURCE {
            self.gain = gain.max(0.0);
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn source_state(&self, source: SourceId) -> SourceState {
        if source != MUSIC_SOURCE {
            return SourceState::Stopped;
        }
        self.state
    }

    pub fn play(&mut self, source: SourceId) -> Result<()> {
        Self::check_source(source)?;
        self.state = if self.pending.is_empty() {
            SourceState::Stopped
        } else {
            SourceState::Playing
        };
        Ok(())
    }

    pub fn stop(&mut self, source: SourceId) {
        if source != MUSIC_SOURCE {
            return;
        }
        while let Some(buffer) = self.pending.pop_front() {
            self.processed.push_back(buffer);
        }
        self.cursor = 0;
        self.state = SourceState::Stopped;
    }

    /// Mark up to `count` pending buffers as fully played.
    ///
    /// Returns how many were moved. The source stops once it runs dry.
    pub fn consume(&mut self, count: usize) -> usize {
        let mut moved = 0;
        while moved < count {
            let Some(buffer) = self.pending.pop_front() else {
                break;
            };
            self.processed.push_back(buffer);
            moved += 1;
        }
        self.cursor = 0;
        if self.pending.is_empty() && self.state == SourceState::Playing {
            self.state = SourceState::Stopped;
        }
        moved
    }

    /// Buffers generated and not yet deleted
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Produce one stereo output frame, gain applied.
    ///
    /// Mono buffers feed both sides. Running out of data stops the source.
    pub fn render_frame(&mut self) -> [f32; 2] {
        if self.state != SourceState::Playing {
            return [0.0, 0.0];
        }

        loop {
            let Some(&front) = self.pending.front() else {
                self.state = SourceState::Stopped;
                return [0.0, 0.0];
            };
            let Some(data) = self.buffers.get(&front) else {
                self.pending.pop_front();
                continue;
            };

            let channels = data.channels.max(1) as usize;
            let base = self.cursor * channels;
            let Some(&left) = data.samples.get(base) else {
                self.cursor = 0;
                if let Some(done) = self.pending.pop_front() {
                    self.processed.push_back(done);
                }
                continue;
            };
            let right = if channels > 1 {
                data.samples.get(base + 1).copied().unwrap_or(left)
            } else {
                left
            };

            self.cursor += 1;
            return [left * self.gain, right * self.gain];
        }
    }
}

/// Unpack 16-bit little-endian PCM into normalized samples.
///
/// Fails unless `pcm` holds a whole number of frames.
pub fn decode_pcm(format: PcmFormat, pcm: &[u8]) -> Result<Vec<f32>> {
    if pcm.len() % format.block_align() != 0 {
        return Err(Error::Backend(format!(
            "{} bytes is not a whole number of {:?} frames",
            pcm.len(),
            format
        )));
    }
    Ok(pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect())
}
