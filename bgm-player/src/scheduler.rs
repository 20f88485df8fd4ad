//! Buffer-Queue Scheduler
//!
//! One [`StreamScheduler::tick`] runs to completion on the caller's thread:
//!
//! 1. reclaim every buffer the backend reports processed (dequeue, delete)
//! 2. decode fixed-size chunks and queue them until the source holds
//!    `min_queue_depth` buffers, handling end of stream through the track's
//!    loop policy with a single retry
//! 3. push the current volume to the source gain
//! 4. issue `play` if the source is not playing
//!
//! Any track failure in step 2 stops the track on the spot, releases its
//! decoder, halts the source and reclaims every buffer. The failure is
//! logged and reported, never returned.

use crate::backend::{AudioBackend, BufferHandle, SourceState};
use crate::codec::DecodeError;
use crate::config::StreamSettings;
use crate::error::{Error, Result};
use crate::track::{StreamOpener, Track};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// Why a track stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Host called stop
    Requested,
    /// A new track was started over it
    Replaced,
    /// Loop resource could not be opened after the intro ended
    LoopReopenFailed,
    /// Corrupt data, or no data after the loop restart
    DecodeFailed,
    /// The backend refused a buffer operation
    BackendFailed,
}

impl StopReason {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::LoopReopen { .. } => StopReason::LoopReopenFailed,
            Error::DecodeFatal { .. } => StopReason::DecodeFailed,
            _ => StopReason::BackendFailed,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Buffers dequeued and deleted
    pub reclaimed: usize,
    /// Buffers decoded and queued
    pub submitted: usize,
    /// Source queue length when the tick finished
    pub queued: usize,
    /// The track moved from intro to loop during this tick
    pub entered_loop: bool,
    /// `play` was issued
    pub started_playback: bool,
    pub stopped: Option<StopReason>,
}

/// Lifetime buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub generated: u64,
    pub deleted: u64,
    pub submitted_bytes: u64,
}

pub struct StreamScheduler {
    settings: StreamSettings,
    chunk: Vec<u8>,
    /// Generated and not yet deleted
    outstanding: BTreeSet<BufferHandle>,
    /// Off the source queue, but the backend refused to delete them
    pending_delete: Vec<BufferHandle>,
    stats: SchedulerStats,
}

impl StreamScheduler {
    pub fn new(settings: StreamSettings) -> Self {
        let chunk = vec![0u8; settings.chunk_bytes];
        Self {
            settings,
            chunk,
            outstanding: BTreeSet::new(),
            pending_delete: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Buffer handles generated and not yet deleted
    pub fn outstanding_buffers(&self) -> usize {
        self.outstanding.len()
    }

    /// Dequeue and delete every processed buffer. Best effort: a refused
    /// dequeue ends the pass, a refused delete is retried on the next pass.
    pub fn reclaim<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut reclaimed = 0;
        for buffer in std::mem::take(&mut self.pending_delete) {
            if self.delete(backend, buffer) {
                reclaimed += 1;
            }
        }

        let source = backend.source();
        let processed = backend.processed_count(source);

        for _ in 0..processed {
            let buffer = match backend.dequeue_buffer(source) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("Dequeue failed with {} processed: {}", processed, e);
                    break;
                }
            };
            if self.delete(backend, buffer) {
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            debug!("Reclaimed {} buffers", reclaimed);
        }
        reclaimed
    }

    /// Delete `buffer`, parking it for the next reclaim if the backend refuses
    fn delete<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        buffer: BufferHandle,
    ) -> bool {
        match backend.delete_buffer(buffer) {
            Ok(()) => {
                self.outstanding.remove(&buffer);
                self.stats.deleted += 1;
                true
            }
            Err(e) => {
                warn!("Failed to delete buffer {:?}, will retry: {}", buffer, e);
                self.pending_delete.push(buffer);
                false
            }
        }
    }

    /// Release the track and every buffer queued for it.
    ///
    /// Safe to call with no track: the source is still halted and reclaimed.
    pub fn teardown<B: AudioBackend + ?Sized>(
        &mut self,
        track: &mut Option<Track>,
        backend: &mut B,
    ) -> usize {
        if let Some(mut stopped) = track.take() {
            stopped.close();
        }
        let source = backend.source();
        backend.stop(source);
        self.reclaim(backend)
    }

    /// Run one scheduling pass.
    ///
    /// With no track this only reclaims. `volume` is clamped to 0.0..=1.0
    /// and never affects how much is decoded.
    pub fn tick<B: AudioBackend + ?Sized>(
        &mut self,
        track: &mut Option<Track>,
        opener: &StreamOpener<'_>,
        backend: &mut B,
        volume: f32,
    ) -> TickReport {
        let source = backend.source();
        let mut report = TickReport {
            reclaimed: self.reclaim(backend),
            ..Default::default()
        };

        let Some(current) = track.as_mut() else {
            report.queued = backend.queued_count(source);
            return report;
        };

        if let Err(e) = self.refill(current, opener, backend, &mut report) {
            error!("Stopping background track '{}': {}", current.current_name(), e);
            report.stopped = Some(StopReason::from_error(&e));
            report.reclaimed += self.teardown(track, backend);
            report.queued = backend.queued_count(source);
            return report;
        }

        let gain = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        backend.set_gain(source, gain);

        if backend.source_state(source) != SourceState::Playing {
            match backend.play(source) {
                Ok(()) => report.started_playback = true,
                Err(e) => warn!("Play request failed: {}", e),
            }
        }

        report.queued = backend.queued_count(source);
        report
    }

    fn refill<B: AudioBackend + ?Sized>(
        &mut self,
        track: &mut Track,
        opener: &StreamOpener<'_>,
        backend: &mut B,
        report: &mut TickReport,
    ) -> Result<()> {
        let source = backend.source();
        let mut queued = backend.queued_count(source);

        while queued < self.settings.min_queue_depth {
            if let Some(cap) = self.settings.max_submits_per_tick {
                if report.submitted >= cap {
                    debug!("Submit cap {} reached with {} queued", cap, queued);
                    break;
                }
            }

            if fill_chunk(&mut self.chunk, track, opener)? {
                report.entered_loop = true;
            }
            self.submit_chunk(track, backend)?;

            report.submitted += 1;
            queued += 1;
        }
        Ok(())
    }

    fn submit_chunk<B: AudioBackend + ?Sized>(
        &mut self,
        track: &Track,
        backend: &mut B,
    ) -> Result<()> {
        let source = backend.source();
        let buffer = backend.gen_buffer()?;
        self.outstanding.insert(buffer);
        self.stats.generated += 1;

        let queued = backend
            .submit_buffer_data(buffer, track.format(), &self.chunk, track.sample_rate())
            .and_then(|()| backend.enqueue_buffer(source, buffer));
        if let Err(e) = queued {
            self.delete(backend, buffer);
            return Err(e);
        }

        self.stats.submitted_bytes += self.chunk.len() as u64;
        Ok(())
    }
}

/// Fill `chunk` completely from the track.
///
/// A clean end of stream hands control to the track's loop policy and the
/// decode is retried once; a second empty read is fatal. Returns whether the
/// track entered its loop phase along the way.
fn fill_chunk(chunk: &mut [u8], track: &mut Track, opener: &StreamOpener<'_>) -> Result<bool> {
    let mut filled = 0;
    let mut entered_loop = false;

    while filled < chunk.len() {
        let produced = decode(track, &mut chunk[filled..])?;
        if produced > 0 {
            filled += produced;
            continue;
        }

        entered_loop |= track.handle_end_of_stream(opener)?;

        let retried = decode(track, &mut chunk[filled..])?;
        if retried == 0 {
            return Err(Error::DecodeFatal {
                name: track.current_name().to_string(),
                reason: "no data after loop restart".to_string(),
            });
        }
        filled += retried;
    }

    Ok(entered_loop)
}

fn decode(track: &mut Track, dst: &mut [u8]) -> Result<usize> {
    track.decode(dst).map_err(|e: DecodeError| Error::DecodeFatal {
        name: track.current_name().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, SourceId};
    use crate::codec::{Codec, DecodeStream, PcmFormat, StreamInfo};
    use crate::error::OpenFailure;
    use crate::storage::{MemoryStorage, StorageHandle};
    use crate::track::LoopPolicy;

    /// Endless stereo silence
    struct SilenceCodec;

    struct SilenceStream;

    impl Codec for SilenceCodec {
        fn open_stream(
            &self,
            _name: &str,
            _source: Box<dyn StorageHandle>,
        ) -> std::result::Result<Box<dyn DecodeStream>, OpenFailure> {
            Ok(Box::new(SilenceStream))
        }
    }

    impl DecodeStream for SilenceStream {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                channels: 2,
                sample_rate: 22050,
            }
        }

        fn decode_chunk(&mut self, dst: &mut [u8]) -> std::result::Result<usize, DecodeError> {
            let n = dst.len().min(1000);
            dst[..n].fill(0);
            Ok(n)
        }

        fn raw_seek(&mut self, _offset: u64) -> std::result::Result<(), DecodeError> {
            Ok(())
        }

        fn raw_tell(&self) -> u64 {
            0
        }

        fn close(&mut self) {}
    }

    fn start(storage: &MemoryStorage) -> Option<Track> {
        storage.insert("silence", Vec::new());
        let opener = StreamOpener::new(storage, &SilenceCodec);
        Some(Track::open(&opener, "silence", "silence", LoopPolicy::InPlace, false).unwrap())
    }

    #[test]
    fn test_cold_start_fills_to_depth() {
        let storage = MemoryStorage::new();
        let opener = StreamOpener::new(&storage, &SilenceCodec);
        let mut track = start(&storage);
        let mut backend = NullBackend::new();
        let mut scheduler = StreamScheduler::new(StreamSettings::default());

        let report = scheduler.tick(&mut track, &opener, &mut backend, 1.0);

        assert_eq!(report.submitted, 4);
        assert_eq!(report.queued, 4);
        assert!(report.started_playback);
        assert_eq!(scheduler.outstanding_buffers(), 4);
        assert_eq!(scheduler.stats().submitted_bytes, 4 * 16384);
    }

    #[test]
    fn test_steady_state_replaces_consumed_buffers() {
        let storage = MemoryStorage::new();
        let opener = StreamOpener::new(&storage, &SilenceCodec);
        let mut track = start(&storage);
        let mut backend = NullBackend::new();
        let mut scheduler = StreamScheduler::new(StreamSettings::default());

        scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        backend.consume(3);
        let report = scheduler.tick(&mut track, &opener, &mut backend, 1.0);

        assert_eq!(report.reclaimed, 3);
        assert_eq!(report.submitted, 3);
        assert_eq!(report.queued, 4);
        assert!(!report.started_playback);
        assert_eq!(scheduler.outstanding_buffers(), 4);
    }

    #[test]
    fn test_submit_cap_limits_work_per_tick() {
        let storage = MemoryStorage::new();
        let opener = StreamOpener::new(&storage, &SilenceCodec);
        let mut track = start(&storage);
        let mut backend = NullBackend::new();
        let mut scheduler = StreamScheduler::new(StreamSettings {
            max_submits_per_tick: Some(1),
            ..Default::default()
        });

        for expected in 1..=4 {
            let report = scheduler.tick(&mut track, &opener, &mut backend, 1.0);
            assert_eq!(report.submitted, 1);
            assert_eq!(report.queued, expected);
        }
        let report = scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        assert_eq!(report.submitted, 0);
    }

    #[test]
    fn test_teardown_without_track_reclaims() {
        let storage = MemoryStorage::new();
        let opener = StreamOpener::new(&storage, &SilenceCodec);
        let mut track = start(&storage);
        let mut backend = NullBackend::new();
        let mut scheduler = StreamScheduler::new(StreamSettings::default());

        scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        assert_eq!(scheduler.teardown(&mut track, &mut backend), 4);
        assert!(track.is_none());
        assert_eq!(scheduler.outstanding_buffers(), 0);
        assert_eq!(backend.live_buffers(), 0);

        assert_eq!(scheduler.teardown(&mut track, &mut backend), 0);
    }

    #[test]
    fn test_volume_is_clamped() {
        let storage = MemoryStorage::new();
        let opener = StreamOpener::new(&storage, &SilenceCodec);
        let mut track = start(&storage);
        let mut backend = NullBackend::new();
        let mut scheduler = StreamScheduler::new(StreamSettings::default());

        scheduler.tick(&mut track, &opener, &mut backend, 3.0);
        assert_eq!(backend.gain(), 1.0);
        scheduler.tick(&mut track, &opener, &mut backend, f32::NAN);
        assert_eq!(backend.gain(), 0.0);
    }

    /// Headless backend that refuses a chosen number of deletes
    #[derive(Default)]
    struct StubbornDelete {
        inner: NullBackend,
        refuse: usize,
    }

    impl AudioBackend for StubbornDelete {
        fn source(&self) -> SourceId {
            self.inner.source()
        }

        fn gen_buffer(&mut self) -> Result<BufferHandle> {
            self.inner.gen_buffer()
        }

        fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
            if self.refuse > 0 {
                self.refuse -= 1;
                return Err(Error::Backend("device busy".to_string()));
            }
            self.inner.delete_buffer(buffer)
        }

        fn submit_buffer_data(
            &mut self,
            buffer: BufferHandle,
            format: PcmFormat,
            pcm: &[u8],
            sample_rate: u32,
        ) -> Result<()> {
            self.inner.submit_buffer_data(buffer, format, pcm, sample_rate)
        }

        fn enqueue_buffer(&mut self, source: SourceId, buffer: BufferHandle) -> Result<()> {
            self.inner.enqueue_buffer(source, buffer)
        }

        fn dequeue_buffer(&mut self, source: SourceId) -> Result<BufferHandle> {
            self.inner.dequeue_buffer(source)
        }

        fn queued_count(&self, source: SourceId) -> usize {
            self.inner.queued_count(source)
        }

        fn processed_count(&self, source: SourceId) -> usize {
            self.inner.processed_count(source)
        }

        fn set_gain(&mut self, source: SourceId, gain: f32) {
            self.inner.set_gain(source, gain);
        }

        fn source_state(&self, source: SourceId) -> SourceState {
            self.inner.source_state(source)
        }

        fn play(&mut self, source: SourceId) -> Result<()> {
            self.inner.play(source)
        }

        fn stop(&mut self, source: SourceId) {
            self.inner.stop(source);
        }
    }

    #[test]
    fn test_refused_delete_is_retried_next_tick() {
        let storage = MemoryStorage::new();
        let opener = StreamOpener::new(&storage, &SilenceCodec);
        let mut track = start(&storage);
        let mut backend = StubbornDelete::default();
        let mut scheduler = StreamScheduler::new(StreamSettings::default());

        scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        backend.inner.consume(2);
        backend.refuse = 1;

        let report = scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.queued, 4);
        assert_eq!(scheduler.outstanding_buffers(), 5);
        assert_eq!(backend.inner.live_buffers(), 5);

        let report = scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        assert_eq!(report.reclaimed, 1);
        assert_eq!(scheduler.outstanding_buffers(), 4);
        assert_eq!(backend.inner.live_buffers(), 4);
    }

    #[test]
    fn test_teardown_retries_refused_deletes() {
        let storage = MemoryStorage::new();
        let opener = StreamOpener::new(&storage, &SilenceCodec);
        let mut track = start(&storage);
        let mut backend = StubbornDelete::default();
        let mut scheduler = StreamScheduler::new(StreamSettings::default());

        for _ in 0..12 {
            backend.inner.consume(1);
            scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        }
        backend.inner.consume(1);
        backend.refuse = 1;
        scheduler.tick(&mut track, &opener, &mut backend, 1.0);
        assert_eq!(scheduler.outstanding_buffers(), 5);

        scheduler.teardown(&mut track, &mut backend);

        assert_eq!(scheduler.outstanding_buffers(), 0);
        assert_eq!(backend.inner.live_buffers(), 0);
        let stats = scheduler.stats();
        assert_eq!(stats.generated, stats.deleted);
    }
}
