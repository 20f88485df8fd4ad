//! Host-facing background music controller
//!
//! [`BackgroundMusic`] owns the storage, codec, backend, scheduler and the
//! current track, and exposes the three operations a host needs:
//! [`start_track`](BackgroundMusic::start_track),
//! [`stop_track`](BackgroundMusic::stop_track) and
//! [`tick`](BackgroundMusic::tick).

use crate::backend::AudioBackend;
use crate::codec::Codec;
use crate::config::StreamSettings;
use crate::error::Result;
use crate::scheduler::{SchedulerStats, StopReason, StreamScheduler, TickReport};
use crate::storage::StorageReader;
use crate::track::{StreamOpener, Track, TrackState};
use tracing::{error, info};

pub struct BackgroundMusic<S, C, B>
where
    S: StorageReader,
    C: Codec,
    B: AudioBackend,
{
    storage: S,
    codec: C,
    backend: B,
    scheduler: StreamScheduler,
    track: Option<Track>,
    state: TrackState,
    last_stop: Option<StopReason>,
}

impl<S, C, B> BackgroundMusic<S, C, B>
where
    S: StorageReader,
    C: Codec,
    B: AudioBackend,
{
    /// Settings are taken as given; validate them first.
    pub fn new(storage: S, codec: C, backend: B, settings: StreamSettings) -> Self {
        Self {
            storage,
            codec,
            backend,
            scheduler: StreamScheduler::new(settings),
            track: None,
            state: TrackState::Idle,
            last_stop: None,
        }
    }

    /// Start a track, replacing any current one.
    ///
    /// The previous track is fully stopped first. With `looping` set the
    /// loop resource is opened directly and the intro is skipped.
    ///
    /// # Errors
    /// `Error::Open` when the first resource cannot be opened or has an
    /// unsupported layout. The player is then `Idle` with no track.
    pub fn start_track(&mut self, intro_name: &str, loop_name: &str, looping: bool) -> Result<()> {
        if self.track.is_some() {
            self.halt(StopReason::Replaced);
        }

        self.state = TrackState::Opening;
        let opener = StreamOpener::new(&self.storage, &self.codec);
        let policy = self.scheduler.settings().loop_policy;

        match Track::open(&opener, intro_name, loop_name, policy, looping) {
            Ok(track) => {
                self.state = TrackState::Playing(track.phase());
                self.track = Some(track);
                self.last_stop = None;
                Ok(())
            }
            Err(e) => {
                error!("Background track not started: {}", e);
                self.state = TrackState::Idle;
                Err(e)
            }
        }
    }

    /// Stop the current track. No-op when nothing is playing.
    pub fn stop_track(&mut self) {
        if self.track.is_none() {
            return;
        }
        self.halt(StopReason::Requested);
    }

    fn halt(&mut self, reason: StopReason) {
        if let Some(track) = self.track.as_ref() {
            info!("Stopping background track '{}' ({:?})", track.current_name(), reason);
        }
        self.scheduler.teardown(&mut self.track, &mut self.backend);
        self.state = TrackState::Stopped;
        self.last_stop = Some(reason);
    }

    /// Run one scheduling pass with the host's current music volume.
    pub fn tick(&mut self, volume: f32) -> TickReport {
        let opener = StreamOpener::new(&self.storage, &self.codec);
        let report = self
            .scheduler
            .tick(&mut self.track, &opener, &mut self.backend, volume);

        if let Some(reason) = report.stopped {
            self.state = TrackState::Stopped;
            self.last_stop = Some(reason);
        } else if let Some(track) = self.track.as_ref() {
            self.state = TrackState::Playing(track.phase());
        }
        report
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Why the most recent track stopped, cleared by a successful start
    pub fn last_stop(&self) -> Option<StopReason> {
        self.last_stop
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn is_looping(&self) -> bool {
        self.track.as_ref().is_some_and(Track::is_looping)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn outstanding_buffers(&self) -> usize {
        self.scheduler.outstanding_buffers()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<S, C, B> Drop for BackgroundMusic<S, C, B>
where
    S: StorageReader,
    C: Codec,
    B: AudioBackend,
{
    fn drop(&mut self) {
        if self.track.is_some() {
            self.scheduler.teardown(&mut self.track, &mut self.backend);
        }
    }
}
