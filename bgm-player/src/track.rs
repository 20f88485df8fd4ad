//! Track State
//!
//! A [`Track`] owns the one open decode stream together with everything
//! needed to continue it past end of stream: the intro and loop resource
//! names, the loop policy, and the raw offset where looping re-enters.

use crate::codec::{open_validated, Codec, DecodeError, DecodeStream, OpenedStream, PcmFormat};
use crate::error::{Error, OpenFailure, Result};
use crate::storage::StorageReader;
use serde::Deserialize;
use tracing::{debug, info};

/// What happens when the playing segment runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPolicy {
    /// Close the intro and open the loop resource by name.
    #[default]
    Distinct,
    /// Seek back to just past the container header. A loop resource that
    /// differs from the intro is opened once, then looped in place.
    InPlace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    Intro,
    Loop,
}

/// Host-visible lifecycle of the background track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Idle,
    Opening,
    Playing(TrackPhase),
    Stopped,
}

/// Storage and codec used to open resources by name
#[derive(Clone, Copy)]
pub struct StreamOpener<'a> {
    pub storage: &'a dyn StorageReader,
    pub codec: &'a dyn Codec,
}

impl<'a> StreamOpener<'a> {
    pub fn new(storage: &'a dyn StorageReader, codec: &'a dyn Codec) -> Self {
        Self { storage, codec }
    }

    pub fn open(&self, name: &str) -> std::result::Result<OpenedStream, OpenFailure> {
        open_validated(self.storage, self.codec, name)
    }
}

/// The single active background track
pub struct Track {
    intro_name: String,
    loop_name: String,
    policy: LoopPolicy,
    /// Resource `stream` was opened from
    current_name: String,
    stream: Box<dyn DecodeStream>,
    format: PcmFormat,
    sample_rate: u32,
    loop_start_offset: u64,
    looping: bool,
}

impl Track {
    /// Open a track.
    ///
    /// With `looping` false the intro resource is opened and played first.
    /// With `looping` true the loop resource is opened and the track starts
    /// directly in its loop phase.
    pub fn open(
        opener: &StreamOpener<'_>,
        intro_name: &str,
        loop_name: &str,
        policy: LoopPolicy,
        looping: bool,
    ) -> Result<Self> {
        let first = if looping { loop_name } else { intro_name };
        let opened = opener.open(first).map_err(|cause| Error::Open {
            name: first.to_string(),
            cause,
        })?;

        info!(
            "Track opened: intro='{}' loop='{}' policy={:?} looping={}",
            intro_name, loop_name, policy, looping
        );

        Ok(Self {
            intro_name: intro_name.to_string(),
            loop_name: loop_name.to_string(),
            policy,
            current_name: first.to_string(),
            stream: opened.stream,
            format: opened.format,
            sample_rate: opened.sample_rate,
            loop_start_offset: opened.header_end,
            looping,
        })
    }

    pub fn intro_name(&self) -> &str {
        &self.intro_name
    }

    pub fn loop_name(&self) -> &str {
        &self.loop_name
    }

    /// Resource the open stream belongs to
    pub fn current_name(&self) -> &str {
        &self.current_name
    }

    pub fn policy(&self) -> LoopPolicy {
        self.policy
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn loop_start_offset(&self) -> u64 {
        self.loop_start_offset
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn phase(&self) -> TrackPhase {
        if self.looping {
            TrackPhase::Loop
        } else {
            TrackPhase::Intro
        }
    }

    pub fn decode(&mut self, dst: &mut [u8]) -> std::result::Result<usize, DecodeError> {
        self.stream.decode_chunk(dst)
    }

    /// Reposition after a clean end of stream.
    ///
    /// Returns `true` when this call moved the track from its intro into its
    /// loop phase. The caller retries decoding exactly once afterwards.
    ///
    /// # Errors
    /// - `LoopReopen` when the loop resource cannot be opened
    /// - `DecodeFatal` when the seek back to the loop start fails
    pub fn handle_end_of_stream(&mut self, opener: &StreamOpener<'_>) -> Result<bool> {
        if self.looping {
            self.seek_to_loop_start()?;
            return Ok(false);
        }

        match self.policy {
            LoopPolicy::Distinct => self.reopen_loop(opener)?,
            LoopPolicy::InPlace => {
                if self.intro_name == self.loop_name {
                    self.seek_to_loop_start()?;
                } else {
                    self.reopen_loop(opener)?;
                }
            }
        }

        self.looping = true;
        info!("Track '{}' entered loop phase", self.loop_name);
        Ok(true)
    }

    fn seek_to_loop_start(&mut self) -> Result<()> {
        debug!(
            "'{}': end of stream, seeking to {}",
            self.current_name, self.loop_start_offset
        );
        self.stream
            .raw_seek(self.loop_start_offset)
            .map_err(|e| Error::DecodeFatal {
                name: self.current_name.clone(),
                reason: e.to_string(),
            })
    }

    fn reopen_loop(&mut self, opener: &StreamOpener<'_>) -> Result<()> {
        debug!(
            "'{}': end of stream, reopening '{}'",
            self.current_name, self.loop_name
        );
        self.stream.close();

        let loop_error = |cause| Error::LoopReopen {
            name: self.loop_name.clone(),
            cause,
        };
        let opened = opener.open(&self.loop_name).map_err(loop_error)?;

        if opened.format != self.format || opened.sample_rate != self.sample_rate {
            let mut rejected = opened.stream;
            rejected.close();
            return Err(loop_error(OpenFailure::LayoutMismatch {
                expected: format!("{:?} @ {}Hz", self.format, self.sample_rate),
                found: format!("{:?} @ {}Hz", opened.format, opened.sample_rate),
            }));
        }

        self.stream = opened.stream;
        self.loop_start_offset = opened.header_end;
        self.current_name = self.loop_name.clone();
        Ok(())
    }

    /// Release the decoder and its storage handle. Idempotent.
    pub fn close(&mut self) {
        self.stream.close();
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        self.stream.close();
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("intro_name", &self.intro_name)
            .field("loop_name", &self.loop_name)
            .field("policy", &self.policy)
            .field("current_name", &self.current_name)
            .field("format", &self.format)
            .field("sample_rate", &self.sample_rate)
            .field("loop_start_offset", &self.loop_start_offset)
            .field("looping", &self.looping)
            .finish()
    }
}
