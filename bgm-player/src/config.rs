//! Configuration for bgm-player
//!
//! A TOML bootstrap file with three optional sections:
//!
//! ```toml
//! data_root = "/srv/game/data"
//!
//! [stream]
//! min_queue_depth = 4
//! chunk_bytes = 16384
//! loop_policy = "in_place"
//!
//! [logging]
//! level = "debug"
//!
//! [music]
//! volume = 0.8
//! intro = "music/title_intro.ogg"
//! loop = "music/title_loop.ogg"
//! ```
//!
//! Every field has a built-in default, and a missing file means "all
//! defaults".

use crate::error::{Error, Result};
use crate::track::LoopPolicy;
use bgm_common::config::{load_toml_file, LoggingConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Buffers kept queued on the source
pub const MIN_QUEUE_DEPTH: usize = 4;

/// Bytes of PCM per submitted buffer
pub const CHUNK_BYTES: usize = 16384;

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub min_queue_depth: usize,

    /// Must hold a whole number of stereo 16-bit frames
    pub chunk_bytes: usize,

    /// Cap on buffers submitted in one tick (unset = refill fully)
    pub max_submits_per_tick: Option<usize>,

    pub loop_policy: LoopPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            min_queue_depth: MIN_QUEUE_DEPTH,
            chunk_bytes: CHUNK_BYTES,
            max_submits_per_tick: None,
            loop_policy: LoopPolicy::default(),
        }
    }
}

impl StreamSettings {
    pub fn validate(&self) -> Result<()> {
        if self.min_queue_depth == 0 {
            return Err(Error::Config("min_queue_depth must be at least 1".to_string()));
        }
        if self.chunk_bytes == 0 || self.chunk_bytes % 4 != 0 {
            return Err(Error::Config(format!(
                "chunk_bytes must be a positive multiple of 4, got {}",
                self.chunk_bytes
            )));
        }
        if self.max_submits_per_tick == Some(0) {
            return Err(Error::Config(
                "max_submits_per_tick must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default track and volume for the host
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// 0.0 (silent) to 1.0 (full)
    pub volume: f32,
    pub intro: Option<String>,
    #[serde(rename = "loop")]
    pub loop_name: Option<String>,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            intro: None,
            loop_name: None,
        }
    }
}

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory music resources are resolved against
    pub data_root: Option<PathBuf>,
    pub stream: StreamSettings,
    pub logging: LoggingConfig,
    pub music: MusicConfig,
}

impl TomlConfig {
    /// Load and validate `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config: TomlConfig = load_toml_file(path)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        if !(0.0..=1.0).contains(&self.music.volume) {
            return Err(Error::Config(format!(
                "music volume must be within 0.0..=1.0, got {}",
                self.music.volume
            )));
        }
        Ok(())
    }
}
