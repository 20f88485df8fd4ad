//! # Background music streaming (bgm-player)
//!
//! Streams one background track at a time from named storage resources
//! into a buffer-queue audio backend. The host calls
//! [`BackgroundMusic::tick`] once per frame; each tick reclaims played
//! buffers, decodes enough 16 KiB chunks to keep the source queue at its
//! target depth, syncs volume and keeps the source playing.
//!
//! Tracks are an intro resource followed by a loop resource, which may be
//! the same resource. How the loop is entered is chosen by [`LoopPolicy`].

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod player;
pub mod scheduler;
pub mod storage;
pub mod track;

pub use error::{Error, OpenFailure, Result};
pub use player::BackgroundMusic;
pub use scheduler::{StopReason, StreamScheduler, TickReport};
pub use track::{LoopPolicy, TrackPhase, TrackState};
