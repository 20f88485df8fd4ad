//! Shared fixtures for bgm-player integration tests
//!
//! - `MockBackend`: buffer-queue backend that records every call
//! - `ScriptedCodec`: codec whose streams follow a per-resource script
//! - `audio_generator`: WAV fixtures written with hound

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_backend;
pub mod scripted_codec;

pub use mock_backend::{BackendCall, MockBackend};
pub use scripted_codec::{CodecEvent, Script, ScriptedCodec};

use bgm_player::config::StreamSettings;
use bgm_player::storage::MemoryStorage;
use bgm_player::{BackgroundMusic, LoopPolicy};

pub type ScriptedMusic = BackgroundMusic<MemoryStorage, ScriptedCodec, MockBackend>;

/// Player over scripted resources with default settings and `policy`
pub fn scripted_player(
    policy: LoopPolicy,
    resources: &[(&str, Script)],
) -> (ScriptedMusic, MemoryStorage, ScriptedCodec) {
    let storage = MemoryStorage::new();
    let codec = ScriptedCodec::new();
    for (name, script) in resources {
        codec.add(&storage, name, script.clone());
    }

    let settings = StreamSettings {
        loop_policy: policy,
        ..Default::default()
    };
    let music = BackgroundMusic::new(storage.clone(), codec.clone(), MockBackend::new(), settings);
    (music, storage, codec)
}
