//! Error types for bgm-player
//!
//! Track-level failures (`Open`, `LoopReopen`, `DecodeFatal`) never abort the
//! host: the scheduler stops the track and reports the reason. Only
//! `start_track` surfaces `Open` to the caller.

use thiserror::Error;

/// Why a named resource could not be turned into a playable stream
#[derive(Error, Debug)]
pub enum OpenFailure {
    /// Storage could not open the resource
    #[error("resource unavailable: {0}")]
    Missing(#[source] std::io::Error),

    /// Container or codec not recognized by the decoder
    #[error("unrecognized container: {0}")]
    Unrecognized(String),

    /// Only mono and stereo streams are playable
    #[error("unsupported channel count {0} (expected 1 or 2)")]
    UnsupportedChannels(u16),

    /// Stream did not declare a sample rate
    #[error("sample rate not declared")]
    MissingSampleRate,

    /// Loop resource layout differs from the track it continues
    #[error("loop layout {found} does not match track layout {expected}")]
    LayoutMismatch { expected: String, found: String },
}

/// Main error type for bgm-player
#[derive(Error, Debug)]
pub enum Error {
    /// Track could not be opened at start time
    #[error("Failed to open track '{name}': {cause}")]
    Open {
        name: String,
        #[source]
        cause: OpenFailure,
    },

    /// Loop resource could not be opened after the intro ended
    #[error("Failed to reopen loop resource '{name}': {cause}")]
    LoopReopen {
        name: String,
        #[source]
        cause: OpenFailure,
    },

    /// Decoder reported corruption, or the loop target produced no data
    #[error("Fatal decode error in '{name}': {reason}")]
    DecodeFatal { name: String, reason: String },

    /// Buffer-queue backend rejected an operation
    #[error("Audio backend error: {0}")]
    Backend(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared configuration/IO errors
    #[error(transparent)]
    Common(#[from] bgm_common::Error),
}

/// Convenience Result type using bgm-player Error
pub type Result<T> = std::result::Result<T, Error>;
