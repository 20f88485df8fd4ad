//! # BGM Common Library
//!
//! Shared code for the background-music player and its tooling:
//! - Error types
//! - TOML configuration loading and data root resolution
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
