//! Storage Reader abstraction
//!
//! Opens named resources and exposes sequential read, absolute/relative
//! seek, tell and close. The codec adapter forwards every read/seek/tell
//! straight through to a [`StorageHandle`] without extra buffering.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use std::io::{self, SeekFrom};

/// Source of named resources (a data directory, an archive, memory)
pub trait StorageReader {
    /// Open `name` for reading.
    ///
    /// # Errors
    /// - `NotFound` when the resource does not exist
    /// - `InvalidInput` when the name is not acceptable to this storage
    fn open(&self, name: &str) -> io::Result<Box<dyn StorageHandle>>;
}

/// An open resource.
///
/// `Send + Sync` so the handle can back a symphonia `MediaSource`.
pub trait StorageHandle: Send + Sync {
    /// Read up to `buf.len()` bytes; 0 means end of resource.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reposition relative to start, current position or end.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Current absolute position.
    fn tell(&self) -> u64;

    /// Total length in bytes, when known.
    fn len(&self) -> Option<u64>;

    /// Release the underlying resource. Further reads return 0.
    ///
    /// Calling `close` more than once is a no-op.
    fn close(&mut self);
}
