//! `Read + Seek` bridge from a storage handle to the decoder
//!
//! Every read, seek and tell is forwarded synchronously to the handle. The
//! current position is mirrored into a shared counter so the adapter can
//! observe where the container header ended after probing.

use crate::storage::StorageHandle;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use symphonia::core::io::MediaSource;

pub struct StorageSource {
    handle: Box<dyn StorageHandle>,
    position: Arc<AtomicU64>,
}

impl StorageSource {
    pub fn new(handle: Box<dyn StorageHandle>) -> Self {
        let position = Arc::new(AtomicU64::new(handle.tell()));
        Self { handle, position }
    }

    /// Shared view of the storage position, valid after the source has
    /// been moved into a decoder.
    pub fn position(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.position)
    }
}

impl Read for StorageSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.handle.read(buf)?;
        self.position.store(self.handle.tell(), Ordering::Relaxed);
        Ok(n)
    }
}

impl Seek for StorageSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = self.handle.seek(pos)?;
        self.position.store(new_pos, Ordering::Relaxed);
        Ok(new_pos)
    }
}

impl MediaSource for StorageSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.handle.len()
    }
}

impl Drop for StorageSource {
    fn drop(&mut self) {
        self.handle.close();
    }
}
