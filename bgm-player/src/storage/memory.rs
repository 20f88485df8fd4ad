//! In-memory storage of named blobs
//!
//! Clones share the same map, so resources can be added or removed while a
//! player owns another clone.

use super::{StorageHandle, StorageReader};
use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource
    pub fn insert(&self, name: impl Into<String>, data: Vec<u8>) {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(name.into(), Arc::from(data));
    }

    /// Remove a resource; returns whether it existed
    pub fn remove(&self, name: &str) -> bool {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.contains_key(name)
    }
}

impl StorageReader for MemoryStorage {
    fn open(&self, name: &str) -> io::Result<Box<dyn StorageHandle>> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        let data = blobs.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such resource: {}", name))
        })?;

        Ok(Box::new(MemoryHandle {
            data,
            pos: 0,
            closed: false,
        }))
    }
}

struct MemoryHandle {
    data: Arc<[u8]>,
    pos: u64,
    closed: bool,
}

impl StorageHandle for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        let start = (self.pos as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => len + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of resource",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
