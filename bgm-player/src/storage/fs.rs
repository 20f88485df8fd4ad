//! Filesystem storage rooted at the music data directory

use super::{StorageHandle, StorageReader};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves resource names relative to a data root.
///
/// Names must be relative and may not climb out of the root with `..`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || name.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("resource name must be relative to the data root: {}", name),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl StorageReader for FsStorage {
    fn open(&self, name: &str) -> io::Result<Box<dyn StorageHandle>> {
        let path = self.resolve(name)?;
        let file = File::open(&path)?;
        let len = file.metadata().ok().map(|m| m.len());
        debug!("Opened {} ({:?} bytes)", path.display(), len);

        Ok(Box::new(FileHandle {
            file: Some(file),
            pos: 0,
            len,
        }))
    }
}

struct FileHandle {
    file: Option<File>,
    pos: u64,
    len: Option<u64>,
}

impl StorageHandle for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        let n = file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "handle closed"));
        };
        self.pos = file.seek(pos)?;
        Ok(self.pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> Option<u64> {
        self.len
    }

    fn close(&mut self) {
        self.file = None;
    }
}
