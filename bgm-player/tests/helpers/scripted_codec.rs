//! Scripted codec for scheduler tests
//!
//! Each resource name maps to a [`Script`] describing its layout, how many
//! PCM bytes it yields, and whether it turns corrupt. Output bytes are a
//! position pattern so tests can tell where data came from. Every open,
//! seek and close is appended to a shared log.

use bgm_player::codec::{Codec, DecodeError, DecodeStream, StreamInfo};
use bgm_player::storage::{MemoryStorage, StorageHandle};
use bgm_player::OpenFailure;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Script {
    pub channels: u16,
    pub sample_rate: u32,
    /// Raw offset where PCM starts
    pub header: u64,
    /// PCM bytes before end of stream
    pub pcm_len: u64,
    /// Most bytes a single decode call returns
    pub max_read: usize,
    /// Decoding past this many PCM bytes reports corruption
    pub corrupt_at: Option<u64>,
    /// Opening fails as an unrecognized container
    pub unrecognized: bool,
}

impl Script {
    pub fn stereo(pcm_len: u64) -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            header: 64,
            pcm_len,
            max_read: 4096,
            corrupt_at: None,
            unrecognized: false,
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_header(mut self, header: u64) -> Self {
        self.header = header;
        self
    }

    pub fn corrupt_at(mut self, at: u64) -> Self {
        self.corrupt_at = Some(at);
        self
    }

    pub fn unrecognized(mut self) -> Self {
        self.unrecognized = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecEvent {
    Open(String),
    Seek(String, u64),
    Close(String),
}

#[derive(Clone, Default)]
pub struct ScriptedCodec {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    log: Arc<Mutex<Vec<CodecEvent>>>,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `script` for `name` and put a placeholder blob in `storage`
    pub fn add(&self, storage: &MemoryStorage, name: &str, script: Script) {
        storage.insert(name, vec![0u8; script.header as usize]);
        self.scripts.lock().unwrap().insert(name.to_string(), script);
    }

    pub fn events(&self) -> Vec<CodecEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn opens_of(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, CodecEvent::Open(n) if n == name))
            .count()
    }

    pub fn seeks_of(&self, name: &str) -> Vec<u64> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                CodecEvent::Seek(n, offset) if n == name => Some(*offset),
                _ => None,
            })
            .collect()
    }

    pub fn closes_of(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, CodecEvent::Close(n) if n == name))
            .count()
    }
}

impl Codec for ScriptedCodec {
    fn open_stream(
        &self,
        name: &str,
        source: Box<dyn StorageHandle>,
    ) -> Result<Box<dyn DecodeStream>, OpenFailure> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| OpenFailure::Unrecognized(format!("no script for {}", name)))?;
        if script.unrecognized {
            return Err(OpenFailure::Unrecognized("scripted failure".to_string()));
        }

        self.log.lock().unwrap().push(CodecEvent::Open(name.to_string()));
        Ok(Box::new(ScriptedStream {
            name: name.to_string(),
            script,
            pos: 0,
            source: Some(source),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedStream {
    name: String,
    script: Script,
    /// PCM bytes consumed
    pos: u64,
    source: Option<Box<dyn StorageHandle>>,
    log: Arc<Mutex<Vec<CodecEvent>>>,
}

impl DecodeStream for ScriptedStream {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            channels: self.script.channels,
            sample_rate: self.script.sample_rate,
        }
    }

    fn decode_chunk(&mut self, dst: &mut [u8]) -> Result<usize, DecodeError> {
        if self.source.is_none() {
            return Err(DecodeError::Closed);
        }
        if let Some(at) = self.script.corrupt_at {
            if self.pos >= at {
                return Err(DecodeError::Corrupt("scripted corruption".to_string()));
            }
        }

        let remaining = self.script.pcm_len.saturating_sub(self.pos) as usize;
        let n = dst.len().min(remaining).min(self.script.max_read);
        for (i, byte) in dst[..n].iter_mut().enumerate() {
            *byte = ((self.pos as usize + i) % 251) as u8;
        }
        self.pos += n as u64;
        Ok(n)
    }

    fn raw_seek(&mut self, offset: u64) -> Result<(), DecodeError> {
        if offset < self.script.header || offset > self.script.header + self.script.pcm_len {
            return Err(DecodeError::Seek(format!("offset {} out of range", offset)));
        }
        self.log
            .lock()
            .unwrap()
            .push(CodecEvent::Seek(self.name.clone(), offset));
        self.pos = offset - self.script.header;
        Ok(())
    }

    fn raw_tell(&self) -> u64 {
        self.script.header + self.pos
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            self.log
                .lock()
                .unwrap()
                .push(CodecEvent::Close(self.name.clone()));
        }
    }
}
