//! Codec Adapter
//!
//! Bridges a [`StorageHandle`] to a decoder and exposes the operations the
//! scheduler needs: open, decode-next-chunk, raw seek/tell, stream info and
//! close. Decoded output is always 16-bit little-endian PCM, interleaved
//! when stereo.

mod storage_source;
mod symphonia_codec;

pub use storage_source::StorageSource;
pub use symphonia_codec::SymphoniaCodec;

use crate::error::OpenFailure;
use crate::storage::{StorageHandle, StorageReader};
use thiserror::Error;
use tracing::debug;

/// Sample layout of a decoded stream, decided once at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    Mono16,
    Stereo16,
}

impl PcmFormat {
    /// Map a channel count to a format; only 1 and 2 are playable.
    pub fn from_channels(channels: u16) -> Option<Self> {
        match channels {
            1 => Some(PcmFormat::Mono16),
            2 => Some(PcmFormat::Stereo16),
            _ => None,
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            PcmFormat::Mono16 => 1,
            PcmFormat::Stereo16 => 2,
        }
    }

    /// Bytes per sample frame
    pub fn block_align(self) -> usize {
        self.channels() as usize * 2
    }
}

/// Channel count and sample rate reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Errors reported by an open stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The compressed data cannot be decoded
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// Raw seek target rejected or failed
    #[error("seek failed: {0}")]
    Seek(String),

    /// Stream was already closed
    #[error("stream closed")]
    Closed,
}

/// A decoder factory.
pub trait Codec {
    /// Open a decoder over `source`.
    ///
    /// `name` is the resource name; implementations may use its extension
    /// as a format hint. The returned stream owns `source` and closes it
    /// when the stream is closed.
    fn open_stream(
        &self,
        name: &str,
        source: Box<dyn StorageHandle>,
    ) -> Result<Box<dyn DecodeStream>, OpenFailure>;
}

/// An open, incrementally decodable stream.
pub trait DecodeStream {
    /// Channel count and sample rate
    fn info(&self) -> StreamInfo;

    /// Decode into `dst`.
    ///
    /// Returns `Ok(0)` only at clean end of stream, otherwise
    /// `1..=dst.len()` bytes of PCM.
    fn decode_chunk(&mut self, dst: &mut [u8]) -> Result<usize, DecodeError>;

    /// Move the decode cursor to an offset previously returned by
    /// [`raw_tell`](Self::raw_tell).
    fn raw_seek(&mut self, offset: u64) -> Result<(), DecodeError>;

    /// Current decode cursor. Immediately after open this is the offset
    /// just past the container header.
    fn raw_tell(&self) -> u64;

    /// Release decoder and storage resources. Idempotent.
    fn close(&mut self);
}

/// A freshly opened stream whose layout has been validated
pub struct OpenedStream {
    pub stream: Box<dyn DecodeStream>,
    pub format: PcmFormat,
    pub sample_rate: u32,
    /// Raw offset right after the container header
    pub header_end: u64,
}

/// Open `name` from `storage`, hand it to `codec`, and validate the layout.
///
/// # Errors
/// - `Missing` when storage cannot open the resource
/// - whatever the codec reports for unrecognized data
/// - `UnsupportedChannels` for anything other than mono or stereo
pub fn open_validated(
    storage: &dyn StorageReader,
    codec: &dyn Codec,
    name: &str,
) -> Result<OpenedStream, OpenFailure> {
    let handle = storage.open(name).map_err(OpenFailure::Missing)?;
    let mut stream = codec.open_stream(name, handle)?;
    let info = stream.info();

    let Some(format) = PcmFormat::from_channels(info.channels) else {
        stream.close();
        return Err(OpenFailure::UnsupportedChannels(info.channels));
    };
    if info.sample_rate == 0 {
        stream.close();
        return Err(OpenFailure::MissingSampleRate);
    }

    let header_end = stream.raw_tell();
    debug!(
        "Opened stream '{}': {:?} @ {}Hz, header ends at {}",
        name, format, info.sample_rate, header_end
    );

    Ok(OpenedStream {
        stream,
        format,
        sample_rate: info.sample_rate,
        header_end,
    })
}
