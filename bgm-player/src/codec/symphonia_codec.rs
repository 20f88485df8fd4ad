//! Symphonia-backed codec adapter
//!
//! Probes the container, decodes packets of the first audio track and hands
//! out interleaved little-endian i16 PCM in whatever slice size the caller
//! asks for.
//!
//! Raw offsets are `header_end + pcm_bytes_emitted`. `raw_seek` converts an
//! offset back to a frame timestamp and seeks the format reader accurately;
//! this assumes the track time base is one tick per frame, which holds for
//! the WAV, FLAC, Vorbis and MP3 readers.

use super::{Codec, DecodeError, DecodeStream, StorageSource, StreamInfo};
use crate::error::OpenFailure;
use crate::storage::StorageHandle;
use std::io;
use std::path::Path;
use std::sync::atomic::Ordering;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

// A bad packet is skipped; this many bad packets in a row is corruption.
const MAX_DECODE_RETRIES: usize = 3;

/// Codec that understands every container/codec enabled in symphonia
#[derive(Default)]
pub struct SymphoniaCodec {
    format_opts: FormatOptions,
}

impl SymphoniaCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for SymphoniaCodec {
    fn open_stream(
        &self,
        name: &str,
        source: Box<dyn StorageHandle>,
    ) -> Result<Box<dyn DecodeStream>, OpenFailure> {
        let source = StorageSource::new(source);
        let position = source.position();
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &self.format_opts, &MetadataOptions::default())
            .map_err(|e| OpenFailure::Unrecognized(format!("probe failed: {}", e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| OpenFailure::Unrecognized("no decodable audio track".to_string()))?;

        let track_id = track.id;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| OpenFailure::Unrecognized("channel layout not declared".to_string()))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(OpenFailure::MissingSampleRate)?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| OpenFailure::Unrecognized(format!("no decoder: {}", e)))?;

        let header_end = position.load(Ordering::Relaxed);
        debug!(
            "Probed '{}': track {} {}ch @ {}Hz",
            name, track_id, channels, sample_rate
        );

        Ok(Box::new(SymphoniaStream {
            name: name.to_string(),
            inner: Some(Inner {
                format,
                decoder,
                track_id,
            }),
            info: StreamInfo {
                channels,
                sample_rate,
            },
            header_end,
            emitted: 0,
            pending: Vec::new(),
            pending_pos: 0,
            skip_frames: 0,
            sample_buf: None,
        }))
    }
}

struct Inner {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

struct SymphoniaStream {
    name: String,
    /// `None` once closed
    inner: Option<Inner>,
    info: StreamInfo,
    header_end: u64,
    /// PCM bytes handed out since the header
    emitted: u64,
    /// Decoded bytes not yet handed out
    pending: Vec<u8>,
    pending_pos: usize,
    /// Frames to drop after an accurate seek landed early
    skip_frames: u64,
    sample_buf: Option<SampleBuffer<i16>>,
}

impl SymphoniaStream {
    fn block_align(&self) -> u64 {
        self.info.channels as u64 * 2
    }

    /// Decode the next packet into `pending`. Returns `false` at end of stream.
    fn refill(&mut self) -> Result<bool, DecodeError> {
        let inner = self.inner.as_mut().ok_or(DecodeError::Closed)?;
        let mut decode_errors = 0;

        loop {
            let packet = match inner.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    inner.decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            if packet.track_id() != inner.track_id {
                continue;
            }

            let decoded = match inner.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    decode_errors += 1;
                    warn!("'{}': skipping undecodable packet: {}", self.name, msg);
                    if decode_errors > MAX_DECODE_RETRIES {
                        return Err(DecodeError::Corrupt(format!(
                            "{} consecutive undecodable packets",
                            decode_errors
                        )));
                    }
                    continue;
                }
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels as u16 != self.info.channels {
                return Err(DecodeError::Corrupt(format!(
                    "channel count changed mid-stream ({} -> {})",
                    self.info.channels, channels
                )));
            }

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let needed = decoded.capacity() * channels;
            if self.sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }

            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);

                let skip = self.skip_frames.min(frames as u64);
                self.skip_frames -= skip;
                let samples = &buf.samples()[skip as usize * channels..];
                if samples.is_empty() {
                    continue;
                }

                self.pending.clear();
                self.pending_pos = 0;
                self.pending.reserve(samples.len() * 2);
                for sample in samples {
                    self.pending.extend_from_slice(&sample.to_le_bytes());
                }
                return Ok(true);
            }
        }
    }
}

impl DecodeStream for SymphoniaStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    /// An empty `dst` returns `Ok(0)` without decoding.
    fn decode_chunk(&mut self, dst: &mut [u8]) -> Result<usize, DecodeError> {
        if dst.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pending_pos < self.pending.len() {
                let n = dst.len().min(self.pending.len() - self.pending_pos);
                dst[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                self.emitted += n as u64;
                return Ok(n);
            }

            if !self.refill()? {
                return Ok(0);
            }
        }
    }

    fn raw_seek(&mut self, offset: u64) -> Result<(), DecodeError> {
        let block_align = self.block_align();
        if offset < self.header_end || (offset - self.header_end) % block_align != 0 {
            return Err(DecodeError::Seek(format!(
                "offset {} is not a frame boundary after header end {}",
                offset, self.header_end
            )));
        }
        let frame = (offset - self.header_end) / block_align;

        let inner = self.inner.as_mut().ok_or(DecodeError::Closed)?;
        let seeked = inner
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: inner.track_id,
                },
            )
            .map_err(|e| DecodeError::Seek(e.to_string()))?;
        inner.decoder.reset();

        self.pending.clear();
        self.pending_pos = 0;
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.emitted = frame * block_align;

        debug!(
            "'{}': raw seek to {} (frame {}, skipping {})",
            self.name, offset, frame, self.skip_frames
        );
        Ok(())
    }

    fn raw_tell(&self) -> u64 {
        self.header_end + self.emitted
    }

    fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("'{}': decoder closed", self.name);
        }
        self.pending.clear();
        self.pending_pos = 0;
    }
}
