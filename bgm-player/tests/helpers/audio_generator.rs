//! WAV fixture generation
//!
//! Writes deterministic 16-bit PCM WAV data with `hound`, either into memory
//! (for `MemoryStorage`) or onto disk (for `FsStorage`).

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;

/// 440 Hz sine, `frames` long, as a complete WAV file
pub fn sine_wav_bytes(channels: u16, sample_rate: u32, frames: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        let amplitude = 0.5 * i16::MAX as f32;
        for frame in 0..frames {
            let t = frame as f32 / sample_rate as f32;
            let sample = ((2.0 * PI * 440.0 * t).sin() * amplitude) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Frames whose every sample equals the frame index, so decoded output can
/// be checked for position
pub fn ramp_wav_bytes(channels: u16, sample_rate: u32, frames: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for frame in 0..frames {
            for _ in 0..channels {
                writer.write_sample(frame as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Write a sine WAV to `path`
pub fn write_sine_wav<P: AsRef<Path>>(path: P, channels: u16, sample_rate: u32, frames: u32) {
    std::fs::write(path, sine_wav_bytes(channels, sample_rate, frames)).unwrap();
}
