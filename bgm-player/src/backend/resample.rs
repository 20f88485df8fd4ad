//! Sample-rate conversion to the device rate
//!
//! Buffers are converted once, when they are submitted, so the device
//! callback only copies frames. Consecutive buffers of the same layout run
//! through one rubato resampler, keeping its filter history across buffer
//! boundaries; [`RateConverter::reset`] drops that history when the queue is
//! halted.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Layout the live resampler was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    input_rate: u32,
    channels: usize,
    frames: usize,
}

pub struct RateConverter {
    output_rate: u32,
    active: Option<(Layout, FastFixedIn<f32>)>,
}

impl RateConverter {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            active: None,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Forget filter history, e.g. after the source was stopped
    pub fn reset(&mut self) {
        self.active = None;
    }

    /// Convert interleaved `samples` at `input_rate` to the output rate.
    ///
    /// Matching rates are copied through untouched.
    pub fn convert(&mut self, samples: &[f32], input_rate: u32, channels: u16) -> Result<Vec<f32>> {
        let channels = channels.max(1) as usize;
        let frames = samples.len() / channels;
        if input_rate == self.output_rate || frames == 0 {
            return Ok(samples.to_vec());
        }

        let layout = Layout {
            input_rate,
            channels,
            frames,
        };
        if !matches!(&self.active, Some((current, _)) if *current == layout) {
            debug!(
                "Resampling {}Hz -> {}Hz, {} channels, {} frames per buffer",
                input_rate, self.output_rate, channels, frames
            );
            let resampler = FastFixedIn::<f32>::new(
                self.output_rate as f64 / input_rate as f64,
                1.0,
                PolynomialDegree::Septic,
                frames,
                channels,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {}", e)))?;
            self.active = Some((layout, resampler));
        }
        let Some((_, resampler)) = self.active.as_mut() else {
            return Err(Error::AudioOutput("Resampler missing".to_string()));
        };

        let planar = deinterleave(samples, channels);
        let converted = resampler
            .process(&planar, None)
            .map_err(|e| Error::AudioOutput(format!("Resampling failed: {}", e)))?;
        Ok(interleave(&converted))
    }
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (lane, &sample) in planar.iter_mut().zip(frame) {
            lane.push(sample);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for lane in planar {
            out.push(lane[i]);
        }
    }
    out
}
