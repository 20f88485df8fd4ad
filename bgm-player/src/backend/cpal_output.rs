//! Buffer-queue backend on top of a cpal output stream
//!
//! The queue bookkeeping lives in a [`QueueState`] shared with the device
//! callback. Submitted PCM is converted to the device rate before the lock
//! is taken; the callback copies frames from the front buffer and spreads
//! mono or stereo across the device channels.

use super::queue::{decode_pcm, QueueState, MUSIC_SOURCE};
use super::resample::RateConverter;
use super::{AudioBackend, BufferHandle, SourceId, SourceState};
use crate::codec::PcmFormat;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct CpalQueueBackend {
    state: Arc<Mutex<QueueState>>,
    config: StreamConfig,
    stream: Stream,
    converter: RateConverter,
    /// Set by the device error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl CpalQueueBackend {
    /// Names of every output device on the default host
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open `device_name` (or the default device) and start its stream.
    ///
    /// A named device that cannot be found falls back to the default one.
    /// The stream runs from the start and outputs silence until the music
    /// source is played.
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let device = Self::pick_device(device_name)?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let state = Arc::new(Mutex::new(QueueState::new()));
        let error_flag = Arc::new(AtomicBool::new(false));
        let error_count = Arc::new(AtomicU32::new(0));

        let flags = (&error_flag, &error_count);
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, &state, flags)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, &state, flags)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, &state, flags)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        info!("Audio stream started");

        Ok(Self {
            state,
            converter: RateConverter::new(config.sample_rate.0),
            config,
            stream,
            error_flag,
            error_count,
        })
    }

    fn pick_device(device_name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

            if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(dev);
            }
            warn!("Requested device '{}' not found, falling back to default device", name);
        }

        let dev = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            dev.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(dev)
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Whether the device reported an error since the last call
    pub fn take_error(&self) -> Option<u32> {
        if self.error_flag.swap(false, Ordering::SeqCst) {
            Some(self.error_count.load(Ordering::SeqCst))
        } else {
            None
        }
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    state: &Arc<Mutex<QueueState>>,
    (error_flag, error_count): (&Arc<AtomicBool>, &Arc<AtomicU32>),
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let state = Arc::clone(state);
    let error_flag = Arc::clone(error_flag);
    let error_count = Arc::clone(error_count);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                write_frames(data, channels, &mut lock(&state));
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
                error_count.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

/// Fill an interleaved device buffer from the queue. Even device channels
/// take the left side, odd ones the right.
fn write_frames<T>(data: &mut [T], channels: usize, queue: &mut QueueState)
where
    T: Sample + FromSample<f32>,
{
    for frame in data.chunks_mut(channels) {
        let [left, right] = queue.render_frame();
        for (i, sample) in frame.iter_mut().enumerate() {
            let value = if i % 2 == 0 { left } else { right };
            *sample = T::from_sample(value.clamp(-1.0, 1.0));
        }
    }
}

impl AudioBackend for CpalQueueBackend {
    fn source(&self) -> SourceId {
        MUSIC_SOURCE
    }

    fn gen_buffer(&mut self) -> Result<BufferHandle> {
        Ok(lock(&self.state).gen_buffer())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        lock(&self.state).delete_buffer(buffer)
    }

    fn submit_buffer_data(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<()> {
        let samples = decode_pcm(format, pcm)?;
        let converted = self.converter.convert(&samples, sample_rate, format.channels())?;
        lock(&self.state).store(buffer, format.channels(), converted)
    }

    fn enqueue_buffer(&mut self, source: SourceId, buffer: BufferHandle) -> Result<()> {
        lock(&self.state).enqueue(source, buffer)
    }

    fn dequeue_buffer(&mut self, source: SourceId) -> Result<BufferHandle> {
        lock(&self.state).dequeue(source)
    }

    fn queued_count(&self, source: SourceId) -> usize {
        lock(&self.state).queued_count(source)
    }

    fn processed_count(&self, source: SourceId) -> usize {
        lock(&self.state).processed_count(source)
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        lock(&self.state).set_gain(source, gain);
    }

    fn source_state(&self, source: SourceId) -> SourceState {
        lock(&self.state).source_state(source)
    }

    fn play(&mut self, source: SourceId) -> Result<()> {
        lock(&self.state).play(source)
    }

    fn stop(&mut self, source: SourceId) {
        lock(&self.state).stop(source);
        self.converter.reset();
    }
}

impl Drop for CpalQueueBackend {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause stream on drop: {}", e);
        }
    }
}
