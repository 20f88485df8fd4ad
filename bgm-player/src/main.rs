//! bgm-player - stream a background track to the audio device
//!
//! Drives [`BackgroundMusic`] from a fixed-rate tick loop the way a game
//! host would, until the run limit elapses, the track stops, or Ctrl+C.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bgm_common::config::{default_config_path, DataRootResolver};
use bgm_common::logging::init_tracing;
use bgm_player::backend::{AudioBackend, CpalQueueBackend, NullBackend};
use bgm_player::codec::SymphoniaCodec;
use bgm_player::config::TomlConfig;
use bgm_player::storage::FsStorage;
use bgm_player::{BackgroundMusic, LoopPolicy};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Distinct,
    InPlace,
}

impl From<PolicyArg> for LoopPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Distinct => LoopPolicy::Distinct,
            PolicyArg::InPlace => LoopPolicy::InPlace,
        }
    }
}

/// Command-line arguments for bgm-player
#[derive(Parser, Debug)]
#[command(name = "bgm-player")]
#[command(about = "Stream looping background music to an audio device")]
#[command(version)]
struct Args {
    /// Intro resource, relative to the data root
    #[arg(long)]
    intro: Option<String>,

    /// Loop resource (defaults to the intro)
    #[arg(long)]
    loop_name: Option<String>,

    /// Start directly in the loop phase
    #[arg(long)]
    looping: bool,

    /// Loop policy, overrides the config file
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Music volume 0.0-1.0, overrides the config file
    #[arg(long)]
    volume: Option<f32>,

    /// Directory music resources are read from
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host tick interval in milliseconds
    #[arg(long, default_value = "16")]
    tick_ms: u64,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Run without an audio device, pacing playback from the wall clock
    #[arg(long)]
    null_audio: bool,

    /// Audio output device name (default device if absent or not found)
    #[arg(long)]
    device: Option<String>,

    /// Print output device names and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = match config_path.as_deref() {
        Some(path) => TomlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!(
        "Starting bgm-player v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if args.list_devices {
        for name in CpalQueueBackend::list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    if let Some(policy) = args.policy {
        config.stream.loop_policy = policy.into();
    }
    if let Some(volume) = args.volume {
        config.music.volume = volume;
    }
    config.validate()?;

    let data_root = DataRootResolver::new()
        .with_cli_arg(args.data_root.clone())
        .with_toml_value(config.data_root.clone())
        .resolve();
    info!("Data root: {}", data_root.display());

    let Some(intro) = args.intro.clone().or_else(|| config.music.intro.clone()) else {
        bail!("No track given: pass --intro or set [music] intro in the config file");
    };
    let loop_name = args
        .loop_name
        .clone()
        .or_else(|| config.music.loop_name.clone())
        .unwrap_or_else(|| intro.clone());

    let storage = FsStorage::new(data_root);
    let track = TrackArgs {
        intro,
        loop_name,
        looping: args.looping,
    };

    if args.null_audio {
        info!("Running headless");
        let music = BackgroundMusic::new(
            storage,
            SymphoniaCodec::new(),
            NullBackend::new(),
            config.stream.clone(),
        );
        let mut clock = HeadlessClock::new(config.stream.chunk_bytes);
        run(music, &track, &args, config.music.volume, |backend: &mut NullBackend, music_rate| {
            clock.advance(backend, music_rate);
        })
        .await
    } else {
        let backend = CpalQueueBackend::open(args.device.as_deref())
            .context("Failed to open audio output")?;
        info!("Audio output running at {}Hz", backend.output_sample_rate());
        let music =
            BackgroundMusic::new(storage, SymphoniaCodec::new(), backend, config.stream.clone());
        run(music, &track, &args, config.music.volume, |backend: &mut CpalQueueBackend, _| {
            if let Some(count) = backend.take_error() {
                warn!("Audio device reported errors ({} so far)", count);
            }
        })
        .await
    }
}

struct TrackArgs {
    intro: String,
    loop_name: String,
    looping: bool,
}

async fn run<B, F>(
    mut music: BackgroundMusic<FsStorage, SymphoniaCodec, B>,
    track: &TrackArgs,
    args: &Args,
    volume: f32,
    mut after_tick: F,
) -> Result<()>
where
    B: AudioBackend,
    F: FnMut(&mut B, Option<u32>),
{
    music
        .start_track(&track.intro, &track.loop_name, track.looping)
        .context("Failed to start background track")?;

    let deadline = args
        .seconds
        .map(|s| Instant::now() + Duration::from_secs(s));
    let mut interval = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    let mut ticks: u64 = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }

        let report = music.tick(volume);
        ticks += 1;
        if report.submitted > 0 || report.entered_loop {
            debug!("tick {}: {:?}", ticks, report);
        }
        if report.entered_loop {
            info!("Looping '{}'", track.loop_name);
        }
        if let Some(reason) = report.stopped {
            warn!("Track stopped: {:?}", reason);
            break;
        }

        let rate = music.track().map(|t| t.sample_rate() * t.format().block_align() as u32);
        after_tick(music.backend_mut(), rate);

        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run limit reached");
            break;
        }
    }

    music.stop_track();
    let stats = music.stats();
    info!(
        "Done after {} ticks: {} buffers generated, {} deleted, {} bytes submitted",
        ticks, stats.generated, stats.deleted, stats.submitted_bytes
    );
    Ok(())
}

/// Marks headless buffers played as wall-clock time passes
struct HeadlessClock {
    last: Instant,
    chunk_bytes: f64,
    /// Bytes of playback time accrued but not yet applied
    owed_bytes: f64,
}

impl HeadlessClock {
    fn new(chunk_bytes: usize) -> Self {
        Self {
            last: Instant::now(),
            chunk_bytes: chunk_bytes as f64,
            owed_bytes: 0.0,
        }
    }

    /// `bytes_per_sec` is the PCM byte rate of the playing track
    fn advance(&mut self, backend: &mut NullBackend, bytes_per_sec: Option<u32>) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        self.apply(backend, elapsed, bytes_per_sec);
    }

    fn apply(&mut self, backend: &mut NullBackend, elapsed: Duration, bytes_per_sec: Option<u32>) {
        let elapsed = elapsed.as_secs_f64();
        let Some(rate) = bytes_per_sec else {
            self.owed_bytes = 0.0;
            return;
        };
        self.owed_bytes += elapsed * rate as f64;

        let whole = (self.owed_bytes / self.chunk_bytes) as usize;
        if whole > 0 {
            let consumed = backend.consume(whole);
            self.owed_bytes -= consumed as f64 * self.chunk_bytes;
            if consumed < whole {
                self.owed_bytes = 0.0;
            }
        }
    }
}
