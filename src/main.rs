//! Multicam Sync command-line interface
//!
//! A headless front-end: lists cameras, or runs the capture pipeline and
//! records every camera until Ctrl-C or a fixed duration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multicam_sync::capture::{
    list_cameras, BatchConsumer, CameraId, CapturePipeline, FrameBatch, NokhwaOpener,
};
use multicam_sync::config::RigConfig;
use multicam_sync::recorder::{FfmpegSinkFactory, Recorder, RecordingEvent};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Multicam Sync - synchronized multi-camera recorder
#[derive(Parser, Debug)]
#[command(name = "multicam-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available cameras
    List {
        /// Rig configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Record every configured camera
    Record(RecordOptions),
}

#[derive(Parser, Debug, Clone)]
struct RecordOptions {
    /// Rig configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory (overrides the configured one)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Base name of the output files
    #[arg(short, long)]
    name: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    duration: Option<u64>,

    /// Maximum timestamp spread for frames written together
    #[arg(long)]
    sync_window_ms: Option<u64>,
}

/// Logs the delivered batch rate every few seconds.
struct StatsPresenter {
    window: Mutex<(Instant, u64)>,
}

impl StatsPresenter {
    const INTERVAL: Duration = Duration::from_secs(5);

    fn new() -> Self {
        Self {
            window: Mutex::new((Instant::now(), 0)),
        }
    }
}

impl BatchConsumer for StatsPresenter {
    fn on_frame_batch(&self, batch: &FrameBatch) {
        let mut window = self.window.lock();
        window.1 += 1;
        let elapsed = window.0.elapsed();
        if elapsed >= Self::INTERVAL {
            let fps = window.1 as f64 / elapsed.as_secs_f64();
            tracing::info!(
                "Capture cycle {}: {:.1} batches/s across {} camera(s)",
                batch.cycle,
                fps,
                batch.len()
            );
            *window = (Instant::now(), 0);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RigConfig> {
    match path {
        Some(path) => RigConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(RigConfig::default()),
    }
}

fn list(config: RigConfig) -> Result<()> {
    let cameras = list_cameras(config.backend.resolve());
    if cameras.is_empty() {
        println!("No cameras found");
        return Ok(());
    }
    for camera in cameras {
        println!("{}\t{}\t{}", camera.id, camera.name, camera.description);
    }
    Ok(())
}

async fn record(options: RecordOptions) -> Result<()> {
    let mut config = load_config(options.config.as_ref())?;
    if let Some(dir) = options.output_dir {
        config.recording.output_dir = dir;
    }
    if let Some(name) = options.name {
        config.recording.base_name = name;
    }
    if let Some(window) = options.sync_window_ms {
        config.recording.sync_window_ms = window;
    }
    config.validate().context("invalid configuration")?;

    let sinks = FfmpegSinkFactory::default();
    sinks.probe().context("ffmpeg is required for recording")?;

    let recorder = Arc::new(Recorder::new(Arc::new(sinks)));
    let mut events = recorder.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let RecordingEvent::WriterFailed { camera, reason } = event {
                tracing::warn!("Camera {} is no longer recorded: {}", camera, reason);
            }
        }
    });

    let consumers = vec![
        recorder.clone() as Arc<dyn BatchConsumer>,
        Arc::new(StatsPresenter::new()) as Arc<dyn BatchConsumer>,
    ];
    let mut pipeline = CapturePipeline::start(
        &config.capture_specs(),
        Arc::new(NokhwaOpener),
        consumers,
    )
    .context("failed to start capture")?;

    let cameras: Vec<CameraId> = pipeline.cameras();
    let handle = match recorder.start(config.session_config(cameras)) {
        Ok(handle) => handle,
        Err(e) => {
            pipeline.stop();
            return Err(e).context("failed to start recording");
        }
    };
    println!("Recording... press Ctrl-C to stop");

    match options.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?,
    }

    // Joins capture threads and waits for ffmpeg to finalize every file.
    let summary = tokio::task::spawn_blocking(move || {
        pipeline.stop();
        recorder.stop(handle)
    })
    .await
    .context("shutdown task failed")?
    .context("failed to stop recording")?;
    if let Some(summary) = summary {
        println!("Recorded {} ({} batches)", summary.duration_hms(), summary.committed);
        for file in &summary.files {
            println!("  {}", file.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    multicam_sync::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::List { config } => list(load_config(config.as_ref())?),
        Commands::Record(options) => record(options).await,
    }
}
