//! Run command - capture, fuse and present until stopped

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use stereoglyph_core::{
    config::{AcquireStrategy, ConfigFile, StereoConfig},
    hotkeys::{HotkeyListener, bindings_from_settings},
    pipeline::{ControlCommand, StereoPipeline},
    render::RenderMode,
    types::PixelOrder,
};
use tokio::signal;
use tracing::warn;

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Left camera (e.g. /dev/video2, or stub://left for a test pattern)
    left: Option<String>,

    /// Right camera
    right: Option<String>,

    /// Configuration file (defaults to ~/.config/stereoglyph/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write raw RGB frames to this path ("-" for stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Initial render mode (anaglyph, dubois, interlace-rl, interlace-lr)
    #[arg(short, long)]
    mode: Option<String>,

    /// Pacing rate in frames per second
    #[arg(short, long)]
    fps: Option<u32>,

    /// Acquire both cameras at once
    #[arg(long)]
    concurrent: bool,

    /// Acquire timeouts tolerated before the run fails
    #[arg(long)]
    retries: Option<u32>,

    /// Cameras deliver BGR instead of RGB
    #[arg(long)]
    bgr: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Do not listen for global hotkeys
    #[arg(long)]
    no_hotkeys: bool,
}

impl RunArgs {
    /// Overlay command-line flags on the file configuration
    fn apply(&self, mut config: StereoConfig) -> Result<StereoConfig> {
        if let Some(left) = &self.left {
            config.left_device = left.clone();
        }
        if let Some(right) = &self.right {
            config.right_device = right.clone();
        }
        if let Some(output) = &self.output {
            config = config.with_raw_output(output);
        }
        if let Some(mode) = &self.mode {
            config = config.with_mode(mode.parse::<RenderMode>()?);
        }
        if let Some(fps) = self.fps {
            config = config.with_fps(fps);
        }
        if self.concurrent {
            config = config.with_strategy(AcquireStrategy::Concurrent);
        }
        if let Some(retries) = self.retries {
            config = config.with_acquire_retries(retries);
        }
        if self.bgr {
            config = config.with_pixel_order(PixelOrder::Bgr);
        }
        if let Some(frames) = self.frames {
            config = config.with_max_frames(frames);
        }
        Ok(config)
    }
}

/// Run the pipeline until Ctrl+C, the quit hotkey, or the frame limit
pub async fn run(args: RunArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => ConfigFile::load_from(path.clone()),
        None => ConfigFile::load(),
    }
    .context("Failed to load configuration")?;
    let config = args.apply(file.to_stereo_config())?;

    // stdout may be the raw frame stream; keep the banner on stderr
    eprintln!("Stereoglyph - Starting\n");
    eprintln!("Configuration:");
    eprintln!("  Left:      {}", config.left_device);
    eprintln!("  Right:     {}", config.right_device);
    eprintln!("  Frame:     {} ({})", config.geometry, config.pixel_order);
    eprintln!("  Framerate: {} fps", config.fps);
    eprintln!("  Mode:      {}", config.mode);
    eprintln!("  Capture:   {}", config.strategy);
    if let Some(path) = &config.raw_output {
        eprintln!("  Raw out:   {}", path.display());
    }
    eprintln!();

    let mut pipeline = match StereoPipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            print_hint(&e);
            return Err(e).context("Failed to create pipeline");
        }
    };
    let control = pipeline.control_sender();

    let _hotkeys = if file.hotkeys.enabled && !args.no_hotkeys {
        match bindings_from_settings(&file.hotkeys)
            .and_then(|bindings| HotkeyListener::spawn(bindings, control.clone()))
        {
            Ok(listener) => {
                eprintln!(
                    "Hotkeys: {} cycles the mode, {} quits",
                    file.hotkeys.cycle_mode, file.hotkeys.quit
                );
                Some(listener)
            }
            Err(e) => {
                warn!("Hotkeys disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    eprintln!("Press Ctrl+C to stop...\n");

    let mut task = tokio::task::spawn_blocking(move || pipeline.run());
    let joined = tokio::select! {
        joined = &mut task => joined,
        interrupted = signal::ctrl_c() => {
            match interrupted {
                Ok(()) => {
                    eprintln!("\nReceived interrupt signal...");
                    if control.send(ControlCommand::Quit).await.is_err() {
                        warn!("Pipeline already stopped");
                    }
                }
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            }
            task.await
        }
    };

    match joined.context("Pipeline task failed")? {
        Ok(stats) => {
            eprintln!("Stopped after {} frames.", stats.frames_presented);
            eprintln!("{}", stats);
            Ok(())
        }
        Err(e) => {
            print_hint(&e);
            Err(e).context("Pipeline failed")
        }
    }
}

fn print_hint(err: &stereoglyph_core::StereoError) {
    if let Some(hint) = err.user_hint() {
        eprintln!("Hint: {}", hint);
    }
}
