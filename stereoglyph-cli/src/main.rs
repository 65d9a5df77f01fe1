//! Stereoglyph CLI
//!
//! Real-time stereoscopic fusion for a pair of V4L2 cameras.
//!
//! # Usage
//!
//! ```bash
//! # List camera nodes
//! stereoglyph list-devices
//!
//! # Fuse two cameras as a Dubois anaglyph
//! stereoglyph run /dev/video2 /dev/video0 --mode dubois
//!
//! # Pipe raw RGB frames to another program
//! stereoglyph run --output - | ffplay -f rawvideo -pixel_format rgb24 -video_size 640x480 -
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Stereoglyph - stereo fusion for dual V4L2 cameras
#[derive(Parser)]
#[command(name = "stereoglyph")]
#[command(version)]
#[command(about = "Real-time stereoscopic fusion for pairs of V4L2 cameras", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture both cameras and present the fused stream
    Run(commands::RunArgs),

    /// List render modes in cycle order
    Modes,

    /// List V4L2 video nodes
    #[command(alias = "ls")]
    ListDevices,

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Run(args) => commands::run(args).await?,
        Commands::Modes => commands::modes(),
        Commands::ListDevices => commands::list_devices()?,
        Commands::Config(args) => commands::config(args)?,
    }

    Ok(())
}

/// Each `-v` raises the level one step above warnings
fn init_logging(verbose: u8) -> Result<()> {
    let level = [Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE]
        [usize::from(verbose).min(3)];

    let mut filter = EnvFilter::from_default_env();
    for target in ["stereoglyph", "stereoglyph_core"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }

    // stdout may carry raw frames
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
