//! Config command - inspect and create the config file

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use stereoglyph_core::config::{ConfigFile, sample_config};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration, with validation results
    Show,

    /// Write the sample config to the default path
    Init {
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Inspect or create the configuration file
pub fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            let status = if path.exists() { "present" } else { "missing" };
            println!("{} ({})", path.display(), status);
        }
        ConfigCommand::Show => {
            let path = ConfigFile::default_path();
            if !path.exists() {
                eprintln!(
                    "{} is missing; showing built-in defaults (create it with 'stereoglyph config init')\n",
                    path.display()
                );
            }

            // load_from falls back to defaults for a missing file
            let file = ConfigFile::load_from(path).context("Failed to load config file")?;
            let config = file.to_stereo_config();

            println!("  Left:      {}", config.left_device);
            println!("  Right:     {}", config.right_device);
            println!("  Frame:     {} ({})", config.geometry, config.pixel_order);
            println!("  Buffers:   {}", config.buffer_count);
            println!("  Timeout:   {:?}", config.timeout);
            println!("  Capture:   {} ({} retries)", config.strategy, config.acquire_retries);
            println!("  Mode:      {}", config.mode);
            println!("  Framerate: {} fps", config.fps);
            println!("  Monitor:   {}", config.monitor);
            if let Some(raw) = &config.raw_output {
                println!("  Raw out:   {}", raw.display());
            }
            println!(
                "  Hotkeys:   {}",
                if file.hotkeys.enabled { "enabled" } else { "disabled" }
            );

            if let Err(e) = config.validate_strict() {
                println!("\nError: {}", e);
            }
            for warning in config.validate() {
                println!("\nWarning: {}", warning);
            }
        }
        ConfigCommand::Init { force } => {
            let path = ConfigFile::default_path();

            if force && path.exists() {
                std::fs::write(&path, sample_config()).context("Failed to write config file")?;
            } else if !ConfigFile::create_default_if_missing()
                .context("Failed to create config file")?
            {
                println!("{} already exists; pass --force to replace it", path.display());
                return Ok(());
            }

            println!("Wrote {}", path.display());
            println!("Set capture.left / capture.right to your camera pair.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
