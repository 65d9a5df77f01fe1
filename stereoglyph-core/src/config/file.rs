//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/stereoglyph/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{AcquireStrategy, DEFAULT_FPS, DEFAULT_STATS_INTERVAL, StereoConfig};
use crate::capture::source::DEFAULT_BUFFERS;
use crate::capture::{DEFAULT_LEFT_DEVICE, DEFAULT_RIGHT_DEVICE};
use crate::error::{Result, StereoError};
use crate::render::RenderMode;
use crate::types::{FrameGeometry, PixelOrder};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Camera settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Fusion and pacing settings
    #[serde(default)]
    pub render: RenderSettings,

    /// Output sinks
    #[serde(default)]
    pub output: OutputSettings,

    /// Global hotkeys
    #[serde(default)]
    pub hotkeys: HotkeySettings,
}

/// Camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Left camera device
    #[serde(default = "default_left")]
    pub left: String,

    /// Right camera device
    #[serde(default = "default_right")]
    pub right: String,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Camera channel order (rgb, bgr)
    #[serde(default)]
    pub pixel_order: PixelOrder,

    /// Driver buffers per camera
    #[serde(default = "default_buffers")]
    pub buffers: u32,

    /// Acquire timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Acquire strategy (sequential, concurrent)
    #[serde(default)]
    pub strategy: AcquireStrategy,

    /// Timeouts tolerated per acquire
    #[serde(default)]
    pub retries: u32,
}

/// Fusion and pacing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Initial render mode
    #[serde(default)]
    pub mode: RenderMode,

    /// Pacing rate
    #[serde(default = "default_fps")]
    pub fps: u32,
}

/// Output sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Present to the monitor sink
    #[serde(default = "default_true")]
    pub monitor: bool,

    /// Raw RGB output path, `-` for stdout
    #[serde(default)]
    pub raw_path: Option<String>,

    /// Cycles between metrics log lines (0 disables)
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

/// Global hotkey bindings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeySettings {
    /// Listen for hotkeys
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Binding that advances the render mode
    #[serde(default = "default_cycle_key")]
    pub cycle_mode: String,

    /// Binding that stops the pipeline
    #[serde(default = "default_quit_key")]
    pub quit: String,
}

fn default_left() -> String {
    DEFAULT_LEFT_DEVICE.to_string()
}

fn default_right() -> String {
    DEFAULT_RIGHT_DEVICE.to_string()
}

fn default_width() -> u32 {
    FrameGeometry::default().width
}

fn default_height() -> u32 {
    FrameGeometry::default().height
}

fn default_buffers() -> u32 {
    DEFAULT_BUFFERS
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_stats_interval() -> u64 {
    DEFAULT_STATS_INTERVAL
}

fn default_cycle_key() -> String {
    "ctrl+shift+m".to_string()
}

fn default_quit_key() -> String {
    "ctrl+shift+q".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
            width: default_width(),
            height: default_height(),
            pixel_order: PixelOrder::default(),
            buffers: default_buffers(),
            timeout_ms: default_timeout_ms(),
            strategy: AcquireStrategy::default(),
            retries: 0,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            fps: default_fps(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            monitor: true,
            raw_path: None,
            stats_interval: default_stats_interval(),
        }
    }
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_mode: default_cycle_key(),
            quit: default_quit_key(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("stereoglyph").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("stereoglyph")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/stereoglyph/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            StereoError::configuration(format!("Failed to read config file: {}", e))
        })?;

        let config = Self::parse(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| StereoError::configuration(format!("Failed to parse config file: {}", e)))
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StereoError::configuration(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            StereoError::configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(&path, content).map_err(|e| {
            StereoError::configuration(format!("Failed to write config file: {}", e))
        })?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_path();
        if path.exists() {
            return Ok(false);
        }

        std::fs::create_dir_all(path.parent().unwrap_or(&path)).map_err(|e| {
            StereoError::configuration(format!("Failed to create config directory: {}", e))
        })?;
        std::fs::write(&path, sample_config()).map_err(|e| {
            StereoError::configuration(format!("Failed to write config file: {}", e))
        })?;
        info!("Created configuration at {:?}", path);
        Ok(true)
    }

    /// Build a pipeline configuration from the file settings
    pub fn to_stereo_config(&self) -> StereoConfig {
        let capture = &self.capture;
        let mut config = StereoConfig::new(&capture.left, &capture.right)
            .with_geometry(capture.width, capture.height)
            .with_pixel_order(capture.pixel_order)
            .with_buffer_count(capture.buffers)
            .with_timeout(Duration::from_millis(capture.timeout_ms))
            .with_strategy(capture.strategy)
            .with_acquire_retries(capture.retries)
            .with_mode(self.render.mode)
            .with_fps(self.render.fps)
            .with_monitor(self.output.monitor)
            .with_stats_interval(self.output.stats_interval);

        if let Some(path) = self.output.raw_path.as_deref().filter(|p| !p.is_empty()) {
            config = config.with_raw_output(path);
        }
        config
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# Stereoglyph Configuration

[capture]
# Camera devices; "stub://name" selects a synthetic test pattern
left = "/dev/video2"
right = "/dev/video0"

# Frame size shared by both cameras and the output
width = 640
height = 480

# Camera channel order: rgb, bgr
pixel_order = "rgb"

# Driver buffers per camera (minimum 2)
buffers = 4

# How long to wait for one frame, in milliseconds
timeout_ms = 2000

# Acquire strategy: sequential (left then right), concurrent (both at once)
strategy = "sequential"

# Timeouts tolerated per acquire before the run fails
retries = 0

[render]
# Initial mode: anaglyph, dubois, interlace-rl, interlace-lr
mode = "anaglyph"

# Pacing rate in frames per second
fps = 30

[output]
# Present frames to the monitor sink
monitor = true

# Write raw RGB frames to a path (v4l2loopback node, FIFO, "-" for stdout)
# raw_path = "/dev/video10"

# Cycles between metrics log lines (0 disables)
stats_interval = 300

[hotkeys]
enabled = true

# Advance to the next render mode
cycle_mode = "ctrl+shift+m"

# Stop the pipeline
quit = "ctrl+shift+q"
"#
    .to_string()
}
