//! Configuration types for Stereoglyph

pub mod file;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::source::{DEFAULT_BUFFERS, DEFAULT_TIMEOUT, MIN_BUFFERS};
use crate::capture::{CaptureOptions, DEFAULT_LEFT_DEVICE, DEFAULT_RIGHT_DEVICE, STUB_PREFIX};
use crate::error::{Result, StereoError};
use crate::render::RenderMode;
use crate::types::{FrameGeometry, PixelOrder};

pub use file::{ConfigFile, sample_config};

/// Default pacing rate
pub const DEFAULT_FPS: u32 = 30;

/// Default number of cycles between metrics log lines
pub const DEFAULT_STATS_INTERVAL: u64 = 300;

/// How the two cameras are read each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcquireStrategy {
    /// Left, then right, on the pipeline thread
    #[default]
    Sequential,
    /// Both at once on two scoped worker threads
    Concurrent,
}

impl std::fmt::Display for AcquireStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireStrategy::Sequential => write!(f, "sequential"),
            AcquireStrategy::Concurrent => write!(f, "concurrent"),
        }
    }
}

impl std::str::FromStr for AcquireStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" => Ok(AcquireStrategy::Sequential),
            "concurrent" | "parallel" => Ok(AcquireStrategy::Concurrent),
            _ => Err(format!("Unknown acquire strategy: {}", s)),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoConfig {
    /// Left camera identifier
    pub left_device: String,
    /// Right camera identifier
    pub right_device: String,
    /// Frame geometry shared by both cameras and the output
    pub geometry: FrameGeometry,
    /// Channel order requested from the cameras
    pub pixel_order: PixelOrder,
    /// Driver buffers per camera
    pub buffer_count: u32,
    /// Wait budget for one acquire
    pub timeout: Duration,
    /// Pacing rate
    pub fps: u32,
    /// Initial render mode
    pub mode: RenderMode,
    /// Capture strategy
    pub strategy: AcquireStrategy,
    /// Timeouts tolerated per acquire before giving up
    pub acquire_retries: u32,
    /// Present to the monitor sink
    pub monitor: bool,
    /// Optional raw output path (`-` for stdout)
    pub raw_output: Option<PathBuf>,
    /// Stop after this many cycles
    pub max_frames: Option<u64>,
    /// Cycles between metrics log lines (0 disables)
    pub stats_interval: u64,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LEFT_DEVICE, DEFAULT_RIGHT_DEVICE)
    }
}

impl StereoConfig {
    /// Create a config for the given camera pair
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left_device: left.into(),
            right_device: right.into(),
            geometry: FrameGeometry::default(),
            pixel_order: PixelOrder::default(),
            buffer_count: DEFAULT_BUFFERS,
            timeout: DEFAULT_TIMEOUT,
            fps: DEFAULT_FPS,
            mode: RenderMode::default(),
            strategy: AcquireStrategy::default(),
            acquire_retries: 0,
            monitor: true,
            raw_output: None,
            max_frames: None,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }

    /// Set the frame geometry
    pub fn with_geometry(mut self, width: u32, height: u32) -> Self {
        self.geometry = FrameGeometry::new(width, height);
        self
    }

    /// Set the camera channel order
    pub fn with_pixel_order(mut self, order: PixelOrder) -> Self {
        self.pixel_order = order;
        self
    }

    /// Set the number of driver buffers
    pub fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set the acquire timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pacing rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the initial render mode
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the capture strategy
    pub fn with_strategy(mut self, strategy: AcquireStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set how many timeouts an acquire may retry
    pub fn with_acquire_retries(mut self, retries: u32) -> Self {
        self.acquire_retries = retries;
        self
    }

    /// Enable or disable the monitor sink
    pub fn with_monitor(mut self, enabled: bool) -> Self {
        self.monitor = enabled;
        self
    }

    /// Add a raw output
    pub fn with_raw_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_output = Some(path.into());
        self
    }

    /// Stop after `frames` cycles
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Set the metrics log interval
    pub fn with_stats_interval(mut self, cycles: u64) -> Self {
        self.stats_interval = cycles;
        self
    }

    /// Time budget of one cycle
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    /// Per-source capture options
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            geometry: self.geometry,
            pixel_order: self.pixel_order,
            buffer_count: self.buffer_count,
            timeout: self.timeout,
        }
    }

    /// Validate the configuration and return any warnings
    ///
    /// These are configurations that work but are likely not what the
    /// user wants.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.fps > 60 {
            warnings.push(format!(
                "{} fps is above what most UVC cameras deliver; expect overruns.",
                self.fps
            ));
        }

        if !self.timeout.is_zero() && self.timeout < self.frame_period() {
            warnings.push(format!(
                "Acquire timeout {:?} is shorter than the frame period {:?}.",
                self.timeout,
                self.frame_period()
            ));
        }

        let pixels = u64::from(self.geometry.width) * u64::from(self.geometry.height);
        if pixels > 1920 * 1080 {
            warnings.push(format!(
                "{} is large for per-pixel fusion within a {} fps budget.",
                self.geometry, self.fps
            ));
        }

        if self.buffer_count > 32 {
            warnings.push(format!(
                "{} buffers per camera adds latency without benefit.",
                self.buffer_count
            ));
        }

        if self.mode.is_interlace() && !self.monitor {
            warnings.push(
                "Interlace modes need a display offset for correct parity; raw outputs always use parity 0."
                    .to_string(),
            );
        }

        warnings
    }

    /// Validate and return an error if the configuration cannot work
    ///
    /// Unlike `validate()` which returns warnings, this returns hard errors.
    pub fn validate_strict(&self) -> Result<()> {
        self.geometry.validate()?;

        if self.fps == 0 {
            return Err(StereoError::configuration("Framerate cannot be zero"));
        }
        if self.fps > 240 {
            return Err(StereoError::configuration(format!(
                "Framerate {} exceeds maximum supported (240)",
                self.fps
            )));
        }

        if self.buffer_count < MIN_BUFFERS {
            return Err(StereoError::configuration(format!(
                "At least {} capture buffers are required, got {}",
                MIN_BUFFERS, self.buffer_count
            )));
        }

        if self.timeout.is_zero() {
            return Err(StereoError::configuration("Acquire timeout cannot be zero"));
        }

        if self.left_device == self.right_device && !self.left_device.starts_with(STUB_PREFIX) {
            return Err(StereoError::configuration(format!(
                "Left and right cameras are both {}",
                self.left_device
            )));
        }

        if !self.monitor && self.raw_output.is_none() {
            return Err(StereoError::configuration(
                "No output enabled; enable the monitor or set a raw output path",
            ));
        }

        Ok(())
    }
}
