//! Stereoglyph Core Library
//!
//! Real-time stereoscopic video from two V4L2 cameras.
//!
//! This library provides:
//! - Dual-camera capture over V4L2 mmap streaming
//! - Stereo fusion (optimized anaglyph, Dubois, line interlace)
//! - A fixed-rate pacing loop with pluggable frame sinks
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Left camera  │──┐
//! └──────────────┘  │   ┌──────────────┐    ┌─────────────┐
//!                   ├──▶│ Stereo fuse  │───▶│ Frame sinks │
//! ┌──────────────┐  │   │ (render)     │    │ (monitor,   │
//! │ Right camera │──┘   └──────────────┘    │  raw)       │
//! └──────────────┘                          └─────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod formats;
pub mod hotkeys;
pub mod output;
pub mod performance;
pub mod pipeline;
pub mod render;
pub mod types;

pub use capture::{CaptureOptions, CaptureSource};
pub use config::{AcquireStrategy, ConfigFile, StereoConfig};
pub use error::{Result, StereoError};
pub use output::{FrameSink, MonitorSink, RawOutputSink};
pub use pipeline::{ControlCommand, PipelineState, PipelineStats, StereoPipeline};
pub use render::{RenderMode, render};
pub use types::{Eye, FrameGeometry, Handle, PixelOrder, WorkingFrame};
