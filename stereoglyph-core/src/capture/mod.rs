//! Camera capture via V4L2 mmap streaming
//!
//! This module handles:
//! - Device enumeration (`/dev/video*`)
//! - Format negotiation and buffer pool setup
//! - The queue/dequeue cycle that fills application working frames
//!
//! Identifiers starting with `stub://` open a [`SyntheticDevice`] instead of
//! a real node, which is how the pipeline is exercised without hardware.

pub mod device;
pub mod pool;
pub mod source;
pub mod synthetic;
pub mod v4l2;

pub use device::{CaptureDevice, DequeuedBuffer, FormatRequest, MappedRegion};
pub use pool::{BufferPool, BufferState};
pub use source::{AcquiredFrame, CaptureOptions, CaptureSource, SourceState, SourceStats};
pub use synthetic::{SyntheticDevice, SyntheticLedger, SyntheticOptions};
pub use v4l2::{DeviceInfo, V4l2Device};

use tracing::debug;

use crate::error::Result;

/// Identifier prefix selecting a synthetic device
pub const STUB_PREFIX: &str = "stub://";

/// Default left camera node
pub const DEFAULT_LEFT_DEVICE: &str = "/dev/video2";

/// Default right camera node
pub const DEFAULT_RIGHT_DEVICE: &str = "/dev/video0";

/// Open a capture device by identifier
pub fn open_device(identifier: &str) -> Result<Box<dyn CaptureDevice>> {
    if identifier.starts_with(STUB_PREFIX) {
        Ok(Box::new(SyntheticDevice::open(identifier)?))
    } else {
        Ok(Box::new(V4l2Device::open(identifier)?))
    }
}

/// List V4L2 video nodes
///
/// Nodes that cannot be queried (permissions, busy metadata nodes) are
/// skipped with a debug log.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let mut nodes: Vec<(u32, String)> = std::fs::read_dir("/dev")?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let number = name.strip_prefix("video")?.parse().ok()?;
            Some((number, format!("/dev/{}", name)))
        })
        .collect();
    nodes.sort();

    let mut devices = Vec::with_capacity(nodes.len());
    for (_, path) in nodes {
        match v4l2::query_device(&path) {
            Ok(info) => devices.push(info),
            Err(e) => debug!("Skipping {}: {}", path, e),
        }
    }
    Ok(devices)
}
