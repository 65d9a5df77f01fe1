//! Frame outputs
//!
//! Every fused frame is handed to each registered [`FrameSink`] in order.
//! Supported targets:
//! - Monitor sink (stand-in for a display surface; counts and logs frames)
//! - Raw output (verbatim RGB to a file, FIFO, loopback node or stdout)

mod raw;

pub use raw::RawOutputSink;

use tracing::{debug, info};

use crate::error::Result;
use crate::types::FrameGeometry;

/// Consumer of fused frames
///
/// `frame` is packed RGB of exactly `geometry.frame_len()` bytes and is only
/// borrowed for the duration of the call.
pub trait FrameSink: Send {
    /// Name for logs
    fn name(&self) -> &str;

    /// Present one frame
    fn present(&mut self, frame: &[u8], geometry: FrameGeometry) -> Result<()>;

    /// Row offset of the frame's top edge on the physical display
    ///
    /// Interlace modes use its parity so that eye rows land on the right
    /// polarized lines. `None` means the position is unknown.
    fn vertical_offset(&self) -> Option<i32> {
        None
    }

    /// Flush and release the output
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Display stand-in that records what it was shown
#[derive(Debug)]
pub struct MonitorSink {
    frames: u64,
    last_checksum: u32,
    offset: Option<i32>,
    log_every: u64,
}

impl Default for MonitorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorSink {
    /// Monitor with unknown screen position
    pub fn new() -> Self {
        Self {
            frames: 0,
            last_checksum: 0,
            offset: None,
            log_every: 0,
        }
    }

    /// Place the monitor's top edge at display row `offset`
    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Log a line every `frames` presented frames (0 disables)
    pub fn with_log_every(mut self, frames: u64) -> Self {
        self.log_every = frames;
        self
    }

    /// Move the monitor, as a window manager would
    pub fn set_offset(&mut self, offset: Option<i32>) {
        self.offset = offset;
    }

    /// Frames presented so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Additive checksum of the last frame
    pub fn last_checksum(&self) -> u32 {
        self.last_checksum
    }
}

impl FrameSink for MonitorSink {
    fn name(&self) -> &str {
        "monitor"
    }

    fn present(&mut self, frame: &[u8], geometry: FrameGeometry) -> Result<()> {
        self.frames += 1;
        self.last_checksum = frame
            .iter()
            .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
        if self.log_every > 0 && self.frames % self.log_every == 0 {
            debug!(
                "Monitor: frame {} ({}, checksum {:08x})",
                self.frames, geometry, self.last_checksum
            );
        }
        Ok(())
    }

    fn vertical_offset(&self) -> Option<i32> {
        self.offset
    }

    fn close(&mut self) -> Result<()> {
        info!("Monitor presented {} frames", self.frames);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_counts_and_checksums() {
        let mut sink = MonitorSink::new().with_offset(3);
        let g = FrameGeometry::new(1, 1);
        sink.present(&[1, 2, 3], g).unwrap();
        sink.present(&[10, 20, 30], g).unwrap();
        assert_eq!(sink.frames(), 2);
        assert_eq!(sink.last_checksum(), 60);
        assert_eq!(sink.vertical_offset(), Some(3));
    }
}
