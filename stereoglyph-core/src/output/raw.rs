//! Raw RGB output
//!
//! Writes every frame verbatim with a blocking write. Targets are regular
//! files, FIFOs, v4l2loopback nodes (configured for RGB24 at the same size)
//! or stdout when the path is `-`. Opening a FIFO blocks until a reader
//! attaches.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use super::FrameSink;
use crate::error::{Result, StereoError};
use crate::types::FrameGeometry;

/// Sink writing raw frames to a byte stream
pub struct RawOutputSink {
    name: String,
    writer: Box<dyn Write + Send>,
    frames: u64,
    bytes: u64,
}

impl std::fmt::Debug for RawOutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawOutputSink")
            .field("name", &self.name)
            .field("frames", &self.frames)
            .finish()
    }
}

impl RawOutputSink {
    /// Open `path`; `-` selects stdout
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new("-") {
            return Ok(Self::from_writer("stdout", Box::new(std::io::stdout())));
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                StereoError::sink(format!("Failed to open raw output {}: {}", path.display(), e))
            })?;
        info!("Writing raw frames to {}", path.display());
        Ok(Self::from_writer(path.display().to_string(), Box::new(file)))
    }

    /// Wrap an arbitrary writer
    pub fn from_writer(name: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            writer,
            frames: 0,
            bytes: 0,
        }
    }

    /// Frames written
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Bytes written
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl FrameSink for RawOutputSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn present(&mut self, frame: &[u8], geometry: FrameGeometry) -> Result<()> {
        if frame.len() != geometry.frame_len() {
            return Err(StereoError::invalid_frame(format!(
                "raw output expects {} bytes for {}, got {}",
                geometry.frame_len(),
                geometry,
                frame.len()
            )));
        }
        self.writer
            .write_all(frame)
            .and_then(|()| self.writer.flush())
            .map_err(|e| StereoError::sink(format!("Write to {} failed: {}", self.name, e)))?;
        self.frames += 1;
        self.bytes += frame.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| StereoError::sink(format!("Flush of {} failed: {}", self.name, e)))?;
        debug!("{}: wrote {} frames ({} bytes)", self.name, self.frames, self.bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_frames_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rgb");
        let g = FrameGeometry::new(2, 1);

        let mut sink = RawOutputSink::open(&path).unwrap();
        sink.present(&[1, 2, 3, 4, 5, 6], g).unwrap();
        sink.present(&[7, 8, 9, 10, 11, 12], g).unwrap();
        sink.close().unwrap();
        assert_eq!(sink.frames(), 2);

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_rejects_wrong_length() {
        let mut sink = RawOutputSink::from_writer("mem", Box::new(Vec::new()));
        assert!(sink.present(&[0; 5], FrameGeometry::new(2, 1)).is_err());
        assert_eq!(sink.frames(), 0);
    }
}
