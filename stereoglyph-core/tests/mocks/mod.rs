//! Mock infrastructure for testing
//!
//! Provides pattern frames, synthetic capture sources and a recording sink.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stereoglyph_core::capture::{
    CaptureOptions, CaptureSource, SyntheticDevice, SyntheticLedger, SyntheticOptions,
};
use stereoglyph_core::output::FrameSink;
use stereoglyph_core::types::{FrameGeometry, PixelOrder};
use stereoglyph_core::Result;

/// Small geometry that keeps tests fast
pub const TEST_GEOMETRY: FrameGeometry = FrameGeometry::new(8, 4);

/// Packed RGB frame filled with one color
pub fn solid_frame(geometry: FrameGeometry, rgb: [u8; 3]) -> Vec<u8> {
    rgb.repeat(geometry.width as usize * geometry.height as usize)
}

/// Packed RGB frame where every scanline is filled with `base + row`
pub fn row_tagged_frame(geometry: FrameGeometry, base: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(geometry.frame_len());
    for row in 0..geometry.height {
        let v = base.wrapping_add(row as u8);
        data.extend(std::iter::repeat_n(v, geometry.stride()));
    }
    data
}

/// Packed RGB gradient, distinct per pixel and channel
pub fn gradient_frame(geometry: FrameGeometry) -> Vec<u8> {
    let mut data = Vec::with_capacity(geometry.frame_len());
    for y in 0..geometry.height {
        for x in 0..geometry.width {
            let r = (x * 255 / geometry.width.max(1)) as u8;
            let g = (y * 255 / geometry.height.max(1)) as u8;
            let b = ((x + y) * 7) as u8;
            data.extend_from_slice(&[r, g, b]);
        }
    }
    data
}

/// Capture options for the test geometry
pub fn test_options() -> CaptureOptions {
    CaptureOptions {
        geometry: TEST_GEOMETRY,
        pixel_order: PixelOrder::Rgb,
        buffer_count: 4,
        timeout: Duration::from_millis(200),
    }
}

/// Synthetic device plus a handle to its lifecycle counters
pub fn synthetic_device(
    name: &str,
    options: SyntheticOptions,
) -> (Box<SyntheticDevice>, Arc<SyntheticLedger>) {
    let device = SyntheticDevice::new(format!("stub://{}", name), options);
    let ledger = device.ledger();
    (Box::new(device), ledger)
}

/// Initialized source over a synthetic device
pub fn synthetic_source(
    name: &str,
    device_options: SyntheticOptions,
    options: CaptureOptions,
) -> Result<(CaptureSource, Arc<SyntheticLedger>)> {
    let (device, ledger) = synthetic_device(name, device_options);
    let source = CaptureSource::with_device(device, options)?;
    Ok((source, ledger))
}

/// One frame seen by a [`RecordingSink`]
#[derive(Debug, Clone)]
pub struct Presented {
    pub at: Instant,
    pub frame: Vec<u8>,
    pub geometry: FrameGeometry,
}

/// Shared log of presented frames
pub type SinkLog = Arc<Mutex<Vec<Presented>>>;

/// Sink that keeps a copy of everything presented to it
pub struct RecordingSink {
    log: SinkLog,
    offset: Option<i32>,
    delay: Duration,
    closed: Arc<Mutex<bool>>,
}

impl RecordingSink {
    /// Create a sink and a handle to its log
    pub fn new() -> (Self, SinkLog) {
        let log: SinkLog = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                log: Arc::clone(&log),
                offset: None,
                delay: Duration::ZERO,
                closed: Arc::new(Mutex::new(false)),
            },
            log,
        )
    }

    /// Report a display row offset
    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Spend `delay` in every present, to force overruns
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Flag set when the pipeline closes the sink
    pub fn closed_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.closed)
    }
}

impl FrameSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn present(&mut self, frame: &[u8], geometry: FrameGeometry) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.log.lock().push(Presented {
            at: Instant::now(),
            frame: frame.to_vec(),
            geometry,
        });
        Ok(())
    }

    fn vertical_offset(&self) -> Option<i32> {
        self.offset
    }

    fn close(&mut self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame_length() {
        let frame = solid_frame(TEST_GEOMETRY, [1, 2, 3]);
        assert_eq!(frame.len(), TEST_GEOMETRY.frame_len());
        assert_eq!(&frame[..6], &[1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_row_tagged_frame_rows() {
        let frame = row_tagged_frame(TEST_GEOMETRY, 10);
        let stride = TEST_GEOMETRY.stride();
        assert!(frame[..stride].iter().all(|&b| b == 10));
        assert!(frame[stride..2 * stride].iter().all(|&b| b == 11));
    }

    #[test]
    fn test_recording_sink_logs() {
        let (mut sink, log) = RecordingSink::new();
        sink.present(&[1, 2, 3], FrameGeometry::new(1, 1)).unwrap();
        assert_eq!(log.lock().len(), 1);
    }
}
