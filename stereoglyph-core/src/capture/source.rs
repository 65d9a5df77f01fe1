//! Capture source
//!
//! One camera: a device, its buffer pool, and the streaming lifecycle
//! `initialize -> arm -> acquire* -> disarm`.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::device::{CaptureDevice, DequeuedBuffer, FormatRequest};
use super::pool::{BufferPool, BufferState};
use crate::error::{Result, ResultExt, StereoError};
use crate::formats::{format_name, fourcc_for_order, order_for_fourcc};
use crate::types::{FrameGeometry, PixelOrder, WorkingFrame};

/// Smallest pool that still lets the driver fill one buffer while we read
/// another
pub const MIN_BUFFERS: u32 = 2;

/// Default number of driver buffers per camera
pub const DEFAULT_BUFFERS: u32 = 4;

/// Default wait budget for one frame
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// How a source is set up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Frame geometry to negotiate
    pub geometry: FrameGeometry,
    /// Channel order to request from the device
    pub pixel_order: PixelOrder,
    /// Number of driver buffers
    pub buffer_count: u32,
    /// Default acquire timeout
    pub timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            geometry: FrameGeometry::default(),
            pixel_order: PixelOrder::default(),
            buffer_count: DEFAULT_BUFFERS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CaptureOptions {
    fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        if self.buffer_count < MIN_BUFFERS {
            return Err(StereoError::configuration(format!(
                "At least {} capture buffers are required, got {}",
                MIN_BUFFERS, self.buffer_count
            )));
        }
        Ok(())
    }
}

/// Lifecycle state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Buffers mapped, not streaming
    Initialized,
    /// Buffers queued, streaming
    Armed,
    /// Torn down; terminal
    Disarmed,
}

/// Result of one successful acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredFrame {
    /// Pool index the frame came from
    pub index: u32,
    /// Bytes the driver reported
    pub bytes_used: usize,
    /// Running count of frames acquired from this source, starting at 0
    pub sequence: u64,
}

/// Per-source counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Frames successfully acquired
    pub frames_acquired: u64,
    /// Waits that timed out
    pub timeouts: u64,
    /// Frames shorter than the geometry
    pub short_frames: u64,
}

/// One camera streaming into application-owned frames
pub struct CaptureSource {
    device: Box<dyn CaptureDevice>,
    pool: BufferPool,
    options: CaptureOptions,
    state: SourceState,
    sequence: u64,
    stats: SourceStats,
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("device", &self.device.identifier())
            .field("state", &self.state)
            .field("buffers", &self.pool.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl CaptureSource {
    /// Open the device named by `identifier` and prepare its buffers
    pub fn initialize(identifier: &str, options: CaptureOptions) -> Result<Self> {
        options.validate()?;
        let device = super::open_device(identifier)?;
        Self::with_device(device, options)
    }

    /// Prepare buffers on an already opened device
    ///
    /// On failure every buffer mapped so far is unmapped and the device is
    /// closed before the error is returned.
    pub fn with_device(device: Box<dyn CaptureDevice>, options: CaptureOptions) -> Result<Self> {
        options.validate()?;
        let identifier = device.identifier().to_string();

        let mut source = Self {
            device,
            pool: BufferPool::new(),
            options,
            // nothing is queued yet, so disarm only needs to unmap and close
            state: SourceState::Initialized,
            sequence: 0,
            stats: SourceStats::default(),
        };

        if let Err(e) = source.prepare() {
            source.disarm();
            return Err(e.with_context(format!("Initializing capture device {}", identifier)));
        }

        info!(
            "Capture device {} ready: {} {}, {} buffers",
            identifier,
            options.geometry,
            options.pixel_order,
            source.pool.len()
        );
        Ok(source)
    }

    fn prepare(&mut self) -> Result<()> {
        let wanted = FormatRequest {
            geometry: self.options.geometry,
            fourcc: fourcc_for_order(self.options.pixel_order),
        };
        let got = self.device.set_format(wanted)?;
        if got != wanted {
            let mut message = format!(
                "{} cannot provide {} {}; device answered {} {}",
                self.device.identifier(),
                wanted.geometry,
                format_name(wanted.fourcc),
                got.geometry,
                format_name(got.fourcc)
            );
            if got.geometry == wanted.geometry {
                if let Some(order) = order_for_fourcc(got.fourcc) {
                    message.push_str(&format!(" (set pixel order to {})", order));
                }
            }
            return Err(StereoError::configuration(message));
        }

        let requested = self.options.buffer_count;
        let granted = self.device.request_buffers(requested)?;
        if granted < requested {
            return Err(StereoError::resource(format!(
                "{} granted {} of {} requested buffers",
                self.device.identifier(),
                granted,
                requested
            )));
        }

        for index in 0..granted {
            let region = self
                .device
                .map_buffer(index)
                .context(format!("Mapping buffer {}", index))?;
            self.pool.push(region);
        }
        debug!("Mapped {} buffers on {}", granted, self.device.identifier());
        Ok(())
    }

    /// Queue every buffer and start streaming
    pub fn arm(&mut self) -> Result<()> {
        match self.state {
            SourceState::Armed => {
                warn!("{} is already armed", self.device.identifier());
                return Ok(());
            }
            SourceState::Disarmed => {
                return Err(StereoError::Unsupported(format!(
                    "{} was disarmed and cannot be re-armed",
                    self.device.identifier()
                )));
            }
            SourceState::Initialized => {}
        }

        for index in 0..self.pool.len() as u32 {
            self.device.queue_buffer(index)?;
            self.pool.mark_queued(index)?;
        }
        self.device.stream_on()?;
        self.state = SourceState::Armed;
        debug!("{} streaming", self.device.identifier());
        Ok(())
    }

    /// Wait for the next frame and copy it into `frame`
    ///
    /// The driver buffer is requeued before this returns, whatever the
    /// outcome of the copy.
    pub fn acquire(&mut self, frame: &mut WorkingFrame, timeout: Duration) -> Result<AcquiredFrame> {
        if self.state != SourceState::Armed {
            return Err(StereoError::Unsupported(format!(
                "acquire on {} while {:?}",
                self.device.identifier(),
                self.state
            )));
        }
        if frame.geometry() != self.options.geometry {
            return Err(StereoError::invalid_frame(format!(
                "working frame is {}, source delivers {}",
                frame.geometry(),
                self.options.geometry
            )));
        }

        let buf = self.next_buffer(timeout)?;
        self.pool.mark_dequeued(buf.index)?;
        trace!(
            "{}: buffer {} driver seq {} ({} bytes)",
            self.device.identifier(),
            buf.index,
            buf.sequence,
            buf.bytes_used
        );

        let copied = self.pool.copy_out(
            buf.index,
            buf.bytes_used,
            frame.as_bytes_mut(),
            self.options.pixel_order,
        );

        self.device.queue_buffer(buf.index)?;
        self.pool.mark_queued(buf.index)?;

        let copied = copied?;
        if copied < frame.len() {
            self.stats.short_frames += 1;
            return Err(StereoError::device_io(
                "VIDIOC_DQBUF",
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "short frame from {}: {} of {} bytes",
                        self.device.identifier(),
                        copied,
                        frame.len()
                    ),
                ),
            ));
        }

        let acquired = AcquiredFrame {
            index: buf.index,
            bytes_used: buf.bytes_used,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.stats.frames_acquired += 1;
        Ok(acquired)
    }

    /// Wait and dequeue until a buffer arrives or `timeout` runs out
    fn next_buffer(&mut self, timeout: Duration) -> Result<DequeuedBuffer> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.device.wait_ready(remaining)? {
                if let Some(buf) = self.device.dequeue_buffer()? {
                    return Ok(buf);
                }
                trace!("{}: woke without a filled buffer", self.device.identifier());
                if Instant::now() < deadline {
                    continue;
                }
            }
            self.stats.timeouts += 1;
            return Err(StereoError::Timeout {
                device: self.device.identifier().to_string(),
                waited: timeout,
            });
        }
    }

    /// Acquire with the configured default timeout
    pub fn acquire_default(&mut self, frame: &mut WorkingFrame) -> Result<AcquiredFrame> {
        let timeout = self.options.timeout;
        self.acquire(frame, timeout)
    }

    /// Stop streaming, unmap every buffer and close the device
    ///
    /// Idempotent. Failures are logged, never returned.
    pub fn disarm(&mut self) {
        if self.state == SourceState::Disarmed {
            return;
        }
        let identifier = self.device.identifier().to_string();

        if self.state == SourceState::Armed || self.pool.queued_count() > 0 {
            if let Err(e) = self.device.stream_off() {
                warn!("Stopping stream on {} failed: {}", identifier, e);
            }
        }
        self.pool.reset_to_mapped();

        for e in self.pool.drain(&mut *self.device) {
            warn!("Releasing buffer on {} failed: {}", identifier, e);
        }
        self.device.close();
        self.state = SourceState::Disarmed;
        debug!("{} disarmed", identifier);
    }

    /// Device identifier
    pub fn identifier(&self) -> &str {
        self.device.identifier()
    }

    /// Negotiated geometry
    pub fn geometry(&self) -> FrameGeometry {
        self.options.geometry
    }

    /// Options this source was created with
    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Current lifecycle state
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Number of pool buffers
    pub fn buffer_count(&self) -> usize {
        self.pool.len()
    }

    /// Ownership of pool buffer `index`
    pub fn buffer_state(&self, index: u32) -> Option<BufferState> {
        self.pool.state(index)
    }

    /// Counters
    pub fn stats(&self) -> SourceStats {
        self.stats
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.disarm();
    }
}
