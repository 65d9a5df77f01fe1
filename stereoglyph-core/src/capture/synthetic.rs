//! Synthetic capture device
//!
//! A heap-backed stand-in for a camera, selected with `stub://name`
//! identifiers. It follows the same request/map/queue/stream lifecycle as a
//! V4L2 node and renders a moving test pattern into a buffer when it is
//! dequeued. Failure modes can be injected for testing.
//!
//! Query parameters on the identifier configure it:
//! `stub://left?order=bgr&stall`, `stub://right?spurious=3`

use std::collections::VecDeque;
use std::io;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use super::device::{CaptureDevice, DequeuedBuffer, FormatRequest, MappedRegion};
use crate::error::{Result, StereoError};
use crate::formats::fourcc_for_order;
use crate::types::{BYTES_PER_PIXEL, PixelOrder};

/// Behavior of a synthetic device
#[derive(Debug, Clone, Default)]
pub struct SyntheticOptions {
    /// Channel order the device delivers
    pub native_order: PixelOrder,
    /// Grant at most this many buffers
    pub max_buffers: Option<u32>,
    /// Answer every format request with this format
    pub format_override: Option<FormatRequest>,
    /// Fail to map the buffer with this index
    pub fail_map_at: Option<u32>,
    /// Never become ready (every wait times out)
    pub stall: bool,
    /// Deliver half-length frames
    pub short_frames: bool,
    /// Report ready this many times before a dequeue finds a buffer
    pub spurious_wakeups: u32,
    /// Simulated sensor frame interval
    pub frame_interval: Duration,
}

impl SyntheticOptions {
    /// Parse options from the query part of a `stub://` identifier
    pub fn from_query(query: &str) -> Result<Self> {
        let mut options = Self::default();
        for param in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            match key {
                "order" => {
                    options.native_order = value.parse().map_err(StereoError::configuration)?
                }
                "buffers" => {
                    options.max_buffers = Some(value.parse().map_err(|_| {
                        StereoError::configuration(format!("Invalid stub buffer count '{}'", value))
                    })?)
                }
                "interval_ms" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        StereoError::configuration(format!("Invalid stub interval '{}'", value))
                    })?;
                    options.frame_interval = Duration::from_millis(ms);
                }
                "spurious" => {
                    options.spurious_wakeups = if value.is_empty() {
                        u32::MAX
                    } else {
                        value.parse().map_err(|_| {
                            StereoError::configuration(format!(
                                "Invalid stub wakeup count '{}'",
                                value
                            ))
                        })?
                    }
                }
                "stall" => options.stall = true,
                "short" => options.short_frames = true,
                other => {
                    return Err(StereoError::configuration(format!(
                        "Unknown stub parameter '{}'",
                        other
                    )));
                }
            }
        }
        Ok(options)
    }
}

/// Lifecycle counters shared between a synthetic device and its observer
#[derive(Debug, Default)]
pub struct SyntheticLedger {
    mapped: AtomicUsize,
    unmapped: AtomicUsize,
    queued: AtomicUsize,
    dequeued: AtomicUsize,
    stream_ons: AtomicUsize,
    stream_offs: AtomicUsize,
    closes: AtomicUsize,
}

impl SyntheticLedger {
    /// Buffers mapped so far
    pub fn mapped(&self) -> usize {
        self.mapped.load(Ordering::SeqCst)
    }

    /// Buffers unmapped so far
    pub fn unmapped(&self) -> usize {
        self.unmapped.load(Ordering::SeqCst)
    }

    /// Mappings not yet released
    pub fn live_mappings(&self) -> usize {
        self.mapped().saturating_sub(self.unmapped())
    }

    /// Total QBUF calls
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Total DQBUF calls that returned a buffer
    pub fn dequeued(&self) -> usize {
        self.dequeued.load(Ordering::SeqCst)
    }

    /// Times streaming was started
    pub fn stream_ons(&self) -> usize {
        self.stream_ons.load(Ordering::SeqCst)
    }

    /// Times streaming was stopped
    pub fn stream_offs(&self) -> usize {
        self.stream_offs.load(Ordering::SeqCst)
    }

    /// Times the device was closed
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

fn einval(operation: &str, msg: String) -> StereoError {
    StereoError::device_io(operation, io::Error::new(io::ErrorKind::InvalidInput, msg))
}

/// Test pattern value of pixel (`x`, `y`) in frame `frame`, RGB order
///
/// `seed` shifts the pattern so the two eyes differ.
pub fn pattern_pixel(seed: u32, frame: u32, x: u32, y: u32) -> [u8; 3] {
    [
        x.wrapping_add(frame.wrapping_mul(4)).wrapping_add(seed) as u8,
        y.wrapping_add(seed / 2) as u8,
        (x ^ y).wrapping_add(frame) as u8,
    ]
}

/// Pattern seed derived from a device identifier
pub fn seed_for(identifier: &str) -> u32 {
    identifier
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
}

#[derive(Debug)]
struct Allocation {
    ptr: NonNull<u8>,
    len: usize,
}

impl Allocation {
    fn new(len: usize) -> Self {
        let boxed = vec![0u8; len].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut u8;
        // Box::into_raw never returns null
        let ptr = NonNull::new(raw).unwrap_or(NonNull::dangling());
        Self { ptr, len }
    }

    fn free(self) {
        // SAFETY: ptr/len came from Box::into_raw of a boxed slice of len bytes
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

/// Heap-backed capture device producing a moving pattern
#[derive(Debug)]
pub struct SyntheticDevice {
    identifier: String,
    options: SyntheticOptions,
    ledger: Arc<SyntheticLedger>,
    format: Option<FormatRequest>,
    granted: u32,
    allocations: Vec<Option<Allocation>>,
    queue: VecDeque<u32>,
    streaming: bool,
    closed: bool,
    frame: u32,
    seed: u32,
    spurious_left: u32,
}

// SAFETY: allocations are owned by the device; the pool only touches a
// buffer while the device has handed it out.
unsafe impl Send for SyntheticDevice {}

impl SyntheticDevice {
    /// Create a device with the given identifier and behavior
    pub fn new(identifier: impl Into<String>, options: SyntheticOptions) -> Self {
        let identifier = identifier.into();
        let seed = seed_for(&identifier);
        Self {
            identifier,
            ledger: Arc::new(SyntheticLedger::default()),
            format: None,
            granted: 0,
            allocations: Vec::new(),
            queue: VecDeque::new(),
            streaming: false,
            closed: false,
            frame: 0,
            seed,
            spurious_left: options.spurious_wakeups,
            options,
        }
    }

    /// Open from a `stub://name[?params]` identifier
    pub fn open(identifier: &str) -> Result<Self> {
        let rest = identifier.strip_prefix(super::STUB_PREFIX).unwrap_or(identifier);
        let options = match rest.split_once('?') {
            Some((_, query)) => SyntheticOptions::from_query(query)?,
            None => SyntheticOptions::default(),
        };
        debug!("Opened synthetic device {}", identifier);
        Ok(Self::new(identifier, options))
    }

    /// Shared lifecycle counters
    pub fn ledger(&self) -> Arc<SyntheticLedger> {
        Arc::clone(&self.ledger)
    }

    /// Pattern seed used for this device
    pub fn seed(&self) -> u32 {
        self.seed
    }

    fn check_open(&self, operation: &str) -> Result<()> {
        if self.closed {
            return Err(StereoError::device_io(
                operation,
                io::Error::new(io::ErrorKind::NotConnected, "device closed"),
            ));
        }
        Ok(())
    }

    fn fill(&self, alloc: &Allocation, format: FormatRequest) {
        // SAFETY: the buffer was just taken off the queue; nobody else reads it
        let bytes = unsafe { std::slice::from_raw_parts_mut(alloc.ptr.as_ptr(), alloc.len) };
        let width = format.geometry.width;
        for (i, px) in bytes.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let i = i as u32;
            let [r, g, b] = pattern_pixel(self.seed, self.frame, i % width, i / width);
            let value = match self.options.native_order {
                PixelOrder::Rgb => [r, g, b],
                PixelOrder::Bgr => [b, g, r],
            };
            px.copy_from_slice(&value);
        }
    }
}

impl CaptureDevice for SyntheticDevice {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn set_format(&mut self, request: FormatRequest) -> Result<FormatRequest> {
        self.check_open("VIDIOC_S_FMT")?;
        let granted = self.options.format_override.unwrap_or(FormatRequest {
            geometry: request.geometry,
            fourcc: fourcc_for_order(self.options.native_order),
        });
        self.format = Some(granted);
        Ok(granted)
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32> {
        self.check_open("VIDIOC_REQBUFS")?;
        if self.format.is_none() {
            return Err(einval("VIDIOC_REQBUFS", "format not set".into()));
        }
        self.granted = self.options.max_buffers.map_or(count, |max| count.min(max));
        self.allocations = (0..self.granted).map(|_| None).collect();
        Ok(self.granted)
    }

    fn map_buffer(&mut self, index: u32) -> Result<MappedRegion> {
        self.check_open("VIDIOC_QUERYBUF")?;
        if self.options.fail_map_at == Some(index) {
            return Err(StereoError::resource(format!(
                "mmap of buffer {} on {} failed",
                index, self.identifier
            )));
        }
        let len = self
            .format
            .map(|f| f.geometry.frame_len())
            .ok_or_else(|| einval("VIDIOC_QUERYBUF", "format not set".into()))?;
        match self.allocations.get(index as usize) {
            None => return Err(einval("VIDIOC_QUERYBUF", format!("no buffer {}", index))),
            Some(Some(_)) => {
                return Err(einval(
                    "VIDIOC_QUERYBUF",
                    format!("buffer {} already mapped", index),
                ));
            }
            Some(None) => {}
        }

        let alloc = Allocation::new(len);
        let ptr = alloc.ptr;
        self.allocations[index as usize] = Some(alloc);
        self.ledger.mapped.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the allocation lives until unmap_buffer or drop
        Ok(unsafe { MappedRegion::from_raw_parts(ptr, len) })
    }

    fn unmap_buffer(&mut self, region: MappedRegion) -> Result<()> {
        let slot = self
            .allocations
            .iter_mut()
            .find(|a| a.as_ref().is_some_and(|a| a.ptr.as_ptr() == region.as_ptr()));
        match slot.and_then(Option::take) {
            Some(alloc) => {
                alloc.free();
                self.ledger.unmapped.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(einval("munmap", "region not mapped by this device".into())),
        }
    }

    fn queue_buffer(&mut self, index: u32) -> Result<()> {
        self.check_open("VIDIOC_QBUF")?;
        if index >= self.granted {
            return Err(einval("VIDIOC_QBUF", format!("no buffer {}", index)));
        }
        if self.queue.contains(&index) {
            return Err(einval("VIDIOC_QBUF", format!("buffer {} already queued", index)));
        }
        self.queue.push_back(index);
        self.ledger.queued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> Result<Option<DequeuedBuffer>> {
        self.check_open("VIDIOC_DQBUF")?;
        if !self.streaming {
            return Err(einval("VIDIOC_DQBUF", "not streaming".into()));
        }
        let format = self
            .format
            .ok_or_else(|| einval("VIDIOC_DQBUF", "format not set".into()))?;
        if self.spurious_left > 0 {
            if self.spurious_left != u32::MAX {
                self.spurious_left -= 1;
            }
            return Ok(None);
        }
        let Some(index) = self.queue.pop_front() else {
            return Ok(None);
        };

        let len = match self.allocations.get(index as usize) {
            Some(Some(alloc)) => {
                self.fill(alloc, format);
                alloc.len
            }
            _ => return Err(einval("VIDIOC_DQBUF", format!("buffer {} not mapped", index))),
        };

        let sequence = self.frame;
        self.frame = self.frame.wrapping_add(1);
        self.ledger.dequeued.fetch_add(1, Ordering::SeqCst);

        let bytes_used = if self.options.short_frames { len / 2 } else { len };
        trace!("{} delivered buffer {} (seq {})", self.identifier, index, sequence);
        Ok(Some(DequeuedBuffer {
            index,
            bytes_used,
            sequence,
        }))
    }

    fn stream_on(&mut self) -> Result<()> {
        self.check_open("VIDIOC_STREAMON")?;
        self.streaming = true;
        self.ledger.stream_ons.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stream_off(&mut self) -> Result<()> {
        self.check_open("VIDIOC_STREAMOFF")?;
        self.streaming = false;
        self.queue.clear();
        self.ledger.stream_offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<bool> {
        self.check_open("poll")?;
        if !self.streaming {
            return Err(einval("poll", "not streaming".into()));
        }
        if self.options.stall || self.queue.is_empty() {
            std::thread::sleep(timeout);
            return Ok(false);
        }
        if !self.options.frame_interval.is_zero() {
            std::thread::sleep(self.options.frame_interval.min(timeout));
        }
        Ok(true)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.streaming = false;
            self.ledger.closes.fetch_add(1, Ordering::SeqCst);
            debug!("Closed synthetic device {}", self.identifier);
        }
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        for alloc in self.allocations.drain(..).flatten() {
            alloc.free();
        }
    }
}
