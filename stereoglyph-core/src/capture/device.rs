//! Driver seam for capture devices
//!
//! [`CaptureDevice`] is the set of driver calls a [`CaptureSource`] needs to
//! run the mmap streaming protocol. The V4L2 implementation issues real
//! ioctls; the synthetic one emulates the same queue with heap memory.
//!
//! [`CaptureSource`]: super::CaptureSource

use std::ptr::NonNull;
use std::time::Duration;

use crate::error::Result;
use crate::types::FrameGeometry;

/// Geometry and pixel format as requested from, or reported by, a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequest {
    /// Frame size
    pub geometry: FrameGeometry,
    /// Pixel format fourcc
    pub fourcc: u32,
}

/// A buffer the driver handed back with a filled frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Pool index of the buffer
    pub index: u32,
    /// Number of valid bytes in the buffer
    pub bytes_used: usize,
    /// Driver frame sequence number
    pub sequence: u32,
}

/// A driver-owned memory region mapped into our address space
///
/// The region does not unmap itself; it must be handed back to the device
/// that produced it through [`CaptureDevice::unmap_buffer`]. Moving it there
/// consumes it, so a region can never be unmapped twice.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is plain memory owned by the driver; access is
// serialized by the buffer pool's ownership states.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Wrap a mapped pointer
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes that stay valid until the region is
    /// passed back to the device's `unmap_buffer`.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Base pointer
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the mapped bytes
    ///
    /// # Safety
    ///
    /// The caller must currently own the buffer (dequeued, not yet
    /// requeued), so the hardware is not writing to it.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: validity guaranteed by from_raw_parts, exclusivity by the caller
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

/// Driver operations needed by the mmap streaming protocol
pub trait CaptureDevice: Send {
    /// Device identifier (path or stub URI)
    fn identifier(&self) -> &str;

    /// Request a format; returns what the device actually configured
    fn set_format(&mut self, request: FormatRequest) -> Result<FormatRequest>;

    /// Request `count` mmap buffers; returns how many the driver granted
    fn request_buffers(&mut self, count: u32) -> Result<u32>;

    /// Map buffer `index` into process memory
    fn map_buffer(&mut self, index: u32) -> Result<MappedRegion>;

    /// Release a mapping obtained from `map_buffer`
    fn unmap_buffer(&mut self, region: MappedRegion) -> Result<()>;

    /// Hand buffer `index` to the driver's input queue
    fn queue_buffer(&mut self, index: u32) -> Result<()>;

    /// Take one filled buffer from the driver's output queue
    ///
    /// `Ok(None)` means no buffer was ready even though `wait_ready`
    /// reported one (EAGAIN on a non-blocking node).
    fn dequeue_buffer(&mut self) -> Result<Option<DequeuedBuffer>>;

    /// Start streaming
    fn stream_on(&mut self) -> Result<()>;

    /// Stop streaming; all buffers return to the application
    fn stream_off(&mut self) -> Result<()>;

    /// Block until a filled buffer is ready; `Ok(false)` on timeout
    fn wait_ready(&mut self, timeout: Duration) -> Result<bool>;

    /// Release the device handle
    fn close(&mut self);
}
