//! V4L2 capture device
//!
//! Built on the `v4l` crate with its `libv4l` backend, so the node is opened
//! and driven through libv4l2. That library converts YUYV and MJPEG webcams
//! to the packed RGB24/BGR24 format we request. Buffers are still requested,
//! mapped and queued one ioctl at a time so the pool can track each index.

use std::io;
use std::mem;
use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::format::{FieldOrder, Format};
use v4l::memory::Memory;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::v4l2::{self as sys, vidioc};
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::device::{CaptureDevice, DequeuedBuffer, FormatRequest, MappedRegion};
use crate::error::{Result, StereoError};
use crate::types::FrameGeometry;

/// Issue an ioctl through libv4l2, retrying on EINTR
///
/// # Safety
///
/// `arg` must be the struct type the kernel expects for `request`.
unsafe fn xioctl<T>(fd: c_int, request: vidioc::_IOC_TYPE, name: &str, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: upheld by the caller
        match unsafe { sys::ioctl(fd, request, arg as *mut T as *mut c_void) } {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("{} interrupted, retrying", name);
            }
            other => return other,
        }
    }
}

fn mmap_buffer(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: v4l2_buffer is a plain C struct; zero is its initial state
        ..unsafe { mem::zeroed() }
    }
}

// ----------------------------------------------------------------------------
// Device capabilities (for listing)
// ----------------------------------------------------------------------------

/// Identity and capabilities of a V4L2 node
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device path
    pub path: String,
    /// Driver name
    pub driver: String,
    /// Card (device) name
    pub card: String,
    /// Bus location
    pub bus_info: String,
    /// Supports video capture
    pub capture: bool,
    /// Supports streaming I/O
    pub streaming: bool,
}

impl DeviceInfo {
    /// Whether this node can be used as a capture source
    pub fn is_usable(&self) -> bool {
        self.capture && self.streaming
    }
}

/// Query a node's capabilities without configuring it
pub fn query_device(path: impl AsRef<Path>) -> Result<DeviceInfo> {
    let path = path.as_ref();
    let device = open_node(path)?;
    let caps = device
        .query_caps()
        .map_err(|e| StereoError::device_io("VIDIOC_QUERYCAP", e))?;

    Ok(DeviceInfo {
        path: path.display().to_string(),
        driver: caps.driver,
        card: caps.card,
        bus_info: caps.bus,
        capture: caps.capabilities.contains(Flags::VIDEO_CAPTURE),
        streaming: caps.capabilities.contains(Flags::STREAMING),
    })
}

fn open_node(path: &Path) -> Result<Device> {
    Device::with_path(path).map_err(|e| StereoError::device_io(format!("open {}", path.display()), e))
}

// ----------------------------------------------------------------------------
// Capture device
// ----------------------------------------------------------------------------

/// A V4L2 capture node driven through mmap streaming I/O
pub struct V4l2Device {
    path: String,
    device: Option<Device>,
}

impl V4l2Device {
    /// Open a device node
    pub fn open(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let device = open_node(Path::new(&path))?;
        debug!("Opened V4L2 device {}", path);
        Ok(Self {
            path,
            device: Some(device),
        })
    }

    fn device(&self) -> Result<&Device> {
        self.device.as_ref().ok_or_else(|| {
            StereoError::Unsupported(format!("V4L2 device {} is closed", self.path))
        })
    }

    fn fd(&self) -> Result<c_int> {
        Ok(self.device()?.handle().fd())
    }

    fn stream_ioctl(&mut self, request: vidioc::_IOC_TYPE, name: &str) -> Result<()> {
        let fd = self.fd()?;
        let mut buf_type = Type::VideoCapture as u32;
        // SAFETY: STREAMON/STREAMOFF take the buffer type as a u32
        unsafe { xioctl(fd, request, name, &mut buf_type) }.map_err(|e| StereoError::device_io(name, e))
    }
}

impl CaptureDevice for V4l2Device {
    fn identifier(&self) -> &str {
        &self.path
    }

    fn set_format(&mut self, request: FormatRequest) -> Result<FormatRequest> {
        let device = self.device()?;
        let mut wanted = Format::new(
            request.geometry.width,
            request.geometry.height,
            FourCC::new(&request.fourcc.to_le_bytes()),
        );
        wanted.field_order = FieldOrder::Interlaced;

        let got = device
            .set_format(&wanted)
            .map_err(|e| StereoError::device_io("VIDIOC_S_FMT", e))?;
        debug!("{} negotiated {}x{} {}", self.path, got.width, got.height, got.fourcc);
        Ok(FormatRequest {
            geometry: FrameGeometry::new(got.width, got.height),
            fourcc: u32::from_le_bytes(got.fourcc.repr),
        })
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32> {
        let fd = self.fd()?;
        let mut req = v4l2_requestbuffers {
            count,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            // SAFETY: plain C struct
            ..unsafe { mem::zeroed() }
        };
        // SAFETY: REQBUFS takes a v4l2_requestbuffers
        unsafe { xioctl(fd, vidioc::VIDIOC_REQBUFS, "VIDIOC_REQBUFS", &mut req) }
            .map_err(|e| StereoError::device_io("VIDIOC_REQBUFS", e))?;
        Ok(req.count)
    }

    fn map_buffer(&mut self, index: u32) -> Result<MappedRegion> {
        let fd = self.fd()?;
        let mut buf = mmap_buffer(index);
        // SAFETY: QUERYBUF takes a v4l2_buffer
        unsafe { xioctl(fd, vidioc::VIDIOC_QUERYBUF, "VIDIOC_QUERYBUF", &mut buf) }
            .map_err(|e| StereoError::device_io("VIDIOC_QUERYBUF", e))?;

        let len = buf.length as usize;
        // SAFETY: QUERYBUF on an MMAP buffer fills in `offset`, and the
        // mapping uses exactly the length and offset the driver reported
        let mapped = unsafe {
            sys::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                buf.m.offset as libc::off_t,
            )
        }
        .map_err(|e| {
            StereoError::resource(format!("mmap of buffer {} on {} failed: {}", index, self.path, e))
        })?;

        let ptr = NonNull::new(mapped as *mut u8)
            .ok_or_else(|| StereoError::resource(format!("mmap of buffer {} returned null", index)))?;
        trace!("Mapped buffer {} of {} ({} bytes)", index, self.path, len);
        // SAFETY: the mapping stays valid until munmap in unmap_buffer
        Ok(unsafe { MappedRegion::from_raw_parts(ptr, len) })
    }

    fn unmap_buffer(&mut self, region: MappedRegion) -> Result<()> {
        // SAFETY: region came from our mmap and is consumed here
        unsafe { sys::munmap(region.as_ptr() as *mut c_void, region.len()) }
            .map_err(|e| StereoError::device_io("munmap", e))
    }

    fn queue_buffer(&mut self, index: u32) -> Result<()> {
        let fd = self.fd()?;
        let mut buf = mmap_buffer(index);
        // SAFETY: QBUF takes a v4l2_buffer
        unsafe { xioctl(fd, vidioc::VIDIOC_QBUF, "VIDIOC_QBUF", &mut buf) }
            .map_err(|e| StereoError::device_io("VIDIOC_QBUF", e))
    }

    fn dequeue_buffer(&mut self) -> Result<Option<DequeuedBuffer>> {
        let fd = self.fd()?;
        let mut buf = mmap_buffer(0);
        // SAFETY: DQBUF takes a v4l2_buffer
        match unsafe { xioctl(fd, vidioc::VIDIOC_DQBUF, "VIDIOC_DQBUF", &mut buf) } {
            Ok(()) => Ok(Some(DequeuedBuffer {
                index: buf.index,
                bytes_used: buf.bytesused as usize,
                sequence: buf.sequence,
            })),
            // the node is non-blocking; poll woke us before a frame was done
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(StereoError::device_io("VIDIOC_DQBUF", e)),
        }
    }

    fn stream_on(&mut self) -> Result<()> {
        self.stream_ioctl(vidioc::VIDIOC_STREAMON, "VIDIOC_STREAMON")
    }

    fn stream_off(&mut self) -> Result<()> {
        self.stream_ioctl(vidioc::VIDIOC_STREAMOFF, "VIDIOC_STREAMOFF")
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<bool> {
        let fd = self.fd()?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ms = remaining.as_millis().min(c_int::MAX as u128) as c_int;
            // SAFETY: one valid pollfd
            let r = unsafe { libc::poll(&mut pfd, 1, ms) };
            match r {
                -1 => {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(StereoError::device_io("poll", err));
                }
                0 => return Ok(false),
                _ if pfd.revents & libc::POLLERR != 0 => {
                    return Err(StereoError::device_io(
                        "poll",
                        io::Error::other("device reported POLLERR"),
                    ));
                }
                _ => return Ok(true),
            }
        }
    }

    fn close(&mut self) {
        // dropping the v4l handle closes the node
        if self.device.take().is_some() {
            debug!("Closed V4L2 device {}", self.path);
        }
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        if self.device.is_some() {
            warn!("V4L2 device {} dropped without close", self.path);
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmap_buffer_request() {
        let buf = mmap_buffer(3);
        assert_eq!(buf.index, 3);
        assert_eq!(buf.type_, Type::VideoCapture as u32);
        assert_eq!(buf.memory, Memory::Mmap as u32);
        assert_eq!(buf.bytesused, 0);
    }

    #[test]
    fn test_missing_node_is_device_error() {
        let err = V4l2Device::open("/dev/stereoglyph-missing-node")
            .err()
            .expect("opening a missing node must fail");
        assert!(matches!(err, StereoError::DeviceIo { .. }));
    }

    #[test]
    #[ignore = "Requires a V4L2 camera at /dev/video0"]
    fn test_query_real_device() {
        let info = query_device("/dev/video0").expect("query /dev/video0");
        assert!(!info.driver.is_empty());
    }
}
