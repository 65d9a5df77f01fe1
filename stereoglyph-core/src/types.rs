//! Core types for Stereoglyph
//!
//! These types represent the fundamental data structures shared by the
//! capture, render and output stages.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StereoError};

/// Bytes per pixel of the packed 24-bit layouts we support
pub const BYTES_PER_PIXEL: usize = 3;

/// Global handle counter for unique pipeline IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Which camera of the stereo pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eye {
    /// Left camera
    Left,
    /// Right camera
    Right,
}

impl Eye {
    /// The other eye
    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl std::fmt::Display for Eye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eye::Left => write!(f, "left"),
            Eye::Right => write!(f, "right"),
        }
    }
}

/// Fixed frame geometry shared by both cameras and the output
///
/// Always packed 3 bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameGeometry {
    /// Create a new geometry
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes per scanline
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Length of one frame in bytes
    pub fn frame_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    /// Check that the geometry is usable
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StereoError::configuration(format!(
                "Frame geometry must be non-zero, got {}",
                self
            )));
        }
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| StereoError::configuration(format!("Frame geometry {} overflows", self)))?;
        Ok(())
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Channel order of a packed 24-bit pixel
///
/// Internal buffers are always [`PixelOrder::Rgb`]; devices may deliver
/// either and are normalized on copy-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelOrder {
    /// R, G, B
    #[default]
    Rgb,
    /// B, G, R
    Bgr,
}

impl PixelOrder {
    /// Config file / CLI token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Bgr => "bgr",
        }
    }
}

impl std::str::FromStr for PixelOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rgb" | "rgb24" | "rgb3" => Ok(Self::Rgb),
            "bgr" | "bgr24" | "bgr3" => Ok(Self::Bgr),
            _ => Err(format!("Unknown pixel order: {}", s)),
        }
    }
}

impl std::fmt::Display for PixelOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Application-owned copy of one camera's most recent frame
///
/// Always exactly `geometry.frame_len()` bytes, canonical RGB order.
#[derive(Debug, Clone)]
pub struct WorkingFrame {
    geometry: FrameGeometry,
    data: Vec<u8>,
}

impl WorkingFrame {
    /// Allocate a zeroed frame
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            data: vec![0; geometry.frame_len()],
        }
    }

    /// Wrap existing pixel data, checking its length
    pub fn from_vec(geometry: FrameGeometry, data: Vec<u8>) -> Result<Self> {
        if data.len() != geometry.frame_len() {
            return Err(StereoError::invalid_frame(format!(
                "expected {} bytes for {}, got {}",
                geometry.frame_len(),
                geometry,
                data.len()
            )));
        }
        Ok(Self { geometry, data })
    }

    /// Frame geometry
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Pixel data
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel data
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame holds no pixels
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for WorkingFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Copy packed pixels from `src` into `dst`, converting `order` to RGB
///
/// Copies `min(src.len(), dst.len())` bytes rounded down to whole pixels and
/// returns the byte count.
pub fn copy_to_rgb(src: &[u8], dst: &mut [u8], order: PixelOrder) -> usize {
    let len = src.len().min(dst.len()) / BYTES_PER_PIXEL * BYTES_PER_PIXEL;
    match order {
        PixelOrder::Rgb => dst[..len].copy_from_slice(&src[..len]),
        PixelOrder::Bgr => {
            let src_px: &[[u8; 3]] = bytemuck::cast_slice(&src[..len]);
            let dst_px: &mut [[u8; 3]] = bytemuck::cast_slice_mut(&mut dst[..len]);
            for (d, s) in dst_px.iter_mut().zip(src_px) {
                *d = [s[2], s[1], s[0]];
            }
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_lengths() {
        let g = FrameGeometry::default();
        assert_eq!(g.stride(), 640 * 3);
        assert_eq!(g.frame_len(), 640 * 480 * 3);
        assert!(g.validate().is_ok());
        assert!(FrameGeometry::new(0, 480).validate().is_err());
    }

    #[test]
    fn test_copy_to_rgb_swaps_bgr() {
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 6];
        assert_eq!(copy_to_rgb(&src, &mut dst, PixelOrder::Bgr), 6);
        assert_eq!(dst, [3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_copy_to_rgb_short_source() {
        let src = [9u8; 4];
        let mut dst = [0u8; 6];
        assert_eq!(copy_to_rgb(&src, &mut dst, PixelOrder::Rgb), 3);
        assert_eq!(dst, [9, 9, 9, 0, 0, 0]);
    }

    #[test]
    fn test_working_frame_length_checked() {
        let g = FrameGeometry::new(2, 2);
        assert!(WorkingFrame::from_vec(g, vec![0; 12]).is_ok());
        assert!(WorkingFrame::from_vec(g, vec![0; 11]).is_err());
    }

    #[test]
    fn test_pixel_order_parse() {
        assert_eq!("BGR24".parse::<PixelOrder>(), Ok(PixelOrder::Bgr));
        assert!("yuyv".parse::<PixelOrder>().is_err());
    }
}
