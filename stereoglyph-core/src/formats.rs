//! Pixel format constants and conversions
//!
//! Centralizes V4L2 fourcc handling so the capture layer and the CLI agree
//! on format codes and names.

use crate::types::PixelOrder;

/// Build a fourcc code from its four ASCII characters
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// V4L2 pixel format fourcc constants
///
/// See: <https://www.kernel.org/doc/html/latest/userspace-api/media/v4l/pixfmt-rgb.html>
pub mod v4l2 {
    use super::fourcc;

    /// RGB24 - packed 24-bit R, G, B
    pub const RGB24: u32 = fourcc(b"RGB3");
    /// BGR24 - packed 24-bit B, G, R
    pub const BGR24: u32 = fourcc(b"BGR3");
    /// YUYV - YUV 4:2:2 packed
    pub const YUYV: u32 = fourcc(b"YUYV");
    /// MJPEG - motion JPEG
    pub const MJPEG: u32 = fourcc(b"MJPG");
}

/// The fourcc to request for a given channel order
pub fn fourcc_for_order(order: PixelOrder) -> u32 {
    match order {
        PixelOrder::Rgb => v4l2::RGB24,
        PixelOrder::Bgr => v4l2::BGR24,
    }
}

/// Channel order for a fourcc, if it is one of the packed 24-bit formats
pub fn order_for_fourcc(code: u32) -> Option<PixelOrder> {
    match code {
        v4l2::RGB24 => Some(PixelOrder::Rgb),
        v4l2::BGR24 => Some(PixelOrder::Bgr),
        _ => None,
    }
}

/// Format name for diagnostics
pub fn format_name(code: u32) -> String {
    let bytes = code.to_le_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        format!("0x{:08x}", code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_values() {
        assert_eq!(v4l2::RGB24, 0x3342_4752);
        assert_eq!(v4l2::BGR24, 0x3352_4742);
        assert_eq!(v4l2::YUYV, 0x5659_5559);
    }

    #[test]
    fn test_order_round_trip() {
        for order in [PixelOrder::Rgb, PixelOrder::Bgr] {
            assert_eq!(order_for_fourcc(fourcc_for_order(order)), Some(order));
        }
        assert_eq!(order_for_fourcc(v4l2::MJPEG), None);
    }

    #[test]
    fn test_format_name() {
        assert_eq!(format_name(v4l2::RGB24), "RGB3");
        assert_eq!(format_name(0x0000_0001), "0x00000001");
    }
}
