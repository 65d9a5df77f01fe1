//! Stereo fusion renderer
//!
//! Combines a left and a right frame into one displayable frame. All buffers
//! are packed RGB of identical length; the renderer owns no state.
//!
//! Supported modes:
//! - Optimized anaglyph (red/cyan, red rebuilt from the left eye's green+blue)
//! - Dubois (published least-squares red/cyan matrix)
//! - Line interlace, right- or left-dominant, for polarized displays

use serde::{Deserialize, Serialize};

use crate::error::{Result, StereoError};
use crate::types::BYTES_PER_PIXEL;

/// Stereo-to-mono reduction algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RenderMode {
    /// Right frame with its red channel rebuilt from the left eye
    #[default]
    #[serde(rename = "anaglyph")]
    OptimizedAnaglyph,
    /// Dubois red/cyan matrix
    #[serde(rename = "dubois")]
    Dubois,
    /// Interlace with the right eye on even rows at parity 0
    #[serde(rename = "interlace-rl")]
    InterlaceRightLeft,
    /// Interlace with the left eye on even rows at parity 0
    #[serde(rename = "interlace-lr")]
    InterlaceLeftRight,
}

impl RenderMode {
    /// All modes in cycle order
    pub const ALL: [RenderMode; 4] = [
        Self::OptimizedAnaglyph,
        Self::Dubois,
        Self::InterlaceRightLeft,
        Self::InterlaceLeftRight,
    ];

    /// The mode that follows this one, wrapping around
    pub fn next(self) -> Self {
        match self {
            Self::OptimizedAnaglyph => Self::Dubois,
            Self::Dubois => Self::InterlaceRightLeft,
            Self::InterlaceRightLeft => Self::InterlaceLeftRight,
            Self::InterlaceLeftRight => Self::OptimizedAnaglyph,
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OptimizedAnaglyph => "Optimized anaglyph",
            Self::Dubois => "Dubois",
            Self::InterlaceRightLeft => "Interlace (R-L)",
            Self::InterlaceLeftRight => "Interlace (L-R)",
        }
    }

    /// Config file / CLI token
    pub fn token(&self) -> &'static str {
        match self {
            Self::OptimizedAnaglyph => "anaglyph",
            Self::Dubois => "dubois",
            Self::InterlaceRightLeft => "interlace-rl",
            Self::InterlaceLeftRight => "interlace-lr",
        }
    }

    /// Whether this is one of the interlace modes
    pub fn is_interlace(&self) -> bool {
        matches!(self, Self::InterlaceRightLeft | Self::InterlaceLeftRight)
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for RenderMode {
    type Err = StereoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anaglyph" | "optimized-anaglyph" | "optimized" => Ok(Self::OptimizedAnaglyph),
            "dubois" => Ok(Self::Dubois),
            "interlace-rl" | "interlace-right" | "rl" => Ok(Self::InterlaceRightLeft),
            "interlace-lr" | "interlace-left" | "lr" => Ok(Self::InterlaceLeftRight),
            _ => Err(StereoError::configuration(format!(
                "Unknown render mode '{}'. Valid options: anaglyph, dubois, interlace-rl, interlace-lr",
                s
            ))),
        }
    }
}

/// Dubois coefficients, rows are output channels (R, G, B), columns are
/// L.r, L.g, L.b, R.r, R.g, R.b
const DUBOIS: [[f64; 6]; 3] = [
    [0.456, 0.500, 0.176, -0.043, -0.088, -0.002],
    [-0.040, -0.038, -0.016, 0.378, 0.734, -0.018],
    [-0.015, -0.021, -0.005, -0.072, -0.113, 1.226],
];

/// Fuse `left` and `right` into `out`
///
/// `width` is the frame width in pixels and only matters for the interlace
/// modes. `parity` is the scanline phase of the output on the physical
/// display; only its low bit is used.
///
/// All three buffers must have the same length, a whole number of pixels.
/// On error `out` is left untouched.
pub fn render(
    left: &[u8],
    right: &[u8],
    out: &mut [u8],
    mode: RenderMode,
    width: usize,
    parity: u32,
) -> Result<()> {
    check_buffers(left, right, out, width)?;

    match mode {
        RenderMode::OptimizedAnaglyph => render_anaglyph(left, right, out),
        RenderMode::Dubois => render_dubois(left, right, out),
        RenderMode::InterlaceRightLeft | RenderMode::InterlaceLeftRight => {
            render_interlace(left, right, out, mode, width, parity)
        }
    }

    Ok(())
}

fn check_buffers(left: &[u8], right: &[u8], out: &[u8], width: usize) -> Result<()> {
    if left.len() != right.len() || left.len() != out.len() {
        return Err(StereoError::invalid_frame(format!(
            "buffer lengths differ (left {}, right {}, out {})",
            left.len(),
            right.len(),
            out.len()
        )));
    }
    if left.len() % BYTES_PER_PIXEL != 0 {
        return Err(StereoError::invalid_frame(format!(
            "length {} is not a whole number of pixels",
            left.len()
        )));
    }
    if width == 0 {
        return Err(StereoError::invalid_frame("width must be non-zero"));
    }
    Ok(())
}

fn render_anaglyph(left: &[u8], right: &[u8], out: &mut [u8]) {
    // blue and green pass through from the right eye
    out.copy_from_slice(right);

    let left_px: &[[u8; 3]] = bytemuck::cast_slice(left);
    let out_px: &mut [[u8; 3]] = bytemuck::cast_slice_mut(out);
    for (o, l) in out_px.iter_mut().zip(left_px) {
        o[0] = (f64::from(l[2]) * 0.3 + f64::from(l[1]) * 0.7) as u8;
    }
}

fn render_dubois(left: &[u8], right: &[u8], out: &mut [u8]) {
    let left_px: &[[u8; 3]] = bytemuck::cast_slice(left);
    let right_px: &[[u8; 3]] = bytemuck::cast_slice(right);
    let out_px: &mut [[u8; 3]] = bytemuck::cast_slice_mut(out);

    for ((o, l), r) in out_px.iter_mut().zip(left_px).zip(right_px) {
        let input = [l[0], l[1], l[2], r[0], r[1], r[2]].map(f64::from);
        for (channel, row) in o.iter_mut().zip(&DUBOIS) {
            // products are summed in f64, the sum is held in f32
            let k: f64 = row.iter().zip(&input).map(|(c, v)| c * v).sum();
            *channel = saturate(k as f32);
        }
    }
}

/// Clamp to [0, 255] and truncate
fn saturate(k: f32) -> u8 {
    if k > 255.0 {
        255
    } else if k < 0.0 {
        0
    } else {
        k as u8
    }
}

fn render_interlace(
    left: &[u8],
    right: &[u8],
    out: &mut [u8],
    mode: RenderMode,
    width: usize,
    parity: u32,
) {
    let stride = width * BYTES_PER_PIXEL;

    // 0 = left dominant
    let mut side = parity & 1;
    if mode == RenderMode::InterlaceRightLeft {
        side ^= 1;
    }
    let (dominant, other) = if side == 0 { (left, right) } else { (right, left) };

    out.copy_from_slice(dominant);
    let mut offset = stride;
    while offset < out.len() {
        let end = (offset + stride).min(out.len());
        out[offset..end].copy_from_slice(&other[offset..end]);
        offset += 2 * stride;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_cycle_wraps() {
        let mut mode = RenderMode::OptimizedAnaglyph;
        for expected in RenderMode::ALL.iter().skip(1) {
            mode = mode.next();
            assert_eq!(mode, *expected);
        }
        assert_eq!(mode.next(), RenderMode::OptimizedAnaglyph);
    }

    #[test]
    fn test_mode_tokens_parse() {
        for mode in RenderMode::ALL {
            assert_eq!(mode.token().parse::<RenderMode>().unwrap(), mode);
        }
        assert!("sepia".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(-3.2), 0);
        assert_eq!(saturate(300.0), 255);
        assert_eq!(saturate(12.9), 12);
        // just below a whole number in f64 rounds up once narrowed
        assert_eq!(saturate(254.99999999999997_f64 as f32), 255);
    }

    #[test]
    fn test_anaglyph_red_from_left() {
        let left = [0u8, 100, 200];
        let right = [7u8, 8, 9];
        let mut out = [0u8; 3];
        render(&left, &right, &mut out, RenderMode::OptimizedAnaglyph, 1, 0).unwrap();
        // 0.3 * 200 + 0.7 * 100 = 130
        assert_eq!(out, [130, 8, 9]);
    }

    #[test]
    fn test_mismatched_lengths_leave_output() {
        let left = [1u8; 6];
        let right = [2u8; 3];
        let mut out = [42u8; 6];
        assert!(render(&left, &right, &mut out, RenderMode::Dubois, 2, 0).is_err());
        assert_eq!(out, [42u8; 6]);
    }
}
