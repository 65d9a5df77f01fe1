//! Stereo fusion properties

mod mocks;

use mocks::{TEST_GEOMETRY, gradient_frame, row_tagged_frame, solid_frame};
use stereoglyph_core::render::{RenderMode, render};
use stereoglyph_core::types::FrameGeometry;

fn fuse(left: &[u8], right: &[u8], mode: RenderMode, width: u32, parity: u32) -> Vec<u8> {
    let mut out = vec![0u8; left.len()];
    render(left, right, &mut out, mode, width as usize, parity).unwrap();
    out
}

#[test]
fn test_output_length_matches_for_all_modes() {
    for geometry in [
        FrameGeometry::new(1, 1),
        FrameGeometry::new(3, 5),
        FrameGeometry::new(7, 2),
        TEST_GEOMETRY,
    ] {
        let left = gradient_frame(geometry);
        let right = solid_frame(geometry, [9, 99, 199]);
        for mode in RenderMode::ALL {
            for parity in [0, 1] {
                let out = fuse(&left, &right, mode, geometry.width, parity);
                assert_eq!(out.len(), geometry.frame_len(), "{} {}", mode, geometry);
            }
        }
    }
}

#[test]
fn test_anaglyph_keeps_right_green_and_blue() {
    let left = gradient_frame(TEST_GEOMETRY);
    let right = row_tagged_frame(TEST_GEOMETRY, 40);
    let out = fuse(&left, &right, RenderMode::OptimizedAnaglyph, TEST_GEOMETRY.width, 0);

    for ((o, l), r) in out
        .chunks_exact(3)
        .zip(left.chunks_exact(3))
        .zip(right.chunks_exact(3))
    {
        assert_eq!(o[1], r[1]);
        assert_eq!(o[2], r[2]);
        let expected = (f64::from(l[2]) * 0.3 + f64::from(l[1]) * 0.7) as u8;
        assert_eq!(o[0], expected);
    }
}

#[test]
fn test_anaglyph_red_saturates() {
    let left = [0u8, 255, 255];
    let right = [0u8, 0, 0];
    let out = fuse(&left, &right, RenderMode::OptimizedAnaglyph, 1, 0);
    assert_eq!(out, vec![255, 0, 0]);
}

#[test]
fn test_dubois_white_input_clamped() {
    let white = solid_frame(TEST_GEOMETRY, [255, 255, 255]);
    let out = fuse(&white, &white, RenderMode::Dubois, TEST_GEOMETRY.width, 0);

    for px in out.chunks_exact(3) {
        // red: (0.456 + 0.5 + 0.176 - 0.043 - 0.088 - 0.002) * 255 = 254.745
        assert_eq!(px[0], 254);
        // green: row sums to 1.0; in f64 the sum lands at 254.99999999999997
        // and narrowing to f32 brings it to 255
        assert_eq!(px[1], 255);
        // blue: row sums to 1.0
        assert_eq!(px[2], 255);
    }
}

#[test]
fn test_dubois_zero_input_is_zero() {
    let black = solid_frame(TEST_GEOMETRY, [0, 0, 0]);
    let out = fuse(&black, &black, RenderMode::Dubois, TEST_GEOMETRY.width, 0);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn test_dubois_negative_clamps_to_zero() {
    // only the right eye's red is lit; blue row has -0.072 * 255 < 0
    let left = [0u8, 0, 0];
    let right = [255u8, 0, 0];
    let out = fuse(&left, &right, RenderMode::Dubois, 1, 0);
    assert_eq!(out[0], 0);
    assert_eq!(out[1], (0.378f64 * 255.0) as u8);
    assert_eq!(out[2], 0);
}

#[test]
fn test_interlace_left_dominant_at_parity_zero() {
    // width 4 gives a 12-byte stride
    let geometry = FrameGeometry::new(4, 6);
    assert_eq!(geometry.stride(), 12);
    let left = row_tagged_frame(geometry, 0);
    let right = row_tagged_frame(geometry, 100);

    let out = fuse(&left, &right, RenderMode::InterlaceLeftRight, 4, 0);
    for (row, line) in out.chunks_exact(12).enumerate() {
        let expected = if row % 2 == 0 { &left } else { &right };
        assert_eq!(line, &expected[row * 12..(row + 1) * 12], "row {}", row);
    }
}

#[test]
fn test_interlace_parity_swaps_eyes() {
    let geometry = FrameGeometry::new(4, 6);
    let left = row_tagged_frame(geometry, 0);
    let right = row_tagged_frame(geometry, 100);

    let out = fuse(&left, &right, RenderMode::InterlaceLeftRight, 4, 1);
    for (row, line) in out.chunks_exact(12).enumerate() {
        let expected = if row % 2 == 0 { &right } else { &left };
        assert_eq!(line, &expected[row * 12..(row + 1) * 12], "row {}", row);
    }
}

#[test]
fn test_interlace_right_left_is_mirror() {
    let geometry = FrameGeometry::new(4, 5);
    let left = row_tagged_frame(geometry, 0);
    let right = row_tagged_frame(geometry, 100);

    for parity in [0, 1] {
        let rl = fuse(&left, &right, RenderMode::InterlaceRightLeft, 4, parity);
        let lr = fuse(&left, &right, RenderMode::InterlaceLeftRight, 4, parity ^ 1);
        assert_eq!(rl, lr);
    }
}

#[test]
fn test_interlace_partial_last_row() {
    // length not a multiple of the stride: the tail is clamped, not overrun
    let left = vec![1u8; 18];
    let right = vec![2u8; 18];
    let out = fuse(&left, &right, RenderMode::InterlaceLeftRight, 4, 0);
    assert_eq!(&out[..12], &[1u8; 12]);
    assert_eq!(&out[12..], &[2u8; 6]);
}

#[test]
fn test_parity_uses_low_bit_only() {
    let geometry = FrameGeometry::new(4, 4);
    let left = row_tagged_frame(geometry, 0);
    let right = row_tagged_frame(geometry, 100);
    assert_eq!(
        fuse(&left, &right, RenderMode::InterlaceLeftRight, 4, 6),
        fuse(&left, &right, RenderMode::InterlaceLeftRight, 4, 0)
    );
}

#[test]
fn test_invalid_buffers_rejected() {
    let mut out = vec![7u8; 6];
    assert!(render(&[0; 6], &[0; 6], &mut out, RenderMode::Dubois, 0, 0).is_err());
    assert!(render(&[0; 5], &[0; 5], &mut out[..5], RenderMode::Dubois, 1, 0).is_err());
    assert!(render(&[0; 6], &[0; 3], &mut out, RenderMode::Dubois, 1, 0).is_err());
    assert_eq!(out, vec![7u8; 6]);
}
