//! VP8 intra and inter prediction
//!
//! Intra predictors read already-reconstructed (unfiltered) neighbours from
//! the plane being decoded. Outside the frame the row above reads 127 and
//! the column to the left reads 129.
//!
//! Inter predictors read from a reference plane with edge clamping and apply
//! the six-tap or bilinear subpixel filters in two passes, horizontal first.

use super::header::InterpolationFilter;
use super::raster::Plane;
use super::tables::{ChromaMode, LumaMode, SubblockMode, BILINEAR_FILTERS, SIXTAP_FILTERS};

const ABOVE_EDGE: u8 = 127;
const LEFT_EDGE: u8 = 129;

/// Whole-block intra modes shared by 16x16 luma and 8x8 chroma
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Dc,
    Vertical,
    Horizontal,
    TrueMotion,
}

impl From<ChromaMode> for BlockMode {
    fn from(mode: ChromaMode) -> Self {
        match mode {
            ChromaMode::Dc => BlockMode::Dc,
            ChromaMode::V => BlockMode::Vertical,
            ChromaMode::H => BlockMode::Horizontal,
            ChromaMode::Tm => BlockMode::TrueMotion,
        }
    }
}

impl BlockMode {
    /// Whole-block mode of a luma mode, `None` for per-subblock prediction
    pub fn from_luma(mode: LumaMode) -> Option<Self> {
        match mode {
            LumaMode::Dc => Some(BlockMode::Dc),
            LumaMode::V => Some(BlockMode::Vertical),
            LumaMode::H => Some(BlockMode::Horizontal),
            LumaMode::Tm => Some(BlockMode::TrueMotion),
            LumaMode::B => None,
        }
    }
}

#[inline]
fn avg2(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16 + 1) >> 1) as u8
}

#[inline]
fn avg3(a: u8, b: u8, c: u8) -> u8 {
    ((a as u16 + 2 * b as u16 + c as u16 + 2) >> 2) as u8
}

#[inline]
fn corner(plane: &Plane, x: usize, y: usize) -> u8 {
    if y == 0 {
        ABOVE_EDGE
    } else if x == 0 {
        LEFT_EDGE
    } else {
        plane.at(x - 1, y - 1)
    }
}

/// Predict a `size`x`size` block at (`x`, `y`) in place
///
/// Used for 16x16 luma and 8x8 chroma; block edges coincide with
/// macroblock edges, so availability follows the frame border.
pub fn predict_block(plane: &mut Plane, x: usize, y: usize, size: usize, mode: BlockMode) {
    let mut above = [ABOVE_EDGE; 16];
    let mut left = [LEFT_EDGE; 16];
    if y > 0 {
        above[..size].copy_from_slice(&plane.row(y - 1)[x..x + size]);
    }
    if x > 0 {
        for (i, px) in left[..size].iter_mut().enumerate() {
            *px = plane.at(x - 1, y + i);
        }
    }
    let p = corner(plane, x, y);
    let stride = plane.stride();
    let data = plane.data_mut();

    match mode {
        BlockMode::Dc => {
            let shift = size.trailing_zeros();
            let value = match (y > 0, x > 0) {
                (true, true) => {
                    let sum: u32 = above[..size].iter().chain(&left[..size]).map(|&v| v as u32).sum();
                    (sum + size as u32) >> (shift + 1)
                }
                (true, false) => {
                    let sum: u32 = above[..size].iter().map(|&v| v as u32).sum();
                    (sum + (size as u32 >> 1)) >> shift
                }
                (false, true) => {
                    let sum: u32 = left[..size].iter().map(|&v| v as u32).sum();
                    (sum + (size as u32 >> 1)) >> shift
                }
                (false, false) => 128,
            } as u8;
            for row in 0..size {
                let start = (y + row) * stride + x;
                data[start..start + size].fill(value);
            }
        }
        BlockMode::Vertical => {
            for row in 0..size {
                let start = (y + row) * stride + x;
                data[start..start + size].copy_from_slice(&above[..size]);
            }
        }
        BlockMode::Horizontal => {
            for (row, &value) in left[..size].iter().enumerate() {
                let start = (y + row) * stride + x;
                data[start..start + size].fill(value);
            }
        }
        BlockMode::TrueMotion => {
            for (row, &l) in left[..size].iter().enumerate() {
                let start = (y + row) * stride + x;
                for (col, &a) in above[..size].iter().enumerate() {
                    data[start + col] = (l as i32 + a as i32 - p as i32).clamp(0, 255) as u8;
                }
            }
        }
    }
}

/// Edges of one 4x4 luma subblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubblockEdges {
    /// Four pixels above followed by four above-right
    pub above: [u8; 8],
    pub left: [u8; 4],
    pub above_left: u8,
}

impl SubblockEdges {
    /// Gather the edges of subblock `index` (raster order) of the
    /// macroblock whose top-left luma pixel is (`mb_x`, `mb_y`)
    ///
    /// The above-right pixels of the rightmost subblock column come from
    /// the macroblock row above for every subblock row.
    pub fn gather(plane: &Plane, mb_x: usize, mb_y: usize, index: usize) -> Self {
        let bx = index & 3;
        let by = index >> 2;
        let x = mb_x + bx * 4;
        let y = mb_y + by * 4;

        let mut above = [ABOVE_EDGE; 8];
        if y > 0 {
            above[..4].copy_from_slice(&plane.row(y - 1)[x..x + 4]);
        }
        if bx < 3 {
            if y > 0 {
                above[4..].copy_from_slice(&plane.row(y - 1)[x + 4..x + 8]);
            }
        } else if mb_y > 0 {
            let row = plane.row(mb_y - 1);
            if mb_x + 20 <= plane.width() {
                above[4..].copy_from_slice(&row[mb_x + 16..mb_x + 20]);
            } else {
                above[4..].fill(row[mb_x + 15]);
            }
        }

        let mut left = [LEFT_EDGE; 4];
        if x > 0 {
            for (i, px) in left.iter_mut().enumerate() {
                *px = plane.at(x - 1, y + i);
            }
        }

        SubblockEdges {
            above,
            left,
            above_left: corner(plane, x, y),
        }
    }
}

/// Predict one 4x4 subblock, returning the pixels in raster order
pub fn predict_subblock(mode: SubblockMode, edges: &SubblockEdges) -> [u8; 16] {
    let a = &edges.above;
    let l = &edges.left;
    let p = edges.above_left;
    // Left column bottom to top, the corner, then the above row
    let e = [l[3], l[2], l[1], l[0], p, a[0], a[1], a[2], a[3]];
    let mut b = [0u8; 16];

    match mode {
        SubblockMode::Dc => {
            let sum: u32 = a[..4].iter().chain(l.iter()).map(|&v| v as u32).sum();
            b.fill(((sum + 4) >> 3) as u8);
        }
        SubblockMode::Tm => {
            for r in 0..4 {
                for c in 0..4 {
                    b[r * 4 + c] = (l[r] as i32 + a[c] as i32 - p as i32).clamp(0, 255) as u8;
                }
            }
        }
        SubblockMode::Ve => {
            for c in 0..4 {
                let left_of = if c == 0 { p } else { a[c - 1] };
                let value = avg3(left_of, a[c], a[c + 1]);
                for r in 0..4 {
                    b[r * 4 + c] = value;
                }
            }
        }
        SubblockMode::He => {
            let rows = [
                avg3(p, l[0], l[1]),
                avg3(l[0], l[1], l[2]),
                avg3(l[1], l[2], l[3]),
                avg3(l[2], l[3], l[3]),
            ];
            for (r, &value) in rows.iter().enumerate() {
                b[r * 4..r * 4 + 4].fill(value);
            }
        }
        SubblockMode::Ld => {
            for r in 0..4 {
                for c in 0..4 {
                    let i = r + c;
                    b[r * 4 + c] = avg3(a[i], a[i + 1], a[(i + 2).min(7)]);
                }
            }
        }
        SubblockMode::Rd => {
            for r in 0..4 {
                for c in 0..4 {
                    let i = 3 + c - r;
                    b[r * 4 + c] = avg3(e[i], e[i + 1], e[i + 2]);
                }
            }
        }
        SubblockMode::Vr => {
            b[12] = avg3(e[1], e[2], e[3]);
            b[8] = avg3(e[2], e[3], e[4]);
            b[13] = avg3(e[3], e[4], e[5]);
            b[4] = b[13];
            b[9] = avg2(e[4], e[5]);
            b[0] = b[9];
            b[14] = avg3(e[4], e[5], e[6]);
            b[5] = b[14];
            b[10] = avg2(e[5], e[6]);
            b[1] = b[10];
            b[15] = avg3(e[5], e[6], e[7]);
            b[6] = b[15];
            b[11] = avg2(e[6], e[7]);
            b[2] = b[11];
            b[7] = avg3(e[6], e[7], e[8]);
            b[3] = avg2(e[7], e[8]);
        }
        SubblockMode::Vl => {
            b[0] = avg2(a[0], a[1]);
            b[4] = avg3(a[0], a[1], a[2]);
            b[8] = avg2(a[1], a[2]);
            b[1] = b[8];
            b[5] = avg3(a[1], a[2], a[3]);
            b[12] = b[5];
            b[9] = avg2(a[2], a[3]);
            b[2] = b[9];
            b[13] = avg3(a[2], a[3], a[4]);
            b[6] = b[13];
            b[10] = avg2(a[3], a[4]);
            b[3] = b[10];
            b[14] = avg3(a[3], a[4], a[5]);
            b[7] = b[14];
            b[11] = avg3(a[4], a[5], a[6]);
            b[15] = avg3(a[5], a[6], a[7]);
        }
        SubblockMode::Hd => {
            b[12] = avg2(e[0], e[1]);
            b[13] = avg3(e[0], e[1], e[2]);
            b[8] = avg2(e[1], e[2]);
            b[14] = b[8];
            b[9] = avg3(e[1], e[2], e[3]);
            b[15] = b[9];
            b[10] = avg2(e[2], e[3]);
            b[4] = b[10];
            b[11] = avg3(e[2], e[3], e[4]);
            b[5] = b[11];
            b[6] = avg2(e[3], e[4]);
            b[0] = b[6];
            b[7] = avg3(e[3], e[4], e[5]);
            b[1] = b[7];
            b[2] = avg3(e[4], e[5], e[6]);
            b[3] = avg3(e[5], e[6], e[7]);
        }
        SubblockMode::Hu => {
            b[0] = avg2(l[0], l[1]);
            b[1] = avg3(l[0], l[1], l[2]);
            b[2] = avg2(l[1], l[2]);
            b[4] = b[2];
            b[3] = avg3(l[1], l[2], l[3]);
            b[5] = b[3];
            b[6] = avg2(l[2], l[3]);
            b[8] = b[6];
            b[7] = avg3(l[2], l[3], l[3]);
            b[9] = b[7];
            for px in &mut b[10..] {
                *px = l[3];
            }
        }
    }

    b
}

/// Write a predicted 4x4 block into a plane
pub fn store_subblock(plane: &mut Plane, x: usize, y: usize, pixels: &[u8; 16]) {
    let stride = plane.stride();
    let data = plane.data_mut();
    for r in 0..4 {
        let start = (y + r) * stride + x;
        data[start..start + 4].copy_from_slice(&pixels[r * 4..r * 4 + 4]);
    }
}

/// Motion-compensated prediction of one block
///
/// `mv_row`/`mv_col` carry `fraction_bits` fractional bits in pixels of
/// this plane: 2 for luma quarter-pel vectors, 3 for chroma eighth-pel
/// vectors. Full-pixel streams round their chroma vectors before calling
/// this; luma vectors keep their fractions and use the bilinear filter.
#[allow(clippy::too_many_arguments)]
pub fn predict_inter(
    reference: &Plane,
    output: &mut Plane,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    mv_row: i32,
    mv_col: i32,
    fraction_bits: u32,
    filter: InterpolationFilter,
) {
    let mask = (1 << fraction_bits) - 1;
    // Filter tables are indexed in eighth-pel steps
    let scale = 3 - fraction_bits;
    let frac_x = ((mv_col & mask) << scale) as usize;
    let frac_y = ((mv_row & mask) << scale) as usize;
    let src_x = x as isize + (mv_col >> fraction_bits) as isize;
    let src_y = y as isize + (mv_row >> fraction_bits) as isize;

    let stride = output.stride();
    let out = output.data_mut();

    if frac_x == 0 && frac_y == 0 {
        for r in 0..height {
            for c in 0..width {
                out[(y + r) * stride + x + c] =
                    reference.clamped(src_x + c as isize, src_y + r as isize);
            }
        }
        return;
    }

    match filter {
        InterpolationFilter::SixTap => {
            let h_taps = &SIXTAP_FILTERS[frac_x];
            let v_taps = &SIXTAP_FILTERS[frac_y];
            // Two rows above and three below feed the vertical pass
            let mut temp = [0u8; 21 * 16];
            for r in 0..height + 5 {
                let sy = src_y + r as isize - 2;
                for c in 0..width {
                    let sx = src_x + c as isize;
                    let sum: i32 = (0..6)
                        .map(|t| h_taps[t] * reference.clamped(sx + t as isize - 2, sy) as i32)
                        .sum();
                    temp[r * width + c] = ((sum + 64) >> 7).clamp(0, 255) as u8;
                }
            }
            for r in 0..height {
                for c in 0..width {
                    let sum: i32 = (0..6)
                        .map(|t| v_taps[t] * temp[(r + t) * width + c] as i32)
                        .sum();
                    out[(y + r) * stride + x + c] = ((sum + 64) >> 7).clamp(0, 255) as u8;
                }
            }
        }
        InterpolationFilter::Bilinear | InterpolationFilter::FullPixel => {
            let h_taps = &BILINEAR_FILTERS[frac_x];
            let v_taps = &BILINEAR_FILTERS[frac_y];
            let mut temp = [0u8; 17 * 16];
            for r in 0..height + 1 {
                let sy = src_y + r as isize;
                for c in 0..width {
                    let sx = src_x + c as isize;
                    let sum = h_taps[0] * reference.clamped(sx, sy) as i32
                        + h_taps[1] * reference.clamped(sx + 1, sy) as i32;
                    temp[r * width + c] = ((sum + 64) >> 7).clamp(0, 255) as u8;
                }
            }
            for r in 0..height {
                for c in 0..width {
                    let sum = v_taps[0] * temp[r * width + c] as i32
                        + v_taps[1] * temp[(r + 1) * width + c] as i32;
                    out[(y + r) * stride + x + c] = ((sum + 64) >> 7).clamp(0, 255) as u8;
                }
            }
        }
    }
}

/// Chroma vector of one 4x4 chroma block from the four luma vectors
/// covering it, in eighth-pel chroma units
pub fn average_chroma_mv(luma: [i32; 4], full_pixel: bool) -> i32 {
    let mut sum: i32 = luma.iter().sum::<i32>() * 2;
    sum += 4 + if sum < 0 { -8 } else { 0 };
    let mv = sum / 8;
    if full_pixel {
        mv & !7
    } else {
        mv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_with(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Plane {
        let mut plane = Plane::new(width, height);
        for y in 0..height {
            for x in 0..width {
                plane.data_mut()[y * width + x] = f(x, y);
            }
        }
        plane
    }

    #[test]
    fn test_dc_without_neighbours() {
        let mut plane = Plane::new(32, 32);
        predict_block(&mut plane, 0, 0, 16, BlockMode::Dc);
        assert!(plane.row(0)[..16].iter().all(|&v| v == 128));
    }

    #[test]
    fn test_frame_edges() {
        let mut plane = Plane::new(16, 16);
        predict_block(&mut plane, 0, 0, 16, BlockMode::Vertical);
        assert_eq!(plane.at(3, 7), 127);
        predict_block(&mut plane, 0, 0, 16, BlockMode::Horizontal);
        assert_eq!(plane.at(3, 7), 129);
        // TM on the corner: left 129 + above 127 - corner 127
        predict_block(&mut plane, 0, 0, 16, BlockMode::TrueMotion);
        assert_eq!(plane.at(5, 5), 129);
    }

    #[test]
    fn test_dc_uses_available_edge() {
        let mut plane = plane_with(16, 32, |_, y| if y < 16 { 40 } else { 0 });
        predict_block(&mut plane, 0, 16, 16, BlockMode::Dc);
        assert_eq!(plane.at(0, 16), 40);

        let mut chroma = plane_with(16, 8, |x, _| if x < 8 { 10 } else { 0 });
        predict_block(&mut chroma, 8, 0, 8, BlockMode::Dc);
        assert_eq!(chroma.at(12, 4), 10);
    }

    #[test]
    fn test_subblock_above_right_from_row_above() {
        let plane = plane_with(32, 32, |x, y| if y == 15 { x as u8 } else { 50 });
        let edges = SubblockEdges::gather(&plane, 0, 16, 7);
        assert_eq!(edges.above[4..], [16, 17, 18, 19]);

        // Rightmost macroblock replicates the last pixel of the row above
        let edges = SubblockEdges::gather(&plane, 16, 16, 3);
        assert_eq!(edges.above[4..], [31, 31, 31, 31]);

        // Top row of the frame
        let edges = SubblockEdges::gather(&plane, 0, 0, 0);
        assert_eq!(edges.above, [127; 8]);
        assert_eq!(edges.left, [129; 4]);
        assert_eq!(edges.above_left, 127);
    }

    #[test]
    fn test_subblock_modes_on_flat_edges() {
        let edges = SubblockEdges {
            above: [90; 8],
            left: [90; 4],
            above_left: 90,
        };
        for index in 0..10 {
            let mode = SubblockMode::from_index(index);
            assert_eq!(predict_subblock(mode, &edges), [90; 16], "{:?}", mode);
        }
    }

    #[test]
    fn test_subblock_directional() {
        let edges = SubblockEdges {
            above: [10, 20, 30, 40, 50, 60, 70, 80],
            left: [1, 2, 3, 4],
            above_left: 5,
        };
        let ld = predict_subblock(SubblockMode::Ld, &edges);
        assert_eq!(ld[0], 20);
        assert_eq!(ld[15], 78);

        let hu = predict_subblock(SubblockMode::Hu, &edges);
        assert_eq!(hu[0], 2);
        assert_eq!(hu[15], 4);

        let ve = predict_subblock(SubblockMode::Ve, &edges);
        assert_eq!(ve[0], 11);
        assert_eq!(ve[12], 11);
    }

    #[test]
    fn test_inter_full_pixel_copy_clamps() {
        let reference = plane_with(16, 16, |x, y| (x + 16 * y) as u8);
        let mut out = Plane::new(16, 16);
        predict_inter(&reference, &mut out, 0, 0, 4, 4, -32, -32, 2, InterpolationFilter::SixTap);
        assert_eq!(out.at(0, 0), 0);
        assert_eq!(out.at(3, 3), 0);

        predict_inter(&reference, &mut out, 4, 4, 4, 4, 4, 8, 2, InterpolationFilter::SixTap);
        assert_eq!(out.at(4, 4), reference.at(6, 5));
    }

    #[test]
    fn test_inter_subpel_on_flat_plane() {
        let reference = plane_with(32, 32, |_, _| 77);
        let mut out = Plane::new(32, 32);
        for filter in [InterpolationFilter::SixTap, InterpolationFilter::Bilinear] {
            predict_inter(&reference, &mut out, 8, 8, 16, 16, 3, -5, 2, filter);
            assert!(out.row(10)[8..24].iter().all(|&v| v == 77));
        }
    }

    #[test]
    fn test_bilinear_half_pel() {
        let reference = plane_with(8, 8, |x, _| if x < 4 { 0 } else { 100 });
        let mut out = Plane::new(8, 8);
        // Half a pixel right of column 3 sits between 0 and 100
        predict_inter(&reference, &mut out, 0, 0, 4, 4, 0, 14, 2, InterpolationFilter::Bilinear);
        assert_eq!(out.at(0, 0), 50);
    }

    #[test]
    fn test_average_chroma_mv() {
        assert_eq!(average_chroma_mv([4, 4, 4, 4], false), 4);
        assert_eq!(average_chroma_mv([1, 0, 0, 0], false), 0);
        assert_eq!(average_chroma_mv([3, 3, 3, 3], false), 3);
        assert_eq!(average_chroma_mv([-3, -3, -3, -3], false), -3);
        assert_eq!(average_chroma_mv([13, 13, 13, 13], true), 8);
    }
}
