//! VP8 loop filter
//!
//! The loop filter is an in-loop deblocking filter that smooths macroblock
//! and subblock edges after the whole frame has been reconstructed. VP8
//! has two filter types: the normal filter works on all three planes, the
//! simple filter only on luma.

use super::header::FilterAdjustments;
use super::raster::{Plane, Raster};

/// Frame-wide loop filter parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopFilterParams {
    pub simple: bool,
    pub sharpness: u8,
    pub key_frame: bool,
}

/// What the loop filter needs to know about one macroblock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroblockFilterInfo {
    /// Level after segment and mode/reference adjustments
    pub level: u8,
    /// Inner edges are left alone for macroblocks without coefficients
    /// that are predicted as a whole
    pub skip_inner_edges: bool,
}

/// Reference/mode adjustment input of one macroblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDeltaIndex {
    /// 0 intra, 1 last, 2 golden, 3 alternate
    pub reference: usize,
    /// Index into the mode deltas, if this macroblock's mode has one
    pub mode: Option<usize>,
}

/// Filter limits computed from level and sharpness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterLimits {
    pub mb_edge: i32,
    pub sub_edge: i32,
    pub interior: i32,
    pub hev_threshold: i32,
}

impl FilterLimits {
    pub fn from_level_sharpness(level: u8, sharpness: u8, key_frame: bool) -> Self {
        let level = level as i32;
        let mut interior = level;
        if sharpness > 0 {
            interior >>= if sharpness > 4 { 2 } else { 1 };
            interior = interior.min(9 - sharpness as i32);
        }
        let interior = interior.max(1);

        let hev_threshold = if key_frame {
            match level {
                40.. => 2,
                15.. => 1,
                _ => 0,
            }
        } else {
            match level {
                40.. => 3,
                20.. => 2,
                15.. => 1,
                _ => 0,
            }
        };

        FilterLimits {
            mb_edge: (level + 2) * 2 + interior,
            sub_edge: level * 2 + interior,
            interior,
            hev_threshold,
        }
    }
}

/// Effective filter level of a macroblock
///
/// `base` is the frame or segment level; adjustments only apply when the
/// frame enables them.
pub fn calculate_mb_filter_level(
    base: i32,
    adjustments: Option<&FilterAdjustments>,
    index: FilterDeltaIndex,
) -> u8 {
    let mut level = base;
    if let Some(adjustments) = adjustments {
        level += adjustments.ref_deltas[index.reference] as i32;
        if let Some(mode) = index.mode {
            level += adjustments.mode_deltas[mode] as i32;
        }
    }
    level.clamp(0, 63) as u8
}

#[inline]
fn clamp_signed(v: i32) -> i32 {
    v.clamp(-128, 127)
}

#[inline]
fn to_signed(v: u8) -> i32 {
    v as i32 - 128
}

#[inline]
fn to_unsigned(v: i32) -> u8 {
    (clamp_signed(v) + 128) as u8
}

/// Eight pixels straddling an edge: p3..p0 before it, q0..q3 after it
struct Segment<'a> {
    data: &'a mut [u8],
    at: usize,
    step: usize,
}

impl Segment<'_> {
    #[inline]
    fn p(&self, i: usize) -> u8 {
        self.data[self.at - (i + 1) * self.step]
    }

    #[inline]
    fn q(&self, i: usize) -> u8 {
        self.data[self.at + i * self.step]
    }

    #[inline]
    fn set_p(&mut self, i: usize, v: i32) {
        let at = self.at - (i + 1) * self.step;
        self.data[at] = to_unsigned(v);
    }

    #[inline]
    fn set_q(&mut self, i: usize, v: i32) {
        let at = self.at + i * self.step;
        self.data[at] = to_unsigned(v);
    }

    fn edge_ok(&self, edge_limit: i32) -> bool {
        let p0 = self.p(0) as i32;
        let q0 = self.q(0) as i32;
        let p1 = self.p(1) as i32;
        let q1 = self.q(1) as i32;
        (p0 - q0).abs() * 2 + ((p1 - q1).abs() >> 1) <= edge_limit
    }

    fn should_filter(&self, interior: i32, edge_limit: i32) -> bool {
        if !self.edge_ok(edge_limit) {
            return false;
        }
        let diff = |a: u8, b: u8| (a as i32 - b as i32).abs();
        diff(self.p(3), self.p(2)) <= interior
            && diff(self.p(2), self.p(1)) <= interior
            && diff(self.p(1), self.p(0)) <= interior
            && diff(self.q(1), self.q(0)) <= interior
            && diff(self.q(2), self.q(1)) <= interior
            && diff(self.q(3), self.q(2)) <= interior
    }

    fn high_edge_variance(&self, threshold: i32) -> bool {
        (self.p(1) as i32 - self.p(0) as i32).abs() > threshold
            || (self.q(1) as i32 - self.q(0) as i32).abs() > threshold
    }

    /// Adjust p0/q0 towards each other, returning the q0 adjustment
    fn common_adjust(&mut self, use_outer_taps: bool) -> i32 {
        let p1 = to_signed(self.p(1));
        let p0 = to_signed(self.p(0));
        let q0 = to_signed(self.q(0));
        let q1 = to_signed(self.q(1));

        let outer = if use_outer_taps { clamp_signed(p1 - q1) } else { 0 };
        let a = clamp_signed(outer + 3 * (q0 - p0));
        let b = clamp_signed(a + 3) >> 3;
        let a = clamp_signed(a + 4) >> 3;

        self.set_q(0, q0 - a);
        self.set_p(0, p0 + b);
        a
    }

    fn simple(&mut self, edge_limit: i32) {
        if self.edge_ok(edge_limit) {
            self.common_adjust(true);
        }
    }

    fn subblock(&mut self, limits: &FilterLimits) {
        if !self.should_filter(limits.interior, limits.sub_edge) {
            return;
        }
        let hev = self.high_edge_variance(limits.hev_threshold);
        let a = (self.common_adjust(hev) + 1) >> 1;
        if !hev {
            let q1 = to_signed(self.q(1));
            let p1 = to_signed(self.p(1));
            self.set_q(1, q1 - a);
            self.set_p(1, p1 + a);
        }
    }

    fn macroblock(&mut self, limits: &FilterLimits) {
        if !self.should_filter(limits.interior, limits.mb_edge) {
            return;
        }
        if self.high_edge_variance(limits.hev_threshold) {
            self.common_adjust(true);
            return;
        }

        let p2 = to_signed(self.p(2));
        let p1 = to_signed(self.p(1));
        let p0 = to_signed(self.p(0));
        let q0 = to_signed(self.q(0));
        let q1 = to_signed(self.q(1));
        let q2 = to_signed(self.q(2));

        let w = clamp_signed(clamp_signed(p1 - q1) + 3 * (q0 - p0));

        let a = clamp_signed((27 * w + 63) >> 7);
        self.set_q(0, q0 - a);
        self.set_p(0, p0 + a);

        let a = clamp_signed((18 * w + 63) >> 7);
        self.set_q(1, q1 - a);
        self.set_p(1, p1 + a);

        let a = clamp_signed((9 * w + 63) >> 7);
        self.set_q(2, q2 - a);
        self.set_p(2, p2 + a);
    }
}

#[derive(Clone, Copy)]
enum EdgeKind {
    Macroblock,
    Subblock,
    Simple,
}

/// Filter `length` pixels along an edge
///
/// A vertical edge sits left of column `x`, a horizontal edge above row `y`.
fn filter_edge(
    plane: &mut Plane,
    x: usize,
    y: usize,
    length: usize,
    vertical: bool,
    kind: EdgeKind,
    limits: &FilterLimits,
) {
    let stride = plane.stride();
    let (step, advance) = if vertical { (1, stride) } else { (stride, 1) };
    let start = y * stride + x;
    let data = plane.data_mut();

    for i in 0..length {
        let mut segment = Segment {
            data: &mut *data,
            at: start + i * advance,
            step,
        };
        match kind {
            EdgeKind::Macroblock => segment.macroblock(limits),
            EdgeKind::Subblock => segment.subblock(limits),
            EdgeKind::Simple => segment.simple(limits.mb_edge),
        }
    }
}

fn filter_simple_macroblock(
    plane: &mut Plane,
    column: usize,
    row: usize,
    info: &MacroblockFilterInfo,
    limits: &FilterLimits,
) {
    let x = column * 16;
    let y = row * 16;
    let inner = FilterLimits {
        mb_edge: limits.sub_edge,
        ..*limits
    };

    if column > 0 {
        filter_edge(plane, x, y, 16, true, EdgeKind::Simple, limits);
    }
    if !info.skip_inner_edges {
        for offset in [4, 8, 12] {
            filter_edge(plane, x + offset, y, 16, true, EdgeKind::Simple, &inner);
        }
    }
    if row > 0 {
        filter_edge(plane, x, y, 16, false, EdgeKind::Simple, limits);
    }
    if !info.skip_inner_edges {
        for offset in [4, 8, 12] {
            filter_edge(plane, x, y + offset, 16, false, EdgeKind::Simple, &inner);
        }
    }
}

fn filter_normal_macroblock(
    raster: &mut Raster,
    column: usize,
    row: usize,
    info: &MacroblockFilterInfo,
    limits: &FilterLimits,
) {
    let Raster { y, u, v, .. } = raster;

    if column > 0 {
        filter_edge(y, column * 16, row * 16, 16, true, EdgeKind::Macroblock, limits);
        for plane in [&mut *u, &mut *v] {
            filter_edge(plane, column * 8, row * 8, 8, true, EdgeKind::Macroblock, limits);
        }
    }
    if !info.skip_inner_edges {
        for offset in [4, 8, 12] {
            filter_edge(y, column * 16 + offset, row * 16, 16, true, EdgeKind::Subblock, limits);
        }
        for plane in [&mut *u, &mut *v] {
            filter_edge(plane, column * 8 + 4, row * 8, 8, true, EdgeKind::Subblock, limits);
        }
    }
    if row > 0 {
        filter_edge(y, column * 16, row * 16, 16, false, EdgeKind::Macroblock, limits);
        for plane in [&mut *u, &mut *v] {
            filter_edge(plane, column * 8, row * 8, 8, false, EdgeKind::Macroblock, limits);
        }
    }
    if !info.skip_inner_edges {
        for offset in [4, 8, 12] {
            filter_edge(y, column * 16, row * 16 + offset, 16, false, EdgeKind::Subblock, limits);
        }
        for plane in [&mut *u, &mut *v] {
            filter_edge(plane, column * 8, row * 8 + 4, 8, false, EdgeKind::Subblock, limits);
        }
    }
}

/// Apply the loop filter to an entire frame
///
/// `mb_info` holds one entry per macroblock in raster order.
pub fn apply_loop_filter(raster: &mut Raster, params: &LoopFilterParams, mb_info: &[MacroblockFilterInfo]) {
    let mb_width = raster.macroblock_width();

    for (index, info) in mb_info.iter().enumerate() {
        if info.level == 0 {
            continue;
        }
        let column = index % mb_width;
        let row = index / mb_width;
        let limits = FilterLimits::from_level_sharpness(info.level, params.sharpness, params.key_frame);

        if params.simple {
            filter_simple_macroblock(&mut raster.y, column, row, info, &limits);
        } else {
            filter_normal_macroblock(raster, column, row, info, &limits);
        }
    }
}
