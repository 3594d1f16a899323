//! Per-macroblock header syntax: segment ids, skip flags, prediction modes
//! and motion vectors
//!
//! All macroblock headers of a frame live in the first partition and are
//! parsed in raster order before any token is read. Motion vectors are kept
//! in quarter-pel luma units.

use super::bool_decoder::EntropyDecoder;
use super::entropy::ProbabilityTables;
use super::filter::FilterDeltaIndex;
use super::header::{FrameHeader, InterFrameHeader, KindHeader};
use super::tables::{
    ChromaMode, InterMode, LumaMode, MotionVector, ReferenceFrame, SplitMode, SubMvRef,
    SubblockMode, BMODE_TREE, INTER_BMODE_PROBS, KF_BMODE_PROBS, KF_UV_MODE_PROBS,
    KF_YMODE_PROBS, KF_YMODE_TREE, LONG_MV_BIT_ORDER, MODE_CONTEXTS, MVP_IS_SHORT, MVP_LONG,
    MVP_SHORT, MVP_SIGN, MV_PROB_COUNT, MV_REF_TREE, SEGMENT_ID_TREE, SMALL_MV_TREE,
    SPLIT_MV_PROBS, SPLIT_MV_TREE, SUB_MV_REF_PROBS, SUB_MV_REF_TREE, UV_MODE_TREE, YMODE_TREE,
};

/// How a macroblock is predicted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacroblockKind {
    #[default]
    Intra,
    Inter {
        reference: ReferenceFrame,
        mode: InterMode,
    },
    /// Copied from a reference slot without motion compensation
    Continuation { reference: ReferenceFrame },
}

/// Parsed header of one macroblock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacroblockInfo {
    pub segment_id: u8,
    /// The macroblock carries no coefficient tokens
    pub skip: bool,
    pub kind: MacroblockKind,
    pub luma_mode: LumaMode,
    pub chroma_mode: ChromaMode,
    pub subblock_modes: [SubblockMode; 16],
    /// Vector used by neighbours' contexts; the last subblock's for split
    pub mv: MotionVector,
    pub mvs: [MotionVector; 16],
}

impl MacroblockInfo {
    pub fn reference(&self) -> Option<ReferenceFrame> {
        match self.kind {
            MacroblockKind::Intra => None,
            MacroblockKind::Inter { reference, .. } | MacroblockKind::Continuation { reference } => {
                Some(reference)
            }
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(
            self.kind,
            MacroblockKind::Inter {
                mode: InterMode::Split,
                ..
            }
        )
    }

    /// Whether the luma DCs are coded in a separate Y2 block
    pub fn has_y2(&self) -> bool {
        match self.kind {
            MacroblockKind::Intra => self.luma_mode != LumaMode::B,
            MacroblockKind::Inter { mode, .. } => mode != InterMode::Split,
            MacroblockKind::Continuation { .. } => true,
        }
    }

    /// Loop filter delta selection for this macroblock
    pub fn filter_delta_index(&self) -> FilterDeltaIndex {
        match self.kind {
            MacroblockKind::Intra => FilterDeltaIndex {
                reference: 0,
                mode: (self.luma_mode == LumaMode::B).then_some(0),
            },
            MacroblockKind::Inter { reference, mode } => FilterDeltaIndex {
                reference: reference.delta_index(),
                mode: Some(match mode {
                    InterMode::Zero => 1,
                    InterMode::Split => 3,
                    _ => 2,
                }),
            },
            MacroblockKind::Continuation { reference } => FilterDeltaIndex {
                reference: reference.delta_index(),
                mode: Some(1),
            },
        }
    }
}

/// Frame-level inputs of macroblock header parsing
#[derive(Debug, Clone, Copy)]
pub struct ModeContext<'a> {
    pub mb_width: usize,
    pub mb_height: usize,
    /// Tree probabilities when this frame updates the segment map
    pub segment_tree_probs: Option<[u8; 3]>,
    /// Segment map carried over from earlier frames
    pub segment_map: &'a [u8],
    pub prob_skip_false: Option<u8>,
    pub probs: &'a ProbabilityTables,
    /// The frame carries a continuation header
    pub continuation: bool,
}

/// Parse the headers of every macroblock of a frame, raster order
pub fn parse_macroblock_headers<D: EntropyDecoder>(
    d: &mut D,
    header: &FrameHeader,
    ctx: &ModeContext<'_>,
) -> Vec<MacroblockInfo> {
    let count = ctx.mb_width * ctx.mb_height;
    let mut infos: Vec<MacroblockInfo> = Vec::with_capacity(count);

    for row in 0..ctx.mb_height {
        for col in 0..ctx.mb_width {
            let index = row * ctx.mb_width + col;
            let mut info = MacroblockInfo {
                segment_id: match ctx.segment_tree_probs {
                    Some(probs) => d.read_tree(&SEGMENT_ID_TREE, &probs) as u8,
                    None => ctx.segment_map.get(index).copied().unwrap_or(0),
                },
                skip: ctx.prob_skip_false.map_or(false, |prob| d.read_bool(prob)),
                ..Default::default()
            };

            let neighbours = Neighbours::of(&infos, ctx.mb_width);

            match &header.kind {
                KindHeader::Key(_) => read_key_frame_modes(d, &mut info, &neighbours),
                KindHeader::Inter(inter) => {
                    let position = Position {
                        col,
                        row,
                        mb_width: ctx.mb_width,
                        mb_height: ctx.mb_height,
                    };
                    read_inter_frame_modes(d, &mut info, &neighbours, inter, ctx, position)
                }
            }
            infos.push(info);
        }
    }

    infos
}

struct Neighbours<'a> {
    above: Option<&'a MacroblockInfo>,
    left: Option<&'a MacroblockInfo>,
    above_left: Option<&'a MacroblockInfo>,
}

impl<'a> Neighbours<'a> {
    /// Neighbours of the macroblock that follows `parsed` in raster order
    fn of(parsed: &'a [MacroblockInfo], mb_width: usize) -> Self {
        let index = parsed.len();
        let (row, col) = (index / mb_width, index % mb_width);
        Neighbours {
            above: (row > 0).then(|| &parsed[index - mb_width]),
            left: (col > 0).then(|| &parsed[index - 1]),
            above_left: (row > 0 && col > 0).then(|| &parsed[index - mb_width - 1]),
        }
    }
}

/// Inter mode tree probabilities of the macroblock following `parsed`
///
/// Encoders need the same contexts the parser derives to write the mode.
pub fn inter_mode_probs(
    parsed: &[MacroblockInfo],
    mb_width: usize,
    mb_height: usize,
    reference: ReferenceFrame,
    inter: &InterFrameHeader,
) -> [u8; 4] {
    let index = parsed.len();
    let position = Position {
        col: index % mb_width,
        row: index / mb_width,
        mb_width,
        mb_height,
    };
    find_near_mvs(&Neighbours::of(parsed, mb_width), reference, inter, position).probs()
}

#[derive(Debug, Clone, Copy)]
struct Position {
    col: usize,
    row: usize,
    mb_width: usize,
    mb_height: usize,
}

fn read_key_frame_modes<D: EntropyDecoder>(
    d: &mut D,
    info: &mut MacroblockInfo,
    neighbours: &Neighbours<'_>,
) {
    info.luma_mode = LumaMode::from_index(d.read_tree(&KF_YMODE_TREE, &KF_YMODE_PROBS));

    if info.luma_mode == LumaMode::B {
        for i in 0..16 {
            let above = if i < 4 {
                neighbours
                    .above
                    .map_or(SubblockMode::Dc, |mb| mb.subblock_modes[i + 12])
            } else {
                info.subblock_modes[i - 4]
            };
            let left = if i & 3 == 0 {
                neighbours
                    .left
                    .map_or(SubblockMode::Dc, |mb| mb.subblock_modes[i + 3])
            } else {
                info.subblock_modes[i - 1]
            };
            let probs = &KF_BMODE_PROBS[above.index()][left.index()];
            info.subblock_modes[i] = SubblockMode::from_index(d.read_tree(&BMODE_TREE, probs));
        }
    } else {
        info.subblock_modes = [info.luma_mode.implied_subblock_mode(); 16];
    }

    info.chroma_mode = ChromaMode::from_index(d.read_tree(&UV_MODE_TREE, &KF_UV_MODE_PROBS));
}

fn read_inter_frame_modes<D: EntropyDecoder>(
    d: &mut D,
    info: &mut MacroblockInfo,
    neighbours: &Neighbours<'_>,
    inter: &InterFrameHeader,
    ctx: &ModeContext<'_>,
    position: Position,
) {
    if !d.read_bool(inter.prob_inter) {
        info.luma_mode = LumaMode::from_index(d.read_tree(&YMODE_TREE, &ctx.probs.y_mode_probs));
        if info.luma_mode == LumaMode::B {
            for mode in info.subblock_modes.iter_mut() {
                *mode = SubblockMode::from_index(d.read_tree(&BMODE_TREE, &INTER_BMODE_PROBS));
            }
        } else {
            info.subblock_modes = [info.luma_mode.implied_subblock_mode(); 16];
        }
        info.chroma_mode =
            ChromaMode::from_index(d.read_tree(&UV_MODE_TREE, &ctx.probs.uv_mode_probs));
        return;
    }

    let reference = if !d.read_bool(inter.prob_references_last) {
        ReferenceFrame::Last
    } else if !d.read_bool(inter.prob_references_golden) {
        ReferenceFrame::Golden
    } else {
        ReferenceFrame::Alternate
    };

    if ctx.continuation && d.read_flag() {
        info.kind = MacroblockKind::Continuation { reference };
        return;
    }

    let near = find_near_mvs(neighbours, reference, inter, position);
    let mode = InterMode::from_index(d.read_tree(&MV_REF_TREE, &near.probs()));
    let mv_probs = &ctx.probs.motion_vector_probs;

    let mvs = match mode {
        InterMode::Nearest => [near.nearest; 16],
        InterMode::Near => [near.near; 16],
        InterMode::Zero => [MotionVector::ZERO; 16],
        InterMode::New => [near.best.wrapping_add(read_mv(d, mv_probs)); 16],
        InterMode::Split => read_split_mvs(d, mv_probs, near.best, neighbours),
    };

    info.kind = MacroblockKind::Inter { reference, mode };
    info.mvs = mvs;
    info.mv = mvs[15];
}

/// Motion vector candidates from the neighbouring macroblocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearMvs {
    pub best: MotionVector,
    pub nearest: MotionVector,
    pub near: MotionVector,
    /// Weights of zero, nearest, near and split neighbours
    pub counts: [u8; 4],
}

impl NearMvs {
    /// Probabilities of the inter mode tree
    pub fn probs(&self) -> [u8; 4] {
        let mut probs = [0u8; 4];
        for (i, prob) in probs.iter_mut().enumerate() {
            *prob = MODE_CONTEXTS[self.counts[i] as usize][i];
        }
        probs
    }
}

fn find_near_mvs(
    neighbours: &Neighbours<'_>,
    reference: ReferenceFrame,
    inter: &InterFrameHeader,
    position: Position,
) -> NearMvs {
    let mut mvs = [MotionVector::ZERO; 4];
    let mut counts = [0u8; 4];
    let mut index = 0;

    for (neighbour, weight) in [
        (neighbours.above, 2),
        (neighbours.left, 2),
        (neighbours.above_left, 1),
    ] {
        let Some(mb) = neighbour else { continue };
        let Some(neighbour_ref) = mb.reference() else { continue };

        if mb.mv.is_zero() {
            counts[0] += weight;
            continue;
        }
        let mut mv = mb.mv;
        if inter.sign_bias(neighbour_ref) != inter.sign_bias(reference) {
            mv = mv.negate();
        }
        if mv != mvs[index] {
            index += 1;
            mvs[index] = mv;
        }
        counts[index] += weight;
    }

    // Three distinct vectors where the last repeats the nearest
    if counts[3] > 0 && mvs[3] == mvs[1] {
        counts[1] += 1;
    }

    let split = |mb: Option<&MacroblockInfo>| mb.map_or(0, |mb| mb.is_split() as u8);
    counts[3] =
        (split(neighbours.above) + split(neighbours.left)) * 2 + split(neighbours.above_left);

    if counts[2] > counts[1] {
        counts.swap(1, 2);
        mvs.swap(1, 2);
    }
    if counts[1] >= counts[0] {
        mvs[0] = mvs[1];
    }

    NearMvs {
        best: clamp_mv(mvs[0], position),
        nearest: clamp_mv(mvs[1], position),
        near: clamp_mv(mvs[2], position),
        counts,
    }
}

/// Clamp a vector so the block lies at most one macroblock outside the frame
fn clamp_mv(mv: MotionVector, position: Position) -> MotionVector {
    let bound = |v: i16, index: usize, size: usize| -> i16 {
        let min = -(((index + 1) as i32) << 6);
        let max = ((size - index) as i32) << 6;
        (v as i32).clamp(min, max) as i16
    };
    MotionVector {
        row: bound(mv.row, position.row, position.mb_height),
        col: bound(mv.col, position.col, position.mb_width),
    }
}

fn read_split_mvs<D: EntropyDecoder>(
    d: &mut D,
    probs: &[[u8; MV_PROB_COUNT]; 2],
    best: MotionVector,
    neighbours: &Neighbours<'_>,
) -> [MotionVector; 16] {
    let split = SplitMode::from_index(d.read_tree(&SPLIT_MV_TREE, &SPLIT_MV_PROBS));
    let layout = split.layout();
    let mut mvs = [MotionVector::ZERO; 16];

    for part in 0..split.partition_count() {
        let first = layout
            .iter()
            .position(|&p| p as usize == part)
            .unwrap_or(0);

        let left = if first & 3 != 0 {
            mvs[first - 1]
        } else {
            neighbours
                .left
                .map_or(MotionVector::ZERO, |mb| mb.mvs[first + 3])
        };
        let above = if first >= 4 {
            mvs[first - 4]
        } else {
            neighbours
                .above
                .map_or(MotionVector::ZERO, |mb| mb.mvs[first + 12])
        };

        let context = sub_mv_context(left, above);
        let mv = match SubMvRef::from_index(d.read_tree(&SUB_MV_REF_TREE, &SUB_MV_REF_PROBS[context]))
        {
            SubMvRef::Left => left,
            SubMvRef::Above => above,
            SubMvRef::Zero => MotionVector::ZERO,
            SubMvRef::New => best.wrapping_add(read_mv(d, probs)),
        };

        for (slot, &p) in mvs.iter_mut().zip(layout.iter()) {
            if p as usize == part {
                *slot = mv;
            }
        }
    }

    mvs
}

fn sub_mv_context(left: MotionVector, above: MotionVector) -> usize {
    match (left == above, above.is_zero(), left.is_zero()) {
        (true, _, true) => 4,
        (true, _, false) => 3,
        (false, true, _) => 2,
        (false, false, true) => 1,
        (false, false, false) => 0,
    }
}

fn read_mv<D: EntropyDecoder>(d: &mut D, probs: &[[u8; MV_PROB_COUNT]; 2]) -> MotionVector {
    let row = read_mv_component(d, &probs[0]);
    let col = read_mv_component(d, &probs[1]);
    MotionVector::new(row, col)
}

fn read_mv_component<D: EntropyDecoder>(d: &mut D, probs: &[u8; MV_PROB_COUNT]) -> i16 {
    let mut x: i32 = if d.read_bool(probs[MVP_IS_SHORT]) {
        let mut x = 0i32;
        for &bit in LONG_MV_BIT_ORDER.iter() {
            x += (d.read_bool(probs[MVP_LONG + bit]) as i32) << bit;
        }
        // Bit 3 is implied when no higher bit is set
        if (x & 0xFFF0) == 0 || d.read_bool(probs[MVP_LONG + 3]) {
            x += 8;
        }
        x
    } else {
        d.read_tree(&SMALL_MV_TREE, &probs[MVP_SHORT..]) as i32
    };

    if x != 0 && d.read_bool(probs[MVP_SIGN]) {
        x = -x;
    }
    x as i16
}
