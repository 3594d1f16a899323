//! VP8 frame writing
//!
//! The inverse of the parsing side, used to synthesize bitstreams: frame
//! tags, compressed headers, continuation headers and coefficient tokens.
//! [`FrameBuilder`] assembles whole frames from simple per-macroblock
//! recipes (whole-block intra prediction, zero-vector inter prediction or
//! continuation copies, each with a single Y2 DC coefficient).

use super::bool_encoder::BoolEncoder;
use super::entropy::{BlockType, NonzeroFlags, ProbabilityTables, TokenContexts};
use super::header::{
    ContinuationHeader, FrameHeader, InterFrameHeader, KeyFrameHeader, KindHeader,
    SegmentationUpdate, CONTINUATION_VERSION_BIT,
};
use super::macroblock::{inter_mode_probs, MacroblockInfo, MacroblockKind};
use super::quant::QuantIndices;
use super::residual::relink_y2_blocks;
use super::tables::{
    ChromaMode, InterMode, LumaMode, MotionVector, ReferenceFrame, TokenProbs, COEFF_BANDS,
    COEFF_UPDATE_PROBS, DCT_0, DCT_CAT1, DCT_CAT_BASE, DCT_EOB, DCT_TOKEN_TREE,
    KF_UV_MODE_PROBS, KF_YMODE_PROBS, KF_YMODE_TREE, MV_PROB_COUNT, MV_REF_TREE,
    MV_UPDATE_PROBS, NUM_BANDS, NUM_BLOCK_TYPES, NUM_CONTEXTS, NUM_TOKEN_NODES, PROB_DCT_CAT,
    SEGMENT_ID_TREE, UV_MODE_TREE, YMODE_TREE,
};
use crate::error::{Error, Result};

const START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];

/// Fields of the uncompressed frame tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTag {
    pub key_frame: bool,
    /// 0-3
    pub version: u8,
    pub continuation: bool,
    pub show_frame: bool,
    /// Display size, written for key frames only
    pub width: u16,
    pub height: u16,
}

impl FrameTag {
    /// The 3-byte tag, plus start code and size for key frames
    pub fn write(&self, first_partition_size: usize) -> Vec<u8> {
        let mut version = self.version & 3;
        if self.continuation {
            version |= CONTINUATION_VERSION_BIT;
        }
        let tag = (first_partition_size as u32) << 5
            | (self.show_frame as u32) << 4
            | (version as u32) << 1
            | (!self.key_frame) as u32;

        let mut output = Vec::with_capacity(10);
        output.extend_from_slice(&tag.to_le_bytes()[..3]);
        if self.key_frame {
            output.extend_from_slice(&START_CODE);
            output.extend_from_slice(&(self.width & 0x3FFF).to_le_bytes());
            output.extend_from_slice(&(self.height & 0x3FFF).to_le_bytes());
        }
        output
    }
}

fn write_segmentation(enc: &mut BoolEncoder, update: &SegmentationUpdate) {
    enc.write_flag(update.update_map);
    enc.write_flag(update.feature_data.is_some());
    if let Some(data) = &update.feature_data {
        enc.write_flag(data.absolute);
        for q in data.quantizer.iter() {
            enc.write_optional_signed(7, q.map(i32::from));
        }
        for lf in data.filter_level.iter() {
            enc.write_optional_signed(6, lf.map(i32::from));
        }
    }
    if update.update_map {
        for prob in update.tree_probs.iter() {
            enc.write_optional_literal(8, prob.map(u32::from));
        }
    }
}

fn write_quant_indices(enc: &mut BoolEncoder, q: &QuantIndices) {
    enc.write_literal(7, q.y_ac_qi as u32);
    for delta in [q.y_dc, q.y2_dc, q.y2_ac, q.uv_dc, q.uv_ac] {
        enc.write_optional_signed(4, delta.map(i32::from));
    }
}

/// Write a compressed frame header in the order [`FrameHeader::parse`] reads it
pub fn write_frame_header(enc: &mut BoolEncoder, header: &FrameHeader) {
    if let KindHeader::Key(key) = &header.kind {
        enc.write_flag(key.color_space);
        enc.write_flag(key.clamping_type);
    }

    enc.write_flag(header.segmentation.is_some());
    if let Some(update) = &header.segmentation {
        write_segmentation(enc, update);
    }

    enc.write_flag(header.simple_filter);
    enc.write_literal(6, header.loop_filter_level as u32);
    enc.write_literal(3, header.sharpness_level as u32);

    enc.write_flag(header.filter_adjustments.is_some());
    if let Some(update) = &header.filter_adjustments {
        enc.write_flag(update.is_some());
        if let Some(update) = update {
            for delta in update.ref_deltas.iter().chain(update.mode_deltas.iter()) {
                enc.write_optional_signed(6, delta.map(i32::from));
            }
        }
    }

    enc.write_literal(2, header.log2_partition_count as u32);
    write_quant_indices(enc, &header.quant_indices);

    match &header.kind {
        KindHeader::Key(_) => enc.write_flag(header.refresh_entropy_probs),
        KindHeader::Inter(inter) => {
            enc.write_flag(inter.refresh_golden);
            enc.write_flag(inter.refresh_alternate);
            if !inter.refresh_golden {
                enc.write_literal(2, inter.copy_buffer_to_golden.unwrap_or(0) as u32);
            }
            if !inter.refresh_alternate {
                enc.write_literal(2, inter.copy_buffer_to_alternate.unwrap_or(0) as u32);
            }
            enc.write_flag(inter.sign_bias_golden);
            enc.write_flag(inter.sign_bias_alternate);
            enc.write_flag(header.refresh_entropy_probs);
            enc.write_flag(inter.refresh_last);
        }
    }

    let mut token_updates = [[[[None; NUM_TOKEN_NODES]; NUM_CONTEXTS]; NUM_BANDS]; NUM_BLOCK_TYPES];
    for u in &header.token_prob_updates {
        token_updates[u.block_type][u.band][u.context][u.node] = Some(u.prob);
    }
    for (t, block_type) in token_updates.iter().enumerate() {
        for (b, band) in block_type.iter().enumerate() {
            for (c, context) in band.iter().enumerate() {
                for (n, update) in context.iter().enumerate() {
                    enc.write_bool(update.is_some(), COEFF_UPDATE_PROBS[t][b][c][n]);
                    if let Some(prob) = update {
                        enc.write_literal(8, *prob as u32);
                    }
                }
            }
        }
    }

    enc.write_optional_literal(8, header.prob_skip_false.map(u32::from));

    if let KindHeader::Inter(inter) = &header.kind {
        enc.write_literal(8, inter.prob_inter as u32);
        enc.write_literal(8, inter.prob_references_last as u32);
        enc.write_literal(8, inter.prob_references_golden as u32);

        enc.write_flag(inter.intra_16x16_probs.is_some());
        for prob in inter.intra_16x16_probs.iter().flatten() {
            enc.write_literal(8, *prob as u32);
        }
        enc.write_flag(inter.intra_chroma_probs.is_some());
        for prob in inter.intra_chroma_probs.iter().flatten() {
            enc.write_literal(8, *prob as u32);
        }

        let mut mv_updates = [[None; MV_PROB_COUNT]; 2];
        for u in &inter.mv_prob_updates {
            mv_updates[u.component][u.index] = Some(u.prob);
        }
        for (component, updates) in mv_updates.iter().enumerate() {
            for (index, update) in updates.iter().enumerate() {
                enc.write_bool(update.is_some(), MV_UPDATE_PROBS[component][index]);
                if let Some(prob) = update {
                    enc.write_literal(7, (*prob >> 1) as u32);
                }
            }
        }
    }
}

/// Write a continuation header: missing flags, then the full token table
pub fn write_continuation_header(enc: &mut BoolEncoder, header: &ContinuationHeader) {
    enc.write_flag(header.missing.last);
    enc.write_flag(header.missing.golden);
    enc.write_flag(header.missing.alternate);
    for prob in header.token_probs.iter().flatten().flatten().flatten() {
        enc.write_literal(8, *prob as u32);
    }
}

/// Tokenize one 4x4 block; `values` are in zigzag order starting at the
/// block type's first coefficient
///
/// Returns whether any token other than end-of-block was written.
pub fn write_block_tokens(
    enc: &mut BoolEncoder,
    probs: &TokenProbs,
    block_type: BlockType,
    context: usize,
    values: &[i16],
) -> bool {
    let probs = &probs[block_type as usize];
    let first = block_type.first_coefficient();
    let last = values.iter().rposition(|&v| v != 0).map_or(0, |p| p + 1);
    let mut context = context;
    let mut after_zero = false;

    for i in first..16 {
        let table = &probs[COEFF_BANDS[i]][context];
        let start = if after_zero { 2 } else { 0 };
        if i - first >= last {
            enc.write_tree_from(&DCT_TOKEN_TREE, table, DCT_EOB as usize, start);
            break;
        }

        let value = values[i - first];
        let magnitude = value.unsigned_abs();
        if magnitude == 0 {
            enc.write_tree_from(&DCT_TOKEN_TREE, table, DCT_0 as usize, start);
            after_zero = true;
            context = 0;
            continue;
        }

        if magnitude <= 4 {
            enc.write_tree_from(&DCT_TOKEN_TREE, table, magnitude as usize, start);
        } else {
            let category = (0..6).rev().find(|&c| DCT_CAT_BASE[c] <= magnitude).unwrap_or(0);
            enc.write_tree_from(
                &DCT_TOKEN_TREE,
                table,
                DCT_CAT1 as usize + category,
                start,
            );
            let extra = magnitude - DCT_CAT_BASE[category];
            let bit_probs: Vec<u8> = PROB_DCT_CAT[category]
                .iter()
                .copied()
                .take_while(|&p| p > 0)
                .collect();
            for (n, &prob) in bit_probs.iter().enumerate() {
                let shift = bit_probs.len() - 1 - n;
                enc.write_bool((extra >> shift) & 1 == 1, prob);
            }
        }
        enc.write_flag(value < 0);
        after_zero = false;
        context = if magnitude == 1 { 1 } else { 2 };
    }

    last > 0
}

/// Concatenate a frame: tag, first partition, partition sizes, token partitions
pub fn build_frame(tag: &FrameTag, first_partition: &[u8], token_partitions: &[Vec<u8>]) -> Vec<u8> {
    let mut output = tag.write(first_partition.len());
    output.extend_from_slice(first_partition);

    if let Some((_, sized)) = token_partitions.split_last() {
        for partition in sized {
            output.extend_from_slice(&(partition.len() as u32).to_le_bytes()[..3]);
        }
    }
    for partition in token_partitions {
        output.extend_from_slice(partition);
    }
    output
}

/// How one synthesized macroblock is coded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroblockRecipe {
    /// 16x16 intra prediction (not B_PRED)
    Intra {
        luma: LumaMode,
        chroma: ChromaMode,
        dc: i16,
    },
    /// ZERO motion vector inter prediction
    Inter { reference: ReferenceFrame, dc: i16 },
    /// Copy of the co-located macroblock of a reference slot
    Continuation { reference: ReferenceFrame, dc: i16 },
}

impl MacroblockRecipe {
    /// Quantized DC of the Y2 block
    pub fn dc(&self) -> i16 {
        match *self {
            MacroblockRecipe::Intra { dc, .. }
            | MacroblockRecipe::Inter { dc, .. }
            | MacroblockRecipe::Continuation { dc, .. } => dc,
        }
    }

    fn info(&self) -> MacroblockInfo {
        let kind = match *self {
            MacroblockRecipe::Intra { .. } => MacroblockKind::Intra,
            MacroblockRecipe::Inter { reference, .. } => MacroblockKind::Inter {
                reference,
                mode: InterMode::Zero,
            },
            MacroblockRecipe::Continuation { reference, .. } => {
                MacroblockKind::Continuation { reference }
            }
        };
        MacroblockInfo {
            kind,
            mv: MotionVector::ZERO,
            ..Default::default()
        }
    }
}

/// Assembles complete frames from per-macroblock recipes
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    width: u16,
    height: u16,
    version: u8,
    show_frame: bool,
    header: FrameHeader,
    continuation: Option<ContinuationHeader>,
    macroblocks: Vec<MacroblockRecipe>,
    segment_ids: Vec<u8>,
}

impl FrameBuilder {
    fn new(width: u16, height: u16, kind: KindHeader, recipe: MacroblockRecipe) -> Self {
        let count = ((width as usize + 15) / 16) * ((height as usize + 15) / 16);
        FrameBuilder {
            width,
            height,
            version: 0,
            show_frame: true,
            header: FrameHeader {
                kind,
                segmentation: None,
                simple_filter: false,
                loop_filter_level: 0,
                sharpness_level: 0,
                filter_adjustments: None,
                log2_partition_count: 0,
                quant_indices: QuantIndices {
                    y_ac_qi: 10,
                    ..Default::default()
                },
                refresh_entropy_probs: true,
                token_prob_updates: Vec::new(),
                prob_skip_false: Some(128),
            },
            continuation: None,
            macroblocks: vec![recipe; count],
            segment_ids: vec![0; count],
        }
    }

    /// A key frame of flat DC-predicted macroblocks
    pub fn key_frame(width: u16, height: u16) -> Self {
        Self::new(
            width,
            height,
            KindHeader::Key(KeyFrameHeader::default()),
            MacroblockRecipe::Intra {
                luma: LumaMode::Dc,
                chroma: ChromaMode::Dc,
                dc: 0,
            },
        )
    }

    /// An inter frame copying the last frame and refreshing only the last slot
    pub fn inter_frame(width: u16, height: u16) -> Self {
        let inter = InterFrameHeader {
            copy_buffer_to_golden: Some(0),
            copy_buffer_to_alternate: Some(0),
            refresh_last: true,
            prob_inter: 128,
            prob_references_last: 128,
            prob_references_golden: 128,
            ..Default::default()
        };
        Self::new(
            width,
            height,
            KindHeader::Inter(inter),
            MacroblockRecipe::Inter {
                reference: ReferenceFrame::Last,
                dc: 0,
            },
        )
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn shown(mut self, show_frame: bool) -> Self {
        self.show_frame = show_frame;
        self
    }

    pub fn continuation(mut self, header: ContinuationHeader) -> Self {
        self.continuation = Some(header);
        self
    }

    /// Use `recipe` for every macroblock
    pub fn fill(mut self, recipe: MacroblockRecipe) -> Self {
        self.macroblocks.fill(recipe);
        self
    }

    /// Use `recipe` for the macroblock at (col, row)
    pub fn set(mut self, col: usize, row: usize, recipe: MacroblockRecipe) -> Self {
        let mb_width = (self.width as usize + 15) / 16;
        if let Some(slot) = self.macroblocks.get_mut(row * mb_width + col) {
            *slot = recipe;
        }
        self
    }

    /// Segment ids written when the header updates the segment map
    pub fn segment_ids(mut self, ids: Vec<u8>) -> Self {
        self.segment_ids = ids;
        self
    }

    pub fn header_mut(&mut self) -> &mut FrameHeader {
        &mut self.header
    }

    pub fn inter_mut(&mut self) -> Option<&mut InterFrameHeader> {
        match &mut self.header.kind {
            KindHeader::Inter(inter) => Some(inter),
            KindHeader::Key(_) => None,
        }
    }

    /// Encode the frame
    ///
    /// Coefficient probabilities are derived from the defaults plus this
    /// header's updates, so the decoder must hold default tables (as after a
    /// key frame) for the tokens to decode as intended.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mb_width = (self.width as usize + 15) / 16;
        let mb_height = (self.height as usize + 15) / 16;
        let key_frame = self.header.is_key_frame();
        let count = mb_width * mb_height;
        if self.macroblocks.len() != count || self.segment_ids.len() != count {
            return Err(Error::invalid_input("macroblock count does not match frame size"));
        }

        let mut probs = ProbabilityTables::default();
        probs.update(&self.header);

        let mut enc = BoolEncoder::new();
        write_frame_header(&mut enc, &self.header);
        if let Some(cont) = &self.continuation {
            write_continuation_header(&mut enc, cont);
        }

        let segment_tree_probs = self
            .header
            .segmentation
            .as_ref()
            .filter(|update| update.update_map)
            .map(SegmentationUpdate::segment_tree_probs);

        let mut infos: Vec<MacroblockInfo> = Vec::with_capacity(count);
        for (index, recipe) in self.macroblocks.iter().enumerate() {
            if let Some(tree_probs) = segment_tree_probs {
                enc.write_tree(&SEGMENT_ID_TREE, &tree_probs, self.segment_ids[index] as usize);
            }
            if let Some(prob) = self.header.prob_skip_false {
                enc.write_bool(recipe.dc() == 0, prob);
            }

            match (*recipe, &self.header.kind) {
                (MacroblockRecipe::Intra { luma: LumaMode::B, .. }, _) => {
                    return Err(Error::invalid_input("B_PRED macroblocks cannot be synthesized"));
                }
                (MacroblockRecipe::Intra { luma, chroma, .. }, KindHeader::Key(_)) => {
                    enc.write_tree(&KF_YMODE_TREE, &KF_YMODE_PROBS, luma as usize);
                    enc.write_tree(&UV_MODE_TREE, &KF_UV_MODE_PROBS, chroma as usize);
                }
                (MacroblockRecipe::Intra { luma, chroma, .. }, KindHeader::Inter(inter)) => {
                    enc.write_bool(false, inter.prob_inter);
                    enc.write_tree(&YMODE_TREE, &probs.y_mode_probs, luma as usize);
                    enc.write_tree(&UV_MODE_TREE, &probs.uv_mode_probs, chroma as usize);
                }
                (_, KindHeader::Key(_)) => {
                    return Err(Error::invalid_input("key frames hold intra macroblocks only"));
                }
                (
                    MacroblockRecipe::Inter { reference, .. }
                    | MacroblockRecipe::Continuation { reference, .. },
                    KindHeader::Inter(inter),
                ) => {
                    enc.write_bool(true, inter.prob_inter);
                    enc.write_bool(reference != ReferenceFrame::Last, inter.prob_references_last);
                    if reference != ReferenceFrame::Last {
                        enc.write_bool(
                            reference == ReferenceFrame::Alternate,
                            inter.prob_references_golden,
                        );
                    }

                    let is_continuation = matches!(recipe, MacroblockRecipe::Continuation { .. });
                    if self.continuation.is_some() {
                        enc.write_flag(is_continuation);
                    } else if is_continuation {
                        return Err(Error::invalid_input(
                            "continuation macroblock without a continuation header",
                        ));
                    }
                    if !is_continuation {
                        let mode_probs =
                            inter_mode_probs(&infos, mb_width, mb_height, reference, inter);
                        enc.write_tree(&MV_REF_TREE, &mode_probs, InterMode::Zero as usize);
                    }
                }
            }
            infos.push(recipe.info());
        }
        let first_partition = enc.finish();

        let partition_count = self.header.partition_count();
        let mut token_encoders: Vec<BoolEncoder> =
            (0..partition_count).map(|_| BoolEncoder::new()).collect();
        let has_y2 = vec![true; count];
        let links = relink_y2_blocks(&has_y2, mb_width);
        let mut y2_nonzero = vec![false; count];
        let mut contexts = TokenContexts::new(mb_width);

        for row in 0..mb_height {
            contexts.start_row();
            let enc = &mut token_encoders[row % partition_count];
            for col in 0..mb_width {
                let index = row * mb_width + col;
                let recipe = &self.macroblocks[index];
                let skipped = self.header.prob_skip_false.is_some() && recipe.dc() == 0;
                if skipped {
                    contexts.above[col].clear();
                    contexts.left.clear();
                    continue;
                }

                let token_probs = match (recipe, &self.continuation) {
                    (MacroblockRecipe::Continuation { .. }, Some(cont)) => &*cont.token_probs,
                    _ => &probs.coeff_probs,
                };
                let linked = |pos: Option<(usize, usize)>| {
                    pos.map_or(0, |(c, r)| y2_nonzero[r * mb_width + c] as usize)
                };
                let y2_context = linked(links[index].above) + linked(links[index].left);
                y2_nonzero[index] =
                    write_block_tokens(enc, token_probs, BlockType::Y2, y2_context, &[recipe.dc()]);

                write_empty_blocks(enc, token_probs, &mut contexts.above[col], &mut contexts.left);
            }
        }

        let token_partitions: Vec<Vec<u8>> =
            token_encoders.into_iter().map(BoolEncoder::finish).collect();
        let tag = FrameTag {
            key_frame,
            version: self.version,
            continuation: self.continuation.is_some(),
            show_frame: self.show_frame,
            width: self.width,
            height: self.height,
        };
        Ok(build_frame(&tag, &first_partition, &token_partitions))
    }
}

/// End-of-block for the 16 luma (after Y2) and 8 chroma blocks
fn write_empty_blocks(
    enc: &mut BoolEncoder,
    probs: &TokenProbs,
    above: &mut NonzeroFlags,
    left: &mut NonzeroFlags,
) {
    for by in 0..4 {
        for bx in 0..4 {
            let context = above.y[bx] as usize + left.y[by] as usize;
            write_block_tokens(enc, probs, BlockType::YAfterY2, context, &[]);
            above.y[bx] = false;
            left.y[by] = false;
        }
    }
    for (above, left) in [(&mut above.u, &mut left.u), (&mut above.v, &mut left.v)] {
        for by in 0..2 {
            for bx in 0..2 {
                let context = above[bx] as usize + left[by] as usize;
                write_block_tokens(enc, probs, BlockType::Chroma, context, &[]);
                above[bx] = false;
                left[by] = false;
            }
        }
    }
}
