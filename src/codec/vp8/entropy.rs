//! VP8 probability tables and DCT token decoding
//!
//! Residual coefficients are coded as a token tree per position. The tree
//! probabilities depend on the block type, the coefficient band and a
//! three-valued context built from neighbouring blocks.

use serde::{Deserialize, Serialize};

use super::bool_decoder::EntropyDecoder;
use super::header::{FrameHeader, KindHeader};
use super::tables::{
    TokenProbs, COEFF_BANDS, DCT_0, DCT_CAT1, DCT_CAT_BASE, DCT_EOB, DCT_TOKEN_TREE,
    DEFAULT_COEFF_PROBS, DEFAULT_MV_PROBS, DEFAULT_UV_MODE_PROBS, DEFAULT_YMODE_PROBS,
    MV_PROB_COUNT, PROB_DCT_CAT, ZIGZAG,
};

/// Adaptive probabilities carried from frame to frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbabilityTables {
    pub coeff_probs: TokenProbs,
    pub y_mode_probs: [u8; 4],
    pub uv_mode_probs: [u8; 3],
    pub motion_vector_probs: [[u8; MV_PROB_COUNT]; 2],
}

impl Default for ProbabilityTables {
    fn default() -> Self {
        ProbabilityTables {
            coeff_probs: DEFAULT_COEFF_PROBS,
            y_mode_probs: DEFAULT_YMODE_PROBS,
            uv_mode_probs: DEFAULT_UV_MODE_PROBS,
            motion_vector_probs: DEFAULT_MV_PROBS,
        }
    }
}

impl ProbabilityTables {
    /// Apply the probability updates a frame header carries
    pub fn update(&mut self, header: &FrameHeader) {
        for u in &header.token_prob_updates {
            self.coeff_probs[u.block_type][u.band][u.context][u.node] = u.prob;
        }

        if let KindHeader::Inter(inter) = &header.kind {
            if let Some(probs) = inter.intra_16x16_probs {
                self.y_mode_probs = probs;
            }
            if let Some(probs) = inter.intra_chroma_probs {
                self.uv_mode_probs = probs;
            }
            for u in &inter.mv_prob_updates {
                self.motion_vector_probs[u.component][u.index] = u.prob;
            }
        }
    }

    /// Feed the tables into a fingerprint in a fixed order
    pub fn write_canonical(&self, out: &mut Vec<u8>) {
        for block_type in self.coeff_probs.iter() {
            for band in block_type.iter() {
                for context in band.iter() {
                    out.extend_from_slice(context);
                }
            }
        }
        out.extend_from_slice(&self.y_mode_probs);
        out.extend_from_slice(&self.uv_mode_probs);
        out.extend_from_slice(&self.motion_vector_probs[0]);
        out.extend_from_slice(&self.motion_vector_probs[1]);
    }
}

/// Coefficient block types, numbered as in the probability tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Luma block whose DC lives in the Y2 block
    YAfterY2 = 0,
    Y2 = 1,
    Chroma = 2,
    /// Luma block carrying its own DC
    YWithDc = 3,
}

impl BlockType {
    pub fn first_coefficient(self) -> usize {
        match self {
            BlockType::YAfterY2 => 1,
            _ => 0,
        }
    }
}

/// Read the tokens of one 4x4 block
///
/// `context` is the number of neighbouring blocks (above, left) that had
/// tokens. Coefficients land in raster order, not yet dequantized. Returns
/// whether any token other than end-of-block was read.
pub fn read_block_tokens<D: EntropyDecoder>(
    d: &mut D,
    probs: &TokenProbs,
    block_type: BlockType,
    context: usize,
    coeffs: &mut [i16; 16],
) -> bool {
    let probs = &probs[block_type as usize];
    let mut context = context;
    let mut has_tokens = false;
    let mut after_zero = false;

    for i in block_type.first_coefficient()..16 {
        let table = &probs[COEFF_BANDS[i]][context];

        // End of block cannot directly follow a zero
        let start = if after_zero { 2 } else { 0 };
        let token = d.read_tree_from(&DCT_TOKEN_TREE, table, start) as i8;

        let magnitude: u16 = match token {
            DCT_EOB => break,
            DCT_0 => {
                after_zero = true;
                has_tokens = true;
                context = 0;
                continue;
            }
            literal @ 1..=4 => literal as u16,
            category => {
                let index = (category - DCT_CAT1) as usize;
                let extra_probs = &PROB_DCT_CAT[index];
                let mut extra = 0u16;
                for &prob in extra_probs.iter().take_while(|&&p| p > 0) {
                    extra = (extra << 1) | d.read_bool(prob) as u16;
                }
                DCT_CAT_BASE[index] + extra
            }
        };

        after_zero = false;
        has_tokens = true;
        context = if magnitude == 1 { 1 } else { 2 };

        let value = if d.read_flag() {
            -(magnitude as i16)
        } else {
            magnitude as i16
        };
        coeffs[ZIGZAG[i]] = value;
    }

    has_tokens
}

/// Per-4x4-column and per-row "had tokens" flags used as token contexts
#[derive(Debug, Clone, Copy, Default)]
pub struct NonzeroFlags {
    pub y: [bool; 4],
    pub u: [bool; 2],
    pub v: [bool; 2],
}

impl NonzeroFlags {
    pub fn clear(&mut self) {
        *self = NonzeroFlags::default();
    }
}

/// Token contexts for one frame, reset per frame (above) and per row (left)
#[derive(Debug, Clone)]
pub struct TokenContexts {
    pub above: Vec<NonzeroFlags>,
    pub left: NonzeroFlags,
}

impl TokenContexts {
    pub fn new(macroblock_width: usize) -> Self {
        TokenContexts {
            above: vec![NonzeroFlags::default(); macroblock_width],
            left: NonzeroFlags::default(),
        }
    }

    pub fn start_row(&mut self) {
        self.left.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vp8::bool_decoder::BoolDecoder;
    use crate::codec::vp8::bool_encoder::BoolEncoder;
    use crate::codec::vp8::frame_writer::write_block_tokens;
    use crate::codec::vp8::header::{InterFrameHeader, MvProbUpdate, TokenProbUpdate};
    use crate::codec::vp8::quant::QuantIndices;

    #[test]
    fn test_tokens_land_in_zigzag_order() {
        let values = [7i16, 0, -1, 300, 0, 0, 2];
        let mut enc = BoolEncoder::new();
        write_block_tokens(&mut enc, &DEFAULT_COEFF_PROBS, BlockType::YWithDc, 1, &values);
        let data = enc.finish();

        let mut coeffs = [0i16; 16];
        let mut d = BoolDecoder::new(&data);
        assert!(read_block_tokens(
            &mut d,
            &DEFAULT_COEFF_PROBS,
            BlockType::YWithDc,
            1,
            &mut coeffs
        ));
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(coeffs[ZIGZAG[i]], v);
        }
    }

    #[test]
    fn test_y_after_y2_skips_dc() {
        let values = [3i16, -2048];
        let mut enc = BoolEncoder::new();
        write_block_tokens(&mut enc, &DEFAULT_COEFF_PROBS, BlockType::YAfterY2, 0, &values);
        let data = enc.finish();

        let mut coeffs = [0i16; 16];
        let mut d = BoolDecoder::new(&data);
        read_block_tokens(&mut d, &DEFAULT_COEFF_PROBS, BlockType::YAfterY2, 0, &mut coeffs);
        assert_eq!(coeffs[0], 0);
        assert_eq!(coeffs[ZIGZAG[1]], 3);
        assert_eq!(coeffs[ZIGZAG[2]], -2048);
    }

    #[test]
    fn test_empty_block_has_no_tokens() {
        let mut enc = BoolEncoder::new();
        write_block_tokens(&mut enc, &DEFAULT_COEFF_PROBS, BlockType::Chroma, 2, &[]);
        let data = enc.finish();

        let mut coeffs = [0i16; 16];
        let mut d = BoolDecoder::new(&data);
        assert!(!read_block_tokens(
            &mut d,
            &DEFAULT_COEFF_PROBS,
            BlockType::Chroma,
            2,
            &mut coeffs
        ));
        assert_eq!(coeffs, [0; 16]);
    }

    #[test]
    fn test_probability_update() {
        let mut tables = ProbabilityTables::default();
        let header = FrameHeader {
            kind: KindHeader::Inter(InterFrameHeader {
                intra_16x16_probs: Some([1, 2, 3, 4]),
                mv_prob_updates: vec![MvProbUpdate {
                    component: 1,
                    index: 18,
                    prob: 2,
                }],
                ..Default::default()
            }),
            segmentation: None,
            simple_filter: false,
            loop_filter_level: 0,
            sharpness_level: 0,
            filter_adjustments: None,
            log2_partition_count: 0,
            quant_indices: QuantIndices::default(),
            refresh_entropy_probs: true,
            token_prob_updates: vec![TokenProbUpdate {
                block_type: 3,
                band: 7,
                context: 2,
                node: 10,
                prob: 77,
            }],
            prob_skip_false: None,
        };
        tables.update(&header);
        assert_eq!(tables.y_mode_probs, [1, 2, 3, 4]);
        assert_eq!(tables.uv_mode_probs, DEFAULT_UV_MODE_PROBS);
        assert_eq!(tables.motion_vector_probs[1][18], 2);
        assert_eq!(tables.coeff_probs[3][7][2][10], 77);
    }
}
