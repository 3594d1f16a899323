//! Residual coefficients of a macroblock
//!
//! Each macroblock has up to 25 4x4 blocks of tokens: 16 luma, 4 + 4
//! chroma and an optional Y2 block holding the luma DCs. The Y2 token
//! context does not come from the adjacent macroblocks but from the
//! nearest macroblocks above and to the left that actually coded a Y2
//! block, see [`relink_y2_blocks`].

use super::bool_decoder::EntropyDecoder;
use super::entropy::{read_block_tokens, BlockType, NonzeroFlags};
use super::tables::TokenProbs;

/// Index of the Y2 block in [`MacroblockResidual::coeffs`]
pub const Y2_BLOCK: usize = 24;
/// Index of the first U block
pub const U_BLOCKS: usize = 16;
/// Index of the first V block
pub const V_BLOCKS: usize = 20;

/// Quantized coefficients of one macroblock, raster order within blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroblockResidual {
    pub coeffs: [[i16; 16]; 25],
    /// The Y2 block had tokens (context for later Y2 blocks)
    pub y2_nonzero: bool,
    /// Any block had tokens
    pub has_tokens: bool,
}

impl Default for MacroblockResidual {
    fn default() -> Self {
        MacroblockResidual {
            coeffs: [[0; 16]; 25],
            y2_nonzero: false,
            has_tokens: false,
        }
    }
}

impl MacroblockResidual {
    /// Read the tokens of one macroblock, updating the above/left contexts
    pub fn read<D: EntropyDecoder>(
        d: &mut D,
        probs: &TokenProbs,
        has_y2: bool,
        y2_context: usize,
        above: &mut NonzeroFlags,
        left: &mut NonzeroFlags,
    ) -> Self {
        let mut residual = MacroblockResidual::default();

        let luma_type = if has_y2 {
            residual.y2_nonzero = read_block_tokens(
                d,
                probs,
                BlockType::Y2,
                y2_context,
                &mut residual.coeffs[Y2_BLOCK],
            );
            residual.has_tokens |= residual.y2_nonzero;
            BlockType::YAfterY2
        } else {
            BlockType::YWithDc
        };

        for by in 0..4 {
            for bx in 0..4 {
                let context = above.y[bx] as usize + left.y[by] as usize;
                let nonzero = read_block_tokens(
                    d,
                    probs,
                    luma_type,
                    context,
                    &mut residual.coeffs[by * 4 + bx],
                );
                above.y[bx] = nonzero;
                left.y[by] = nonzero;
                residual.has_tokens |= nonzero;
            }
        }

        for (base, above, left) in [
            (U_BLOCKS, &mut above.u, &mut left.u),
            (V_BLOCKS, &mut above.v, &mut left.v),
        ] {
            for by in 0..2 {
                for bx in 0..2 {
                    let context = above[bx] as usize + left[by] as usize;
                    let nonzero = read_block_tokens(
                        d,
                        probs,
                        BlockType::Chroma,
                        context,
                        &mut residual.coeffs[base + by * 2 + bx],
                    );
                    above[bx] = nonzero;
                    left[by] = nonzero;
                    residual.has_tokens |= nonzero;
                }
            }
        }

        residual
    }

    /// Residual of a macroblock without tokens, clearing the luma and
    /// chroma contexts it covers
    pub fn skipped(above: &mut NonzeroFlags, left: &mut NonzeroFlags) -> Self {
        above.clear();
        left.clear();
        MacroblockResidual::default()
    }
}

/// Nearest Y2-coding macroblocks, as (column, row)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Y2Links {
    pub above: Option<(usize, usize)>,
    pub left: Option<(usize, usize)>,
}

/// Find, for every macroblock in raster order, the nearest macroblock
/// above in the same column and to the left in the same row that codes a
/// Y2 block
///
/// Macroblocks without Y2 pass the pointers through unchanged.
pub fn relink_y2_blocks(has_y2: &[bool], mb_width: usize) -> Vec<Y2Links> {
    let mut above_coded: Vec<Option<(usize, usize)>> = vec![None; mb_width];
    let mut links = Vec::with_capacity(has_y2.len());

    for (row, chunk) in has_y2.chunks(mb_width.max(1)).enumerate() {
        let mut left_coded = None;
        for (col, &coded) in chunk.iter().enumerate() {
            links.push(Y2Links {
                above: above_coded[col],
                left: left_coded,
            });
            if coded {
                above_coded[col] = Some((col, row));
                left_coded = Some((col, row));
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vp8::bool_decoder::BoolDecoder;
    use crate::codec::vp8::bool_encoder::BoolEncoder;
    use crate::codec::vp8::tables::{DCT_TOKEN_TREE, DEFAULT_COEFF_PROBS};

    #[test]
    fn test_relink_two_by_two() {
        // Only (0,0) and (1,1) code Y2
        let links = relink_y2_blocks(&[true, false, false, true], 2);

        // (0,1) looks up its column past nothing to (0,0)
        assert_eq!(links[2].above, Some((0, 0)));
        assert_eq!(links[2].left, None);

        // (1,1) inherits through the uncoded (1,0) and (0,1)
        assert_eq!(links[3].above, links[1].above);
        assert_eq!(links[3].left, links[2].left);
        assert_eq!(links[3], Y2Links::default());
    }

    #[test]
    fn test_relink_skips_uncoded_blocks() {
        // 3x3, the centre column and the middle row have gaps
        #[rustfmt::skip]
        let has_y2 = [
            true,  true,  true,
            true,  false, true,
            false, true,  false,
        ];
        let links = relink_y2_blocks(&has_y2, 3);

        // (2,1) reaches past the uncoded (1,1) to (0,1)
        assert_eq!(links[5].left, Some((0, 1)));
        // (1,2) reaches past the uncoded (1,1) to (1,0)
        assert_eq!(links[7].above, Some((1, 0)));
        // (2,2) takes (1,2) on the left, (2,1) above
        assert_eq!(
            links[8],
            Y2Links {
                above: Some((2, 1)),
                left: Some((1, 2)),
            }
        );
        // Left pointers never cross rows
        assert_eq!(links[3].left, None);
    }

    fn write_eob(enc: &mut BoolEncoder, block_type: usize, band: usize, context: usize) {
        enc.write_tree(
            &DCT_TOKEN_TREE,
            &DEFAULT_COEFF_PROBS[block_type][band][context],
            11,
        );
    }

    #[test]
    fn test_read_residual_contexts() {
        let probs = DEFAULT_COEFF_PROBS;
        let mut enc = BoolEncoder::new();
        // Y2: a single 1 at position 0, then end of block
        enc.write_tree(&DCT_TOKEN_TREE, &probs[1][0][0], 1);
        enc.write_flag(false);
        write_eob(&mut enc, 1, 1, 1);
        // 16 luma blocks and 8 chroma blocks without tokens
        for _ in 0..16 {
            write_eob(&mut enc, 0, 1, 0);
        }
        for _ in 0..8 {
            write_eob(&mut enc, 2, 0, 0);
        }
        let data = enc.finish();

        let mut above = NonzeroFlags::default();
        let mut left = NonzeroFlags::default();

        let residual = MacroblockResidual::read(
            &mut BoolDecoder::new(&data),
            &probs,
            true,
            0,
            &mut above,
            &mut left,
        );
        assert!(residual.y2_nonzero);
        assert!(residual.has_tokens);
        assert_eq!(residual.coeffs[Y2_BLOCK][0], 1);
        assert_eq!(above.y, [false; 4]);
        assert_eq!(left.u, [false; 2]);
    }

    #[test]
    fn test_skipped_clears_contexts() {
        let mut above = NonzeroFlags {
            y: [true; 4],
            u: [true; 2],
            v: [true; 2],
        };
        let mut left = above;
        let residual = MacroblockResidual::skipped(&mut above, &mut left);
        assert!(!residual.has_tokens);
        assert_eq!(above.y, [false; 4]);
        assert_eq!(left.v, [false; 2]);
    }
}
