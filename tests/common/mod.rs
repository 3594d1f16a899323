//! Common test utilities for vpx-trajectory integration tests
//!
//! Every bitstream used by the suites is synthesized here with the crate's
//! own [`FrameBuilder`], so the expected pixels follow from the recipes:
//! at the default quantizer a Y2 DC of 40 adds 16 to every luma pixel of
//! a macroblock, and a continuation DC of 1024 does the same.

#![allow(dead_code)]

use vpx_trajectory::codec::vp8::tables::{ChromaMode, LumaMode};
use vpx_trajectory::codec::vp8::{FrameBuilder, MacroblockRecipe, ReferenceFrame};

/// Y2 DC that brightens a macroblock by [`STEP`] at the default quantizer
pub const DC_STEP: i16 = 40;
/// Continuation DC with the same effect
pub const CONTINUATION_STEP: i16 = 1024;
pub const STEP: u8 = 16;

// ============================================================================
// Recipes
// ============================================================================

pub fn intra(dc: i16) -> MacroblockRecipe {
    MacroblockRecipe::Intra {
        luma: LumaMode::Dc,
        chroma: ChromaMode::Dc,
        dc,
    }
}

pub fn inter(reference: ReferenceFrame, dc: i16) -> MacroblockRecipe {
    MacroblockRecipe::Inter { reference, dc }
}

pub fn continuation(reference: ReferenceFrame, dc: i16) -> MacroblockRecipe {
    MacroblockRecipe::Continuation { reference, dc }
}

// ============================================================================
// Frames
// ============================================================================

/// Key frame with one DC for every macroblock
pub fn key_frame(width: u16, height: u16, dc: i16) -> Vec<u8> {
    FrameBuilder::key_frame(width, height)
        .fill(intra(dc))
        .build()
        .expect("key frame")
}

/// Inter frame predicting every macroblock from the last slot
pub fn inter_frame(width: u16, height: u16, dc: i16) -> Vec<u8> {
    FrameBuilder::inter_frame(width, height)
        .fill(inter(ReferenceFrame::Last, dc))
        .build()
        .expect("inter frame")
}

/// Continuation frame copying the last slot, refreshing only the last slot
pub fn continuation_frame(width: u16, height: u16, dc: i16) -> Vec<u8> {
    FrameBuilder::inter_frame(width, height)
        .continuation(continuation_header())
        .fill(continuation(ReferenceFrame::Last, dc))
        .build()
        .expect("continuation frame")
}

pub fn continuation_header() -> vpx_trajectory::codec::vp8::ContinuationHeader {
    vpx_trajectory::codec::vp8::ContinuationHeader {
        missing: Default::default(),
        token_probs: Box::new(vpx_trajectory::codec::vp8::tables::DEFAULT_COEFF_PROBS),
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Assert every visible luma pixel of a macroblock equals `value`
pub fn assert_macroblock_luma(
    raster: &vpx_trajectory::codec::vp8::Raster,
    col: usize,
    row: usize,
    value: u8,
) {
    for y in row * 16..row * 16 + 16 {
        for x in col * 16..col * 16 + 16 {
            assert_eq!(
                raster.y.at(x, y),
                value,
                "luma ({}, {}) of macroblock ({}, {})",
                x,
                y,
                col,
                row
            );
        }
    }
}

/// Assert every luma pixel in the visible area equals `value`
pub fn assert_flat_luma(raster: &vpx_trajectory::codec::vp8::Raster, value: u8) {
    for row in 0..raster.macroblock_height() {
        for col in 0..raster.macroblock_width() {
            assert_macroblock_luma(raster, col, row, value);
        }
    }
}
