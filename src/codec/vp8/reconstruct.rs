//! Macroblock reconstruction: prediction plus inverse-transformed residual
//!
//! Intra macroblocks predict from the raster being decoded, inter
//! macroblocks from a reference slot, and continuation macroblocks start
//! from the co-located block of a reference slot. Macroblocks must be
//! reconstructed in raster order because intra prediction reads the
//! already reconstructed neighbours.

use super::header::{InterpolationFilter, MissingTracker};
use super::macroblock::{MacroblockInfo, MacroblockKind};
use super::prediction::{
    average_chroma_mv, predict_block, predict_inter, predict_subblock, store_subblock, BlockMode,
    SubblockEdges,
};
use super::quant::{dequantize_block, Quantizer};
use super::raster::{Plane, Raster, ReferenceSet};
use super::residual::{MacroblockResidual, U_BLOCKS, V_BLOCKS, Y2_BLOCK};
use super::tables::LumaMode;
use super::transform::{add_residual, inverse_dct4x4, inverse_dct4x4_dc_only, inverse_wht4x4};
use crate::error::{Error, Result};

/// Continuation residuals are added as coded, without dequantization
const UNIT_QUANTIZER: Quantizer = Quantizer {
    y_ac: 1,
    y_dc: 1,
    y2_ac: 1,
    y2_dc: 1,
    uv_ac: 1,
    uv_dc: 1,
};

/// Frame-wide inputs of macroblock reconstruction
#[derive(Debug, Clone, Copy)]
pub struct ReconstructionContext<'a> {
    /// One quantizer per segment
    pub quantizers: &'a [Quantizer; 4],
    pub references: &'a ReferenceSet,
    pub filter: InterpolationFilter,
    /// Present for frames carrying a continuation header
    pub missing: Option<&'a MissingTracker>,
}

/// Reconstruct one macroblock into `raster`
pub fn reconstruct_macroblock(
    raster: &mut Raster,
    col: usize,
    row: usize,
    info: &MacroblockInfo,
    residual: &MacroblockResidual,
    ctx: &ReconstructionContext<'_>,
) -> Result<()> {
    let quantizer = &ctx.quantizers[info.segment_id as usize & 3];

    match info.kind {
        MacroblockKind::Intra => {
            reconstruct_intra(raster, col, row, info, residual, quantizer);
        }
        MacroblockKind::Inter { reference, .. } => {
            let source = ctx.references.require(reference)?;
            predict_inter_macroblock(source, raster, col, row, info, ctx.filter);
            if residual.has_tokens {
                let luma = luma_residuals(residual, quantizer, info.has_y2());
                add_luma(&mut raster.y, col, row, &luma);
                add_chroma(raster, col, row, residual, quantizer);
            }
        }
        MacroblockKind::Continuation { reference } => {
            if ctx.missing.map_or(false, |m| m.is_missing(reference)) {
                return Err(Error::logic(format!(
                    "continuation macroblock ({}, {}) uses {:?}, which the frame declares missing",
                    col, row, reference
                )));
            }
            let source = ctx.references.require(reference)?;
            raster.copy_macroblock_from(source, col, row);
            if residual.has_tokens {
                let luma = luma_residuals(residual, &UNIT_QUANTIZER, true);
                add_luma(&mut raster.y, col, row, &luma);
                add_chroma(raster, col, row, residual, &UNIT_QUANTIZER);
            }
        }
    }

    Ok(())
}

fn reconstruct_intra(
    raster: &mut Raster,
    col: usize,
    row: usize,
    info: &MacroblockInfo,
    residual: &MacroblockResidual,
    quantizer: &Quantizer,
) {
    let x = col * 16;
    let y = row * 16;
    let luma = luma_residuals(residual, quantizer, info.has_y2());

    match BlockMode::from_luma(info.luma_mode) {
        Some(mode) => {
            predict_block(&mut raster.y, x, y, 16, mode);
            if residual.has_tokens {
                add_luma(&mut raster.y, col, row, &luma);
            }
        }
        None => {
            // Each subblock predicts from its reconstructed predecessors
            debug_assert_eq!(info.luma_mode, LumaMode::B);
            let stride = raster.y.stride();
            for (i, block) in luma.iter().enumerate() {
                let bx = x + (i & 3) * 4;
                let by = y + (i >> 2) * 4;
                let edges = SubblockEdges::gather(&raster.y, x, y, i);
                let predicted = predict_subblock(info.subblock_modes[i], &edges);
                store_subblock(&mut raster.y, bx, by, &predicted);
                add_residual(block, raster.y.data_mut(), by * stride + bx, stride);
            }
        }
    }

    let chroma_mode = BlockMode::from(info.chroma_mode);
    predict_block(&mut raster.u, col * 8, row * 8, 8, chroma_mode);
    predict_block(&mut raster.v, col * 8, row * 8, 8, chroma_mode);
    if residual.has_tokens {
        add_chroma(raster, col, row, residual, quantizer);
    }
}

fn predict_inter_macroblock(
    source: &Raster,
    raster: &mut Raster,
    col: usize,
    row: usize,
    info: &MacroblockInfo,
    filter: InterpolationFilter,
) {
    let x = col * 16;
    let y = row * 16;
    let cx = col * 8;
    let cy = row * 8;
    let full_pixel = filter == InterpolationFilter::FullPixel;

    if !info.is_split() {
        let mv = info.mv;
        predict_inter(
            &source.y,
            &mut raster.y,
            x,
            y,
            16,
            16,
            mv.row as i32,
            mv.col as i32,
            2,
            filter,
        );

        // A quarter-pel luma vector is an eighth-pel chroma vector
        let (mut mv_row, mut mv_col) = (mv.row as i32, mv.col as i32);
        if full_pixel {
            mv_row &= !7;
            mv_col &= !7;
        }
        for (src, dst) in [(&source.u, &mut raster.u), (&source.v, &mut raster.v)] {
            predict_inter(src, dst, cx, cy, 8, 8, mv_row, mv_col, 3, filter);
        }
        return;
    }

    for (i, mv) in info.mvs.iter().enumerate() {
        predict_inter(
            &source.y,
            &mut raster.y,
            x + (i & 3) * 4,
            y + (i >> 2) * 4,
            4,
            4,
            mv.row as i32,
            mv.col as i32,
            2,
            filter,
        );
    }

    for by in 0..2 {
        for bx in 0..2 {
            let first = by * 8 + bx * 2;
            let covering = [first, first + 1, first + 4, first + 5];
            let mv_row = average_chroma_mv(covering.map(|b| info.mvs[b].row as i32), full_pixel);
            let mv_col = average_chroma_mv(covering.map(|b| info.mvs[b].col as i32), full_pixel);
            for (src, dst) in [(&source.u, &mut raster.u), (&source.v, &mut raster.v)] {
                predict_inter(src, dst, cx + bx * 4, cy + by * 4, 4, 4, mv_row, mv_col, 3, filter);
            }
        }
    }
}

fn inverse_transform(coeffs: &[i16; 16]) -> [i16; 16] {
    let mut output = [0i16; 16];
    if coeffs[1..].iter().all(|&c| c == 0) {
        inverse_dct4x4_dc_only(coeffs[0], &mut output);
    } else {
        inverse_dct4x4(coeffs, &mut output);
    }
    output
}

/// Spatial residuals of the 16 luma blocks
fn luma_residuals(
    residual: &MacroblockResidual,
    quantizer: &Quantizer,
    has_y2: bool,
) -> [[i16; 16]; 16] {
    let mut dcs = None;
    if has_y2 {
        let y2 = dequantize_block(&residual.coeffs[Y2_BLOCK], quantizer.y2_dc, quantizer.y2_ac);
        let mut output = [0i16; 16];
        inverse_wht4x4(&y2, &mut output);
        dcs = Some(output);
    }

    let mut blocks = [[0i16; 16]; 16];
    for (i, block) in blocks.iter_mut().enumerate() {
        let mut coeffs = dequantize_block(&residual.coeffs[i], quantizer.y_dc, quantizer.y_ac);
        if let Some(dcs) = &dcs {
            coeffs[0] = dcs[i];
        }
        *block = inverse_transform(&coeffs);
    }
    blocks
}

fn add_luma(plane: &mut Plane, col: usize, row: usize, blocks: &[[i16; 16]; 16]) {
    let stride = plane.stride();
    for (i, block) in blocks.iter().enumerate() {
        let x = col * 16 + (i & 3) * 4;
        let y = row * 16 + (i >> 2) * 4;
        add_residual(block, plane.data_mut(), y * stride + x, stride);
    }
}

fn add_chroma(
    raster: &mut Raster,
    col: usize,
    row: usize,
    residual: &MacroblockResidual,
    quantizer: &Quantizer,
) {
    for (base, plane) in [(U_BLOCKS, &mut raster.u), (V_BLOCKS, &mut raster.v)] {
        let stride = plane.stride();
        for i in 0..4 {
            let coeffs =
                dequantize_block(&residual.coeffs[base + i], quantizer.uv_dc, quantizer.uv_ac);
            let block = inverse_transform(&coeffs);
            let x = col * 8 + (i & 1) * 4;
            let y = row * 8 + (i >> 1) * 4;
            add_residual(&block, plane.data_mut(), y * stride + x, stride);
        }
    }
}
