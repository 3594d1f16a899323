//! One coded frame, from tag to loop-filtered raster
//!
//! [`Frame::parse`] reads the frame tag and headers; [`Frame::decode`] then
//! runs the macroblock header pass, relinks the Y2 contexts, reads tokens
//! and reconstructs every macroblock in raster order, and finally applies
//! the loop filter. Key and inter frames share this pipeline and differ
//! only in the [`KindHeader`] they carry.

use tracing::trace;

use super::bool_decoder::{BoolDecoder, Partitions};
use super::entropy::{ProbabilityTables, TokenContexts};
use super::filter::{apply_loop_filter, calculate_mb_filter_level, LoopFilterParams, MacroblockFilterInfo};
use super::header::{
    ContinuationHeader, Dimensions, FilterAdjustments, FrameHeader, InterpolationFilter,
    KindHeader, Segmentation, UncompressedChunk,
};
use super::macroblock::{parse_macroblock_headers, MacroblockInfo, MacroblockKind, ModeContext};
use super::quant::Quantizer;
use super::raster::{Raster, ReferenceSet};
use super::reconstruct::{reconstruct_macroblock, ReconstructionContext};
use super::residual::{relink_y2_blocks, MacroblockResidual};
use super::tables::ReferenceFrame;
use crate::error::{Error, Result};

/// Decoder state a frame is decoded against
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    /// Probabilities after this frame's updates
    pub probs: &'a ProbabilityTables,
    pub segmentation: Option<&'a Segmentation>,
    pub filter_adjustments: Option<&'a FilterAdjustments>,
    pub references: &'a ReferenceSet,
    pub loop_filter: bool,
}

/// What decoding a frame learned beyond its pixels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Segment id of every macroblock, raster order
    pub segment_ids: Vec<u8>,
    /// Reference slots read by inter or continuation macroblocks
    pub references_used: [bool; 3],
}

/// A frame whose headers have been parsed
pub struct Frame<'a> {
    pub show_frame: bool,
    pub filter: InterpolationFilter,
    pub dimensions: Option<Dimensions>,
    pub header: FrameHeader,
    pub continuation: Option<ContinuationHeader>,
    modes: BoolDecoder<'a>,
    partitions: Partitions<'a>,
}

impl<'a> Frame<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let chunk = UncompressedChunk::parse(data)?;
        let first = chunk
            .compressed
            .get(..chunk.first_partition_size)
            .ok_or_else(|| {
                Error::bitstream(format!(
                    "first partition needs {} bytes, frame has {}",
                    chunk.first_partition_size,
                    chunk.compressed.len()
                ))
            })?;

        let mut modes = BoolDecoder::new(first);
        let header = FrameHeader::parse(&mut modes, chunk.key_frame)?;
        let continuation = if chunk.continuation {
            Some(ContinuationHeader::parse(&mut modes))
        } else {
            None
        };
        let partitions = Partitions::split(
            chunk.compressed,
            chunk.first_partition_size,
            header.partition_count(),
        )?;

        trace!(
            key_frame = chunk.key_frame,
            version = chunk.version,
            continuation = chunk.continuation,
            partitions = header.partition_count(),
            q = header.quant_indices.y_ac_qi,
            "parsed frame header"
        );

        Ok(Frame {
            show_frame: chunk.show_frame,
            filter: InterpolationFilter::from_version(chunk.version),
            dimensions: chunk.dimensions,
            header,
            continuation,
            modes,
            partitions,
        })
    }

    pub fn is_key_frame(&self) -> bool {
        self.header.is_key_frame()
    }

    /// Decode every macroblock into `raster`
    pub fn decode(&mut self, inputs: &FrameInputs<'_>, raster: &mut Raster) -> Result<FrameReport> {
        let mb_width = raster.macroblock_width();
        let mb_height = raster.macroblock_height();

        let segment_tree_probs = self
            .header
            .segmentation
            .as_ref()
            .filter(|update| update.update_map)
            .map(|update| update.segment_tree_probs());
        let segment_map = inputs.segmentation.map_or(&[][..], |seg| seg.map.as_slice());

        let infos = parse_macroblock_headers(
            &mut self.modes,
            &self.header,
            &ModeContext {
                mb_width,
                mb_height,
                segment_tree_probs,
                segment_map,
                prob_skip_false: self.header.prob_skip_false,
                probs: inputs.probs,
                continuation: self.continuation.is_some(),
            },
        );

        let has_y2: Vec<bool> = infos.iter().map(MacroblockInfo::has_y2).collect();
        let links = relink_y2_blocks(&has_y2, mb_width);

        let quantizers = match inputs.segmentation {
            Some(segmentation) => Quantizer::for_segments(&self.header.quant_indices, segmentation),
            None => [Quantizer::new(&self.header.quant_indices); 4],
        };
        let ctx = ReconstructionContext {
            quantizers: &quantizers,
            references: inputs.references,
            filter: self.filter,
            missing: self.continuation.as_ref().map(|c| &c.missing),
        };

        let mut token_decoders = self.partitions.token_decoders();
        let partition_count = token_decoders.len();
        let mut contexts = TokenContexts::new(mb_width);
        let mut y2_nonzero = vec![false; infos.len()];
        let mut filter_info = Vec::with_capacity(infos.len());
        let mut report = FrameReport {
            segment_ids: infos.iter().map(|info| info.segment_id).collect(),
            references_used: [false; 3],
        };

        for row in 0..mb_height {
            contexts.start_row();
            let d = &mut token_decoders[row % partition_count];

            for col in 0..mb_width {
                let index = row * mb_width + col;
                let info = &infos[index];

                let token_probs = match (&info.kind, &self.continuation) {
                    (MacroblockKind::Continuation { .. }, Some(cont)) => &*cont.token_probs,
                    _ => &inputs.probs.coeff_probs,
                };

                let residual = if info.skip {
                    MacroblockResidual::skipped(&mut contexts.above[col], &mut contexts.left)
                } else {
                    let linked = |pos: Option<(usize, usize)>| {
                        pos.map_or(0, |(c, r)| y2_nonzero[r * mb_width + c] as usize)
                    };
                    let y2_context = linked(links[index].above) + linked(links[index].left);
                    MacroblockResidual::read(
                        d,
                        token_probs,
                        info.has_y2(),
                        y2_context,
                        &mut contexts.above[col],
                        &mut contexts.left,
                    )
                };
                y2_nonzero[index] = residual.y2_nonzero;

                if let Some(reference) = info.reference() {
                    report.references_used[reference_index(reference)] = true;
                }
                reconstruct_macroblock(raster, col, row, info, &residual, &ctx)?;

                filter_info.push(MacroblockFilterInfo {
                    level: 0,
                    skip_inner_edges: info.has_y2() && !residual.has_tokens,
                });
            }
        }

        if inputs.loop_filter && self.header.loop_filter_level != 0 {
            for (info, filter) in infos.iter().zip(filter_info.iter_mut()) {
                filter.level = self.macroblock_filter_level(info, inputs);
            }
            let params = LoopFilterParams {
                simple: self.header.simple_filter,
                sharpness: self.header.sharpness_level,
                key_frame: matches!(self.header.kind, KindHeader::Key(_)),
            };
            apply_loop_filter(raster, &params, &filter_info);
        }

        Ok(report)
    }

    fn macroblock_filter_level(&self, info: &MacroblockInfo, inputs: &FrameInputs<'_>) -> u8 {
        let frame_level = self.header.loop_filter_level as i32;
        let base = match inputs.segmentation {
            Some(seg) => {
                let adjustment = seg.filter_adjustments[info.segment_id as usize & 3] as i32;
                let level = if seg.absolute {
                    adjustment
                } else {
                    frame_level + adjustment
                };
                level.clamp(0, 63)
            }
            None => frame_level,
        };
        calculate_mb_filter_level(base, inputs.filter_adjustments, info.filter_delta_index())
    }
}

fn reference_index(reference: ReferenceFrame) -> usize {
    match reference {
        ReferenceFrame::Last => 0,
        ReferenceFrame::Golden => 1,
        ReferenceFrame::Alternate => 2,
    }
}
