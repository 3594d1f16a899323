//! VP8 frame header parsing
//!
//! The uncompressed frame tag is read byte-wise; everything else comes out
//! of the first partition through an [`EntropyDecoder`]. Header fields are
//! kept as parsed (with `Option` for fields that may be absent) and applied
//! to the persistent decoder state by the frame pipeline.

use serde::{Deserialize, Serialize};

use super::bool_decoder::EntropyDecoder;
use super::quant::QuantIndices;
use super::tables::{
    ReferenceFrame, TokenProbs, COEFF_UPDATE_PROBS, MAX_SEGMENTS, MV_PROB_COUNT, MV_UPDATE_PROBS,
    NUM_BANDS, NUM_BLOCK_TYPES, NUM_CONTEXTS, NUM_TOKEN_NODES,
};
use crate::error::{Error, Result};

const START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];

/// Bit of the version field that announces a continuation header
pub const CONTINUATION_VERSION_BIT: u8 = 0b100;

/// Interpolation used for motion compensation, selected by the version field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationFilter {
    SixTap,
    Bilinear,
    FullPixel,
}

impl InterpolationFilter {
    pub fn from_version(version: u8) -> Self {
        match version {
            0 => InterpolationFilter::SixTap,
            3 => InterpolationFilter::FullPixel,
            _ => InterpolationFilter::Bilinear,
        }
    }
}

/// Key frame dimensions and upscaling hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u16,
    pub horizontal_scale: u8,
    pub height: u16,
    pub vertical_scale: u8,
}

/// The byte-aligned start of every frame
#[derive(Debug, Clone)]
pub struct UncompressedChunk<'a> {
    pub key_frame: bool,
    pub version: u8,
    pub continuation: bool,
    pub show_frame: bool,
    pub first_partition_size: usize,
    pub dimensions: Option<Dimensions>,
    /// First partition followed by the token partitions
    pub compressed: &'a [u8],
}

impl<'a> UncompressedChunk<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::bitstream("frame too small for frame tag"));
        }

        let tag = (data[2] as u32) << 16 | (data[1] as u32) << 8 | data[0] as u32;
        let key_frame = tag & 1 == 0;
        let version_field = ((tag >> 1) & 0x7) as u8;
        let show_frame = (tag >> 4) & 1 == 1;
        let first_partition_size = (tag >> 5) as usize;

        let continuation = version_field & CONTINUATION_VERSION_BIT != 0;
        if key_frame && continuation {
            return Err(Error::bitstream("key frames cannot carry a continuation header"));
        }

        let (dimensions, compressed) = if key_frame {
            if data.len() < 10 {
                return Err(Error::bitstream("key frame too small for dimensions"));
            }
            if data[3..6] != START_CODE {
                return Err(Error::bitstream(format!(
                    "invalid start code {:02x} {:02x} {:02x}",
                    data[3], data[4], data[5]
                )));
            }
            let w = u16::from_le_bytes([data[6], data[7]]);
            let h = u16::from_le_bytes([data[8], data[9]]);
            let dimensions = Dimensions {
                width: w & 0x3FFF,
                horizontal_scale: (w >> 14) as u8,
                height: h & 0x3FFF,
                vertical_scale: (h >> 14) as u8,
            };
            if dimensions.width == 0 || dimensions.height == 0 {
                return Err(Error::bitstream("key frame with zero dimension"));
            }
            (Some(dimensions), &data[10..])
        } else {
            (None, &data[3..])
        };

        Ok(UncompressedChunk {
            key_frame,
            version: version_field & !CONTINUATION_VERSION_BIT,
            continuation,
            show_frame,
            first_partition_size,
            dimensions,
            compressed,
        })
    }
}

/// Segment feature values sent by one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentFeatureData {
    pub absolute: bool,
    pub quantizer: [Option<i8>; MAX_SEGMENTS],
    pub filter_level: [Option<i8>; MAX_SEGMENTS],
}

/// Segmentation syntax of one frame header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentationUpdate {
    pub update_map: bool,
    pub feature_data: Option<SegmentFeatureData>,
    /// Tree probabilities, present only when the map is updated
    pub tree_probs: [Option<u8>; 3],
}

impl SegmentationUpdate {
    fn parse<D: EntropyDecoder>(d: &mut D) -> Self {
        let update_map = d.read_flag();
        let update_data = d.read_flag();

        let feature_data = if update_data {
            let absolute = d.read_flag();
            let mut data = SegmentFeatureData {
                absolute,
                ..Default::default()
            };
            for q in data.quantizer.iter_mut() {
                *q = d.read_optional_signed(7).map(|v| v as i8);
            }
            for lf in data.filter_level.iter_mut() {
                *lf = d.read_optional_signed(6).map(|v| v as i8);
            }
            Some(data)
        } else {
            None
        };

        let mut tree_probs = [None; 3];
        if update_map {
            for prob in tree_probs.iter_mut() {
                *prob = d.read_optional_literal(8).map(|v| v as u8);
            }
        }

        SegmentationUpdate {
            update_map,
            feature_data,
            tree_probs,
        }
    }

    /// Segment id tree probabilities, 255 where not sent
    pub fn segment_tree_probs(&self) -> [u8; 3] {
        let mut probs = [255u8; 3];
        if self.update_map {
            for (prob, sent) in probs.iter_mut().zip(self.tree_probs.iter()) {
                *prob = sent.unwrap_or(255);
            }
        }
        probs
    }
}

/// Persistent segmentation state
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segmentation {
    pub absolute: bool,
    pub quantizer_adjustments: [i8; MAX_SEGMENTS],
    pub filter_adjustments: [i8; MAX_SEGMENTS],
    /// Segment id of every macroblock, raster order
    pub map: Vec<u8>,
}

impl Segmentation {
    pub fn apply(&mut self, update: &SegmentationUpdate) {
        if let Some(data) = &update.feature_data {
            self.absolute = data.absolute;
            for i in 0..MAX_SEGMENTS {
                self.quantizer_adjustments[i] = data.quantizer[i].unwrap_or(0);
                self.filter_adjustments[i] = data.filter_level[i].unwrap_or(0);
            }
        }
    }

    pub fn segment_id(&self, index: usize) -> u8 {
        self.map.get(index).copied().unwrap_or(0)
    }
}

/// Loop filter delta syntax of one frame header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterDeltaUpdate {
    pub ref_deltas: [Option<i8>; 4],
    pub mode_deltas: [Option<i8>; 4],
}

/// Persistent mode- and reference-based loop filter adjustments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterAdjustments {
    /// Intra, last, golden, alternate
    pub ref_deltas: [i8; 4],
    /// B_PRED, ZERO, NEAREST/NEAR/NEW, SPLIT
    pub mode_deltas: [i8; 4],
}

impl FilterAdjustments {
    pub fn apply(&mut self, update: &FilterDeltaUpdate) {
        for i in 0..4 {
            if let Some(delta) = update.ref_deltas[i] {
                self.ref_deltas[i] = delta;
            }
            if let Some(delta) = update.mode_deltas[i] {
                self.mode_deltas[i] = delta;
            }
        }
    }
}

/// One coefficient probability replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenProbUpdate {
    pub block_type: usize,
    pub band: usize,
    pub context: usize,
    pub node: usize,
    pub prob: u8,
}

/// One motion vector probability replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvProbUpdate {
    pub component: usize,
    pub index: usize,
    pub prob: u8,
}

/// Header fields only key frames carry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFrameHeader {
    pub color_space: bool,
    pub clamping_type: bool,
}

/// Header fields only inter frames carry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterFrameHeader {
    pub refresh_golden: bool,
    pub refresh_alternate: bool,
    /// 1 = last, 2 = alternate
    pub copy_buffer_to_golden: Option<u8>,
    /// 1 = last, 2 = golden
    pub copy_buffer_to_alternate: Option<u8>,
    pub sign_bias_golden: bool,
    pub sign_bias_alternate: bool,
    pub refresh_last: bool,
    pub prob_inter: u8,
    pub prob_references_last: u8,
    pub prob_references_golden: u8,
    pub intra_16x16_probs: Option<[u8; 4]>,
    pub intra_chroma_probs: Option<[u8; 3]>,
    pub mv_prob_updates: Vec<MvProbUpdate>,
}

impl InterFrameHeader {
    pub fn sign_bias(&self, reference: ReferenceFrame) -> bool {
        match reference {
            ReferenceFrame::Last => false,
            ReferenceFrame::Golden => self.sign_bias_golden,
            ReferenceFrame::Alternate => self.sign_bias_alternate,
        }
    }
}

/// Kind-specific part of a frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindHeader {
    Key(KeyFrameHeader),
    Inter(InterFrameHeader),
}

/// Compressed frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: KindHeader,
    /// `None` when segmentation is disabled
    pub segmentation: Option<SegmentationUpdate>,
    pub simple_filter: bool,
    pub loop_filter_level: u8,
    pub sharpness_level: u8,
    /// `None` when mode/ref adjustments are disabled, inner `None` when
    /// enabled without new deltas
    pub filter_adjustments: Option<Option<FilterDeltaUpdate>>,
    pub log2_partition_count: u8,
    pub quant_indices: QuantIndices,
    pub refresh_entropy_probs: bool,
    pub token_prob_updates: Vec<TokenProbUpdate>,
    pub prob_skip_false: Option<u8>,
}

impl FrameHeader {
    pub fn parse<D: EntropyDecoder>(d: &mut D, key_frame: bool) -> Result<Self> {
        let key = if key_frame {
            Some(KeyFrameHeader {
                color_space: d.read_flag(),
                clamping_type: d.read_flag(),
            })
        } else {
            None
        };

        let segmentation = if d.read_flag() {
            Some(SegmentationUpdate::parse(d))
        } else {
            None
        };

        let simple_filter = d.read_flag();
        let loop_filter_level = d.read_literal(6) as u8;
        let sharpness_level = d.read_literal(3) as u8;

        let filter_adjustments = if d.read_flag() {
            if d.read_flag() {
                let mut update = FilterDeltaUpdate::default();
                for delta in update.ref_deltas.iter_mut() {
                    *delta = d.read_optional_signed(6).map(|v| v as i8);
                }
                for delta in update.mode_deltas.iter_mut() {
                    *delta = d.read_optional_signed(6).map(|v| v as i8);
                }
                Some(Some(update))
            } else {
                Some(None)
            }
        } else {
            None
        };

        let log2_partition_count = d.read_literal(2) as u8;

        let quant_indices = QuantIndices {
            y_ac_qi: d.read_literal(7) as u8,
            y_dc: d.read_optional_signed(4).map(|v| v as i8),
            y2_dc: d.read_optional_signed(4).map(|v| v as i8),
            y2_ac: d.read_optional_signed(4).map(|v| v as i8),
            uv_dc: d.read_optional_signed(4).map(|v| v as i8),
            uv_ac: d.read_optional_signed(4).map(|v| v as i8),
        };

        let (mut inter, refresh_entropy_probs) = if key.is_some() {
            (None, d.read_flag())
        } else {
            let refresh_golden = d.read_flag();
            let refresh_alternate = d.read_flag();
            let copy_buffer_to_golden = if refresh_golden {
                None
            } else {
                Some(d.read_literal(2) as u8)
            };
            let copy_buffer_to_alternate = if refresh_alternate {
                None
            } else {
                Some(d.read_literal(2) as u8)
            };
            let sign_bias_golden = d.read_flag();
            let sign_bias_alternate = d.read_flag();
            let refresh_entropy_probs = d.read_flag();
            let refresh_last = d.read_flag();

            let header = InterFrameHeader {
                refresh_golden,
                refresh_alternate,
                copy_buffer_to_golden,
                copy_buffer_to_alternate,
                sign_bias_golden,
                sign_bias_alternate,
                refresh_last,
                ..Default::default()
            };
            (Some(header), refresh_entropy_probs)
        };

        let mut token_prob_updates = Vec::new();
        for block_type in 0..NUM_BLOCK_TYPES {
            for band in 0..NUM_BANDS {
                for context in 0..NUM_CONTEXTS {
                    for node in 0..NUM_TOKEN_NODES {
                        if d.read_bool(COEFF_UPDATE_PROBS[block_type][band][context][node]) {
                            token_prob_updates.push(TokenProbUpdate {
                                block_type,
                                band,
                                context,
                                node,
                                prob: d.read_literal(8) as u8,
                            });
                        }
                    }
                }
            }
        }

        let prob_skip_false = d.read_optional_literal(8).map(|v| v as u8);

        if let Some(header) = inter.as_mut() {
            header.prob_inter = d.read_literal(8) as u8;
            header.prob_references_last = d.read_literal(8) as u8;
            header.prob_references_golden = d.read_literal(8) as u8;

            if d.read_flag() {
                let mut probs = [0u8; 4];
                for prob in probs.iter_mut() {
                    *prob = d.read_literal(8) as u8;
                }
                header.intra_16x16_probs = Some(probs);
            }
            if d.read_flag() {
                let mut probs = [0u8; 3];
                for prob in probs.iter_mut() {
                    *prob = d.read_literal(8) as u8;
                }
                header.intra_chroma_probs = Some(probs);
            }

            for component in 0..2 {
                for index in 0..MV_PROB_COUNT {
                    if d.read_bool(MV_UPDATE_PROBS[component][index]) {
                        let value = d.read_literal(7) as u8;
                        header.mv_prob_updates.push(MvProbUpdate {
                            component,
                            index,
                            prob: if value == 0 { 1 } else { value << 1 },
                        });
                    }
                }
            }
        }

        let kind = match (key, inter) {
            (Some(key), _) => KindHeader::Key(key),
            (None, Some(inter)) => KindHeader::Inter(inter),
            (None, None) => return Err(Error::logic("frame header without a kind")),
        };

        Ok(FrameHeader {
            kind,
            segmentation,
            simple_filter,
            loop_filter_level,
            sharpness_level,
            filter_adjustments,
            log2_partition_count,
            quant_indices,
            refresh_entropy_probs,
            token_prob_updates,
            prob_skip_false,
        })
    }

    pub fn is_key_frame(&self) -> bool {
        matches!(self.kind, KindHeader::Key(_))
    }

    pub fn partition_count(&self) -> usize {
        1 << self.log2_partition_count
    }

    pub fn inter(&self) -> Option<&InterFrameHeader> {
        match &self.kind {
            KindHeader::Inter(inter) => Some(inter),
            KindHeader::Key(_) => None,
        }
    }
}

/// Reference slots a continuation frame declares absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissingTracker {
    pub last: bool,
    pub golden: bool,
    pub alternate: bool,
}

impl MissingTracker {
    pub fn is_missing(&self, reference: ReferenceFrame) -> bool {
        match reference {
            ReferenceFrame::Last => self.last,
            ReferenceFrame::Golden => self.golden,
            ReferenceFrame::Alternate => self.alternate,
        }
    }
}

/// Header of a continuation frame
///
/// Continuation macroblocks are tokenized with this table instead of the
/// frame's own coefficient probabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationHeader {
    pub missing: MissingTracker,
    pub token_probs: Box<TokenProbs>,
}

impl ContinuationHeader {
    pub fn parse<D: EntropyDecoder>(d: &mut D) -> Self {
        let missing = MissingTracker {
            last: d.read_flag(),
            golden: d.read_flag(),
            alternate: d.read_flag(),
        };

        let mut token_probs = Box::new([[[[0u8; NUM_TOKEN_NODES]; NUM_CONTEXTS]; NUM_BANDS];
            NUM_BLOCK_TYPES]);
        for block_type in token_probs.iter_mut() {
            for band in block_type.iter_mut() {
                for context in band.iter_mut() {
                    for prob in context.iter_mut() {
                        *prob = d.read_literal(8) as u8;
                    }
                }
            }
        }

        ContinuationHeader {
            missing,
            token_probs,
        }
    }
}
