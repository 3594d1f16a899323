//! VP8 decoding session
//!
//! A [`Decoder`] owns everything that survives from one frame to the next:
//! the persistent [`DecoderState`] (probabilities, segmentation and filter
//! deltas), the three reference slots, the continuation fingerprint and a
//! pool of spare rasters. [`Decoder::decode`] works on a copy of the state
//! and only commits it, and the new references, once the frame decoded
//! successfully.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::entropy::ProbabilityTables;
use super::frame::{Frame, FrameInputs};
use super::header::{ContinuationHeader, FilterAdjustments, FrameHeader, KindHeader, Segmentation};
use super::raster::{RasterHandle, RasterPool, ReferenceSet};
use crate::error::{Error, Result};
use crate::util::Fingerprinter;

/// Entropy and filter state carried between frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderState {
    pub width: u16,
    pub height: u16,
    pub probability_tables: ProbabilityTables,
    pub segmentation: Option<Segmentation>,
    pub filter_adjustments: Option<FilterAdjustments>,
}

impl DecoderState {
    pub fn new(width: u16, height: u16) -> Self {
        DecoderState {
            width,
            height,
            probability_tables: ProbabilityTables::default(),
            segmentation: None,
            filter_adjustments: None,
        }
    }

    /// Fold a frame header into the state
    ///
    /// Returns the probabilities the frame is decoded with. They become the
    /// persistent tables only when the header asks for it.
    pub fn apply_header(&mut self, header: &FrameHeader) -> ProbabilityTables {
        if header.is_key_frame() {
            self.probability_tables = ProbabilityTables::default();
            self.segmentation = None;
            self.filter_adjustments = None;
        }

        match &header.segmentation {
            Some(update) => self
                .segmentation
                .get_or_insert_with(Segmentation::default)
                .apply(update),
            None => self.segmentation = None,
        }

        match &header.filter_adjustments {
            Some(update) => {
                let adjustments = self
                    .filter_adjustments
                    .get_or_insert_with(FilterAdjustments::default);
                if let Some(update) = update {
                    adjustments.apply(update);
                }
            }
            None => self.filter_adjustments = None,
        }

        let mut frame_probs = self.probability_tables.clone();
        frame_probs.update(header);
        if header.refresh_entropy_probs {
            self.probability_tables = frame_probs.clone();
        }
        frame_probs
    }

    /// Fingerprint of the state, the `state_hash` of the tracking model
    pub fn hash(&self) -> u64 {
        let mut fp = Fingerprinter::new();
        fp.update_u64(self.width as u64).update_u64(self.height as u64);

        let mut tables = Vec::with_capacity(2048);
        self.probability_tables.write_canonical(&mut tables);
        fp.update(&tables);

        match &self.segmentation {
            Some(seg) => {
                fp.update(&[1, seg.absolute as u8]);
                fp.update(&seg.quantizer_adjustments.map(|v| v as u8));
                fp.update(&seg.filter_adjustments.map(|v| v as u8));
                fp.update_u64(seg.map.len() as u64).update(&seg.map);
            }
            None => {
                fp.update(&[0]);
            }
        }

        match &self.filter_adjustments {
            Some(adj) => {
                fp.update(&[1]);
                fp.update(&adj.ref_deltas.map(|v| v as u8));
                fp.update(&adj.mode_deltas.map(|v| v as u8));
            }
            None => {
                fp.update(&[0]);
            }
        }

        fp.finish()
    }
}

/// Session options that never enter the hashed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderOptions {
    /// Run the loop filter when the frame asks for it
    pub loop_filter: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { loop_filter: true }
    }
}

/// Result of decoding one frame
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub raster: RasterHandle,
    pub shown: bool,
    pub key_frame: bool,
    pub header: FrameHeader,
    pub continuation: Option<ContinuationHeader>,
    /// Slots read by inter or continuation macroblocks (last, golden, alternate)
    pub references_used: [bool; 3],
}

/// Fingerprint of a continuation header
pub fn continuation_fingerprint(header: &ContinuationHeader) -> u64 {
    let mut fp = Fingerprinter::new();
    fp.update(&[
        header.missing.last as u8,
        header.missing.golden as u8,
        header.missing.alternate as u8,
    ]);
    for block_type in header.token_probs.iter() {
        for band in block_type.iter() {
            for context in band.iter() {
                fp.update(context);
            }
        }
    }
    fp.finish()
}

/// A VP8 decoding session with a fixed display size
#[derive(Debug)]
pub struct Decoder {
    state: DecoderState,
    references: ReferenceSet,
    continuation_hash: u64,
    pool: RasterPool,
    options: DecoderOptions,
}

impl Decoder {
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_options(width, height, DecoderOptions::default())
    }

    pub fn with_options(width: u16, height: u16, options: DecoderOptions) -> Self {
        Decoder {
            state: DecoderState::new(width, height),
            references: ReferenceSet::default(),
            continuation_hash: 0,
            pool: RasterPool::new(width, height),
            options,
        }
    }

    pub fn width(&self) -> u16 {
        self.state.width
    }

    pub fn height(&self) -> u16 {
        self.state.height
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    pub fn continuation_hash(&self) -> u64 {
        self.continuation_hash
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Decode one coded frame
    ///
    /// On error the session is left exactly as it was before the call.
    pub fn decode(&mut self, data: &[u8]) -> Result<DecodedFrame> {
        let mut frame = Frame::parse(data)?;

        if let Some(dims) = frame.dimensions {
            if dims.width != self.state.width || dims.height != self.state.height {
                warn!(
                    frame_width = dims.width,
                    frame_height = dims.height,
                    width = self.state.width,
                    height = self.state.height,
                    "key frame changes the session size"
                );
                return Err(Error::unsupported(format!(
                    "frame is {}x{}, session is {}x{}",
                    dims.width, dims.height, self.state.width, self.state.height
                )));
            }
        }

        let mut state = self.state.clone();
        let frame_probs = state.apply_header(&frame.header);

        let mut output = self.pool.acquire();
        let report = frame.decode(
            &FrameInputs {
                probs: &frame_probs,
                segmentation: state.segmentation.as_ref(),
                filter_adjustments: state.filter_adjustments.as_ref(),
                references: &self.references,
                loop_filter: self.options.loop_filter,
            },
            output.make_mut(),
        )?;

        let map_updated = frame
            .header
            .segmentation
            .as_ref()
            .is_some_and(|update| update.update_map);
        if let (Some(seg), true) = (state.segmentation.as_mut(), map_updated) {
            seg.map = report.segment_ids;
        }

        self.state = state;
        let displaced = match &frame.header.kind {
            KindHeader::Key(_) => {
                let old = std::mem::take(&mut self.references);
                self.references.set_all(&output);
                self.continuation_hash = 0;
                [old.last, old.golden, old.alternate]
                    .into_iter()
                    .flatten()
                    .collect()
            }
            KindHeader::Inter(inter) => {
                if let Some(cont) = &frame.continuation {
                    self.continuation_hash = continuation_fingerprint(cont);
                }
                self.references.apply_inter_update(inter, &output)
            }
        };
        for handle in displaced {
            self.pool.recycle(handle);
        }

        debug!(
            key_frame = frame.is_key_frame(),
            shown = frame.show_frame,
            continuation = frame.continuation.is_some(),
            references_used = ?report.references_used,
            "decoded frame"
        );

        Ok(DecodedFrame {
            raster: output,
            shown: frame.show_frame,
            key_frame: frame.is_key_frame(),
            header: frame.header,
            continuation: frame.continuation,
            references_used: report.references_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vp8::header::{FilterDeltaUpdate, SegmentationUpdate};

    fn key_header() -> FrameHeader {
        FrameHeader {
            kind: KindHeader::Key(Default::default()),
            segmentation: None,
            simple_filter: false,
            loop_filter_level: 0,
            sharpness_level: 0,
            filter_adjustments: None,
            log2_partition_count: 0,
            quant_indices: Default::default(),
            refresh_entropy_probs: true,
            token_prob_updates: Vec::new(),
            prob_skip_false: None,
        }
    }

    #[test]
    fn test_key_frame_resets_state() {
        let mut state = DecoderState::new(16, 16);
        state.probability_tables.y_mode_probs = [1, 2, 3, 4];
        state.segmentation = Some(Segmentation {
            map: vec![3],
            ..Default::default()
        });
        state.apply_header(&key_header());
        assert_eq!(state, DecoderState::new(16, 16));
    }

    #[test]
    fn test_probabilities_kept_without_refresh() {
        let mut state = DecoderState::new(16, 16);
        let before = state.hash();
        let mut header = key_header();
        header.refresh_entropy_probs = false;
        header.token_prob_updates.push(crate::codec::vp8::header::TokenProbUpdate {
            block_type: 0,
            band: 1,
            context: 0,
            node: 0,
            prob: 7,
        });
        let frame_probs = state.apply_header(&header);
        assert_eq!(frame_probs.coeff_probs[0][1][0][0], 7);
        assert_ne!(state.probability_tables.coeff_probs[0][1][0][0], 7);
        assert_eq!(state.hash(), before);
    }

    #[test]
    fn test_segmentation_persists_until_disabled() {
        let mut state = DecoderState::new(16, 16);
        let mut header = key_header();
        header.segmentation = Some(SegmentationUpdate {
            update_map: false,
            feature_data: None,
            tree_probs: [None; 3],
        });
        header.filter_adjustments = Some(Some(FilterDeltaUpdate {
            ref_deltas: [Some(2), None, None, None],
            mode_deltas: [None; 4],
        }));
        state.apply_header(&header);
        assert!(state.segmentation.is_some());
        assert_eq!(state.filter_adjustments.map(|a| a.ref_deltas[0]), Some(2));

        let with_features = state.hash();
        header.segmentation = None;
        header.filter_adjustments = None;
        let mut inter = header.clone();
        inter.kind = KindHeader::Inter(Default::default());
        state.apply_header(&inter);
        assert!(state.segmentation.is_none());
        assert!(state.filter_adjustments.is_none());
        assert_ne!(state.hash(), with_features);
    }

    #[test]
    fn test_state_hash_depends_on_size() {
        assert_ne!(DecoderState::new(16, 16).hash(), DecoderState::new(32, 16).hash());
        assert_eq!(DecoderState::new(16, 16).hash(), DecoderState::new(16, 16).hash());
    }

    #[test]
    fn test_state_hash_covers_segment_map() {
        let with_map = |map: Vec<u8>| {
            let mut state = DecoderState::new(16, 16);
            state.segmentation = Some(Segmentation {
                map,
                ..Default::default()
            });
            state.hash()
        };
        assert_ne!(with_map(Vec::new()), with_map(vec![0]));
        assert_ne!(with_map(vec![0]), with_map(vec![0, 0]));
        assert_ne!(with_map(vec![1, 0]), with_map(vec![0, 1]));
        assert_eq!(with_map(vec![2, 3]), with_map(vec![2, 3]));
    }

    #[test]
    fn test_decode_rejects_garbage_without_side_effects() {
        let mut decoder = Decoder::new(16, 16);
        let before = decoder.state().hash();
        assert!(decoder.decode(&[0x00]).is_err());
        assert_eq!(decoder.state().hash(), before);
        assert!(decoder.references().last.is_none());
        assert_eq!(decoder.continuation_hash(), 0);
    }

    #[test]
    fn test_options_default() {
        assert!(DecoderOptions::default().loop_filter);
    }
}
