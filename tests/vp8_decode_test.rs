//! VP8 decoder integration tests
//!
//! Decodes synthesized streams and checks pixels, reference slots and the
//! session rules for size changes and missing references.

mod common;

use common::*;
use vpx_trajectory::codec::vp8::{FrameBuilder, MissingTracker, ReferenceFrame};
use vpx_trajectory::{Decoder, DecoderOptions, Error};

#[test]
fn test_key_frame_flat_grey() {
    let mut decoder = Decoder::new(32, 32);
    let frame = decoder.decode(&key_frame(32, 32, 0)).unwrap();
    assert!(frame.key_frame);
    assert!(frame.shown);
    assert_flat_luma(&frame.raster, 128);
    assert_eq!(frame.raster.u.at(0, 0), 128);
    assert_eq!(frame.raster.v.at(15, 15), 128);
}

#[test]
fn test_key_frame_dc_prediction_chain() {
    let mut decoder = Decoder::new(32, 32);
    let frame = decoder.decode(&key_frame(32, 32, DC_STEP)).unwrap();
    let raster = &frame.raster;

    // No neighbours: 128, then each macroblock predicts from what came before
    assert_macroblock_luma(raster, 0, 0, 128 + STEP);
    assert_macroblock_luma(raster, 1, 0, 128 + 2 * STEP);
    assert_macroblock_luma(raster, 0, 1, 128 + 2 * STEP);
    assert_macroblock_luma(raster, 1, 1, 128 + 3 * STEP);
}

#[test]
fn test_key_frame_fills_all_slots() {
    let mut decoder = Decoder::new(16, 16);
    let frame = decoder.decode(&key_frame(16, 16, DC_STEP)).unwrap();
    let references = decoder.references();
    for reference in ReferenceFrame::ALL {
        let slot = references.get(reference).unwrap();
        assert!(slot.ptr_eq(&frame.raster), "{:?}", reference);
    }
    assert_eq!(decoder.continuation_hash(), 0);
}

#[test]
fn test_inter_frame_adds_residual() {
    let mut decoder = Decoder::new(32, 32);
    decoder.decode(&key_frame(32, 32, 0)).unwrap();

    let copy = decoder.decode(&inter_frame(32, 32, 0)).unwrap();
    assert!(!copy.key_frame);
    assert_eq!(copy.references_used, [true, false, false]);
    assert_flat_luma(&copy.raster, 128);

    let brighter = decoder.decode(&inter_frame(32, 32, DC_STEP)).unwrap();
    assert_flat_luma(&brighter.raster, 128 + STEP);
    assert!(decoder.references().last.as_ref().unwrap().ptr_eq(&brighter.raster));
    // Golden and alternate still hold the key frame
    assert_macroblock_luma(decoder.references().golden.as_ref().unwrap(), 0, 0, 128);
}

#[test]
fn test_golden_and_alternate_updates() {
    let mut decoder = Decoder::new(16, 16);
    decoder.decode(&key_frame(16, 16, DC_STEP)).unwrap();

    // Refresh golden only
    let mut builder = FrameBuilder::inter_frame(16, 16).fill(inter(ReferenceFrame::Last, DC_STEP));
    {
        let header = builder.inter_mut().unwrap();
        header.refresh_last = false;
        header.refresh_golden = true;
        header.copy_buffer_to_golden = None;
    }
    let golden = decoder.decode(&builder.build().unwrap()).unwrap();
    assert_macroblock_luma(&golden.raster, 0, 0, 128 + 2 * STEP);
    let references = decoder.references();
    assert!(references.golden.as_ref().unwrap().ptr_eq(&golden.raster));
    assert_macroblock_luma(references.last.as_ref().unwrap(), 0, 0, 128 + STEP);
    assert_macroblock_luma(references.alternate.as_ref().unwrap(), 0, 0, 128 + STEP);

    // Predict from golden, copy golden to alternate before refreshing last
    let mut builder = FrameBuilder::inter_frame(16, 16).fill(inter(ReferenceFrame::Golden, 0));
    builder.inter_mut().unwrap().copy_buffer_to_alternate = Some(2);
    let copied = decoder.decode(&builder.build().unwrap()).unwrap();
    assert_eq!(copied.references_used, [false, true, false]);
    assert_macroblock_luma(&copied.raster, 0, 0, 128 + 2 * STEP);

    let references = decoder.references();
    assert!(references.alternate.as_ref().unwrap().ptr_eq(&golden.raster));
    assert!(references.last.as_ref().unwrap().ptr_eq(&copied.raster));
}

#[test]
fn test_continuation_frame() {
    let mut decoder = Decoder::new(32, 16);
    decoder.decode(&key_frame(32, 16, 0)).unwrap();

    let frame = decoder
        .decode(&continuation_frame(32, 16, CONTINUATION_STEP))
        .unwrap();
    assert!(frame.continuation.is_some());
    assert_flat_luma(&frame.raster, 128 + STEP);
    assert_ne!(decoder.continuation_hash(), 0);

    // Another key frame clears the continuation state
    decoder.decode(&key_frame(32, 16, 0)).unwrap();
    assert_eq!(decoder.continuation_hash(), 0);
}

#[test]
fn test_continuation_on_missing_slot_is_logic_error() {
    let mut decoder = Decoder::new(16, 16);
    decoder.decode(&key_frame(16, 16, 0)).unwrap();
    let state_before = decoder.state().hash();

    let mut header = continuation_header();
    header.missing = MissingTracker {
        last: true,
        ..Default::default()
    };
    let data = FrameBuilder::inter_frame(16, 16)
        .continuation(header)
        .fill(continuation(ReferenceFrame::Last, 0))
        .build()
        .unwrap();

    assert!(matches!(decoder.decode(&data), Err(Error::LogicError(_))));
    assert_eq!(decoder.state().hash(), state_before);
}

#[test]
fn test_inter_frame_without_references_is_logic_error() {
    let mut decoder = Decoder::new(16, 16);
    let result = decoder.decode(&inter_frame(16, 16, 0));
    assert!(matches!(result, Err(Error::LogicError(_))));
    assert!(decoder.references().last.is_none());
}

#[test]
fn test_size_change_is_unsupported() {
    let mut decoder = Decoder::new(16, 16);
    decoder.decode(&key_frame(16, 16, 0)).unwrap();
    let result = decoder.decode(&key_frame(32, 16, 0));
    assert!(matches!(result, Err(Error::UnsupportedConfiguration(_))));
    assert_eq!(decoder.width(), 16);
}

#[test]
fn test_token_partitions_do_not_change_output() {
    let build = |log2_partitions: u8| {
        let mut builder = FrameBuilder::key_frame(64, 64);
        for row in 0..4 {
            for col in 0..4 {
                builder = builder.set(col, row, intra(((col + row) % 3) as i16 * DC_STEP));
            }
        }
        builder.header_mut().log2_partition_count = log2_partitions;
        builder.build().unwrap()
    };

    let mut single = Decoder::new(64, 64);
    let mut split = Decoder::new(64, 64);
    let a = single.decode(&build(0)).unwrap();
    let b = split.decode(&build(2)).unwrap();
    assert_eq!(a.raster.fingerprint(), b.raster.fingerprint());
    assert_eq!(a.header.partition_count(), 1);
    assert_eq!(b.header.partition_count(), 4);
}

#[test]
fn test_loop_filter_option() {
    let build = || {
        let mut builder = FrameBuilder::key_frame(32, 16).set(1, 0, intra(DC_STEP));
        builder.header_mut().loop_filter_level = 63;
        builder.build().unwrap()
    };

    let mut unfiltered = Decoder::with_options(32, 16, DecoderOptions { loop_filter: false });
    let frame = unfiltered.decode(&build()).unwrap();
    assert_eq!(frame.raster.y.at(15, 0), 128);
    assert_eq!(frame.raster.y.at(16, 0), 128 + STEP);

    let mut filtered = Decoder::new(32, 16);
    let frame = filtered.decode(&build()).unwrap();
    assert!(frame.raster.y.at(15, 0) > 128);
    assert!(frame.raster.y.at(16, 0) < 128 + STEP);

    // The option is not part of the decoder state
    assert_eq!(unfiltered.state().hash(), filtered.state().hash());
}

#[test]
fn test_hidden_frame() {
    let mut decoder = Decoder::new(16, 16);
    decoder.decode(&key_frame(16, 16, 0)).unwrap();
    let data = FrameBuilder::inter_frame(16, 16)
        .shown(false)
        .build()
        .unwrap();
    let frame = decoder.decode(&data).unwrap();
    assert!(!frame.shown);
}

#[test]
fn test_to_i420_crops_to_display_size() {
    let mut decoder = Decoder::new(20, 10);
    let frame = decoder.decode(&key_frame(20, 10, 0)).unwrap();
    let i420 = frame.raster.to_i420();
    assert_eq!(i420.len(), 20 * 10 + 2 * (10 * 5));
    assert!(i420.iter().all(|&p| p == 128));
}
