//! Decoder state tracking integration tests

mod common;

use common::*;
use vpx_trajectory::codec::vp8::ReferenceFrame;
use vpx_trajectory::tracking::{
    decoder_hash_of, frame_name, parse_frame_name, CheckKind, DecoderHash, SourceHash,
    TrackingPlayer, UpdateTracker,
};

#[test]
fn test_key_frame_transition() {
    let mut player = TrackingPlayer::new(32, 32);
    let tracked = player.decode(&key_frame(32, 32, DC_STEP)).unwrap();

    assert_eq!(tracked.source, SourceHash::key());
    assert_eq!(tracked.target.updates, UpdateTracker::key_frame());
    assert_eq!(tracked.target.continuation_hash, 0);
    assert_eq!(tracked.target.output_hash, tracked.frame.raster.fingerprint());

    let hash = player.decoder_hash();
    assert_eq!(hash.last_hash(), tracked.target.output_hash);
    assert_eq!(hash.golden_hash(), tracked.target.output_hash);
    assert_eq!(hash.alt_hash(), tracked.target.output_hash);
    assert_eq!(hash.state_hash(), tracked.target.state_hash);
    assert_eq!(hash, decoder_hash_of(player.decoder()));
}

#[test]
fn test_inter_frame_depends_on_every_slot() {
    let mut player = TrackingPlayer::new(16, 16);
    player.decode(&key_frame(16, 16, 0)).unwrap();
    let before = player.decoder_hash();

    let tracked = player.decode(&inter_frame(16, 16, DC_STEP)).unwrap();
    assert_eq!(tracked.source.check_kind(), CheckKind::Inter);
    assert_eq!(
        tracked.source,
        SourceHash::inter(
            before.state_hash(),
            before.last_hash(),
            before.golden_hash(),
            before.alt_hash()
        )
    );
    assert!(tracked.dependencies.need_state);
    assert!(tracked.dependencies.need_last);
    assert!(!tracked.dependencies.need_golden);

    let after = player.decoder_hash();
    assert_eq!(after.last_hash(), tracked.target.output_hash);
    assert_eq!(after.golden_hash(), before.golden_hash());
    assert!(tracked.target.updates.update_last);
}

#[test]
fn test_continuation_frame_transition() {
    let mut player = TrackingPlayer::new(16, 16);
    player.decode(&key_frame(16, 16, 0)).unwrap();
    let before = player.decoder_hash();
    assert_eq!(before.continuation_hash(), 0);

    let tracked = player
        .decode(&continuation_frame(16, 16, CONTINUATION_STEP))
        .unwrap();
    assert_eq!(
        tracked.source,
        SourceHash::continuation(before.state_hash(), 0)
    );
    assert!(tracked.dependencies.need_continuation);
    assert_ne!(player.decoder_hash().continuation_hash(), 0);
    assert_eq!(player.decoder_hash(), decoder_hash_of(player.decoder()));
}

#[test]
fn test_same_stream_same_hashes() {
    let stream = [
        key_frame(32, 16, 0),
        inter_frame(32, 16, DC_STEP),
        continuation_frame(32, 16, CONTINUATION_STEP),
        inter_frame(32, 16, 0),
    ];

    let mut a = TrackingPlayer::new(32, 16);
    let mut b = TrackingPlayer::new(32, 16);
    for chunk in &stream {
        let ta = a.decode(chunk).unwrap();
        let tb = b.decode(chunk).unwrap();
        assert_eq!(frame_name(&ta.source, &ta.target), frame_name(&tb.source, &tb.target));
    }
    assert_eq!(a.decoder_hash(), b.decoder_hash());
    assert_eq!(a.frames_decoded(), 4);
}

#[test]
fn test_frame_names_round_trip() {
    let mut player = TrackingPlayer::new(16, 16);
    for chunk in [key_frame(16, 16, 0), inter_frame(16, 16, DC_STEP)] {
        let tracked = player.decode(&chunk).unwrap();
        let name = frame_name(&tracked.source, &tracked.target);
        assert_eq!(parse_frame_name(&name).unwrap(), (tracked.source, tracked.target));
    }
}

#[test]
fn test_switching_between_streams() {
    // Two encodings share a key frame and diverge afterwards
    let key = key_frame(16, 16, 0);
    let dark = inter_frame(16, 16, 0);
    let bright = inter_frame(16, 16, DC_STEP);

    let mut reference = TrackingPlayer::new(16, 16);
    reference.decode(&key).unwrap();
    let dark_frame = reference.decode(&dark).unwrap();

    let mut other = TrackingPlayer::new(16, 16);
    other.decode(&key).unwrap();
    let bright_frame = other.decode(&bright).unwrap();

    // Both inter frames need the same state, so either can follow the key frame
    assert_eq!(dark_frame.source, bright_frame.source);

    let mut player = TrackingPlayer::new(16, 16);
    player.decode(&key).unwrap();
    assert!(player.decoder_hash().can_decode(&bright_frame.source));
    let switched = player.decode(&bright).unwrap();
    assert_eq!(switched.target, bright_frame.target);

    // Now the dark stream's next inter frame no longer applies
    let mut dark_next = TrackingPlayer::new(16, 16);
    dark_next.decode(&key).unwrap();
    dark_next.decode(&dark).unwrap();
    let next = dark_next.decode(&inter_frame(16, 16, 0)).unwrap();
    assert!(!player.decoder_hash().can_decode(&next.source));
}

#[test]
fn test_golden_copy_tracking() {
    let mut player = TrackingPlayer::new(16, 16);
    player.decode(&key_frame(16, 16, 0)).unwrap();

    let mut builder = vpx_trajectory::codec::vp8::FrameBuilder::inter_frame(16, 16)
        .fill(inter(ReferenceFrame::Last, DC_STEP));
    {
        let header = builder.inter_mut().unwrap();
        header.copy_buffer_to_alternate = Some(1);
    }
    let before: DecoderHash = player.decoder_hash();
    let tracked = player.decode(&builder.build().unwrap()).unwrap();
    assert!(tracked.target.updates.last_to_alternate);

    let after = player.decoder_hash();
    // The copy reads the last slot as it was before this frame
    assert_eq!(after.alt_hash(), before.last_hash());
    assert_eq!(after.last_hash(), tracked.target.output_hash);
}
