//! Frame index integration tests
//!
//! Builds catalogs from synthesized streams and exercises lookups,
//! trajectory-switch queries, merging and persistence.

mod common;

use std::thread;

use common::*;
use vpx_trajectory::format::{CatalogImporter, FrameIndex, FrameInfo, SharedFrameIndex};
use vpx_trajectory::tracking::{CheckKind, DecoderHash, TrackingPlayer};
use vpx_trajectory::Error;

fn dark_stream() -> Vec<Vec<u8>> {
    vec![
        key_frame(16, 16, 0),
        inter_frame(16, 16, 0),
        inter_frame(16, 16, DC_STEP),
    ]
}

fn bright_stream() -> Vec<Vec<u8>> {
    vec![
        key_frame(16, 16, 0),
        inter_frame(16, 16, DC_STEP),
        continuation_frame(16, 16, CONTINUATION_STEP),
    ]
}

fn catalog(stream: &[Vec<u8>]) -> (FrameIndex, bytes::Bytes) {
    let mut importer = CatalogImporter::new(16, 16);
    importer.import_all(stream).unwrap();
    importer.into_parts()
}

#[test]
fn test_import_builds_consecutive_entries() {
    let stream = dark_stream();
    let (index, data) = catalog(&stream);

    assert_eq!(index.len(), 3);
    assert_eq!(index.next_frame_id(), 3);
    let total: usize = stream.iter().map(Vec::len).sum();
    assert_eq!(data.len(), total);

    let mut offset = 0u64;
    for (frame, chunk) in index.iter().zip(&stream) {
        assert_eq!(frame.offset, offset);
        assert_eq!(&frame.chunk(&data).unwrap()[..], &chunk[..]);
        offset += chunk.len() as u64;
    }
    assert!(index.find_by_id(0).unwrap().is_key_frame());
}

#[test]
fn test_output_hash_lookup() {
    let (index, _) = catalog(&dark_stream());
    // The key frame and the copying inter frame produce the same pixels
    let key_output = index.find_by_id(0).unwrap().output_hash();
    let same: Vec<u64> = index
        .find_by_output_hash(key_output)
        .map(|frame| frame.frame_id)
        .collect();
    assert_eq!(same, vec![0, 1]);
}

#[test]
fn test_find_decodable_after_key_frame() {
    let (mut index, _) = catalog(&dark_stream());
    let (bright, _) = catalog(&bright_stream());
    index.merge(&bright, 0).unwrap();

    let mut player = TrackingPlayer::new(16, 16);
    player.decode(&key_frame(16, 16, 0)).unwrap();
    let hash = player.decoder_hash();

    let candidates: Vec<&FrameInfo> = index.find_decodable(&hash).collect();
    // Inter frames first, then the continuation frame, then the key frame
    let kinds: Vec<CheckKind> = candidates.iter().map(|f| f.source.check_kind()).collect();
    assert_eq!(
        kinds,
        vec![CheckKind::Inter, CheckKind::Inter, CheckKind::Continuation, CheckKind::Key]
    );
    assert!(candidates.iter().all(|f| hash.can_decode(&f.source)));
    assert_eq!(index.first_decodable(&hash).unwrap().frame_id, candidates[0].frame_id);
}

#[test]
fn test_switch_and_follow_catalog() {
    let (mut index, mut data) = catalog(&dark_stream());
    let (bright, bright_data) = catalog(&bright_stream());
    let mapping = index.merge(&bright, data.len() as u64).unwrap();
    data = [&data[..], &bright_data[..]].concat().into();

    // The shared key frame and the identical bright inter frame are reused
    assert_eq!(mapping.get(&0), Some(&0));
    assert_eq!(mapping.get(&1), Some(&2));
    assert_eq!(mapping.get(&2), Some(&3));
    assert_eq!(index.len(), 4);

    // Follow the brightest path: key, bright inter, continuation
    let mut player = TrackingPlayer::new(16, 16);
    let key = index.find_by_id(0).unwrap().clone();
    player.decode(&key.chunk(&data).unwrap()).unwrap();

    let bright_id = mapping[&1];
    let next = index.find_by_id(bright_id).unwrap().clone();
    assert!(player.decoder_hash().can_decode(&next.source));
    let tracked = player.decode(&next.chunk(&data).unwrap()).unwrap();
    assert_eq!(tracked.target, next.target);

    let cont = index.first_decodable(&player.decoder_hash()).unwrap().clone();
    assert_eq!(cont.source.check_kind(), CheckKind::Continuation);
    assert_eq!(cont.frame_id, mapping[&2]);
    let tracked = player.decode(&cont.chunk(&data).unwrap()).unwrap();
    assert_eq!(tracked.target, cont.target);
}

#[test]
fn test_no_path_forward() {
    let (catalog, _) = catalog(&dark_stream());
    let mut index = FrameIndex::new();
    for frame in catalog.iter().filter(|frame| !frame.is_key_frame()) {
        index.insert(frame.clone()).unwrap();
    }
    assert_eq!(index.len(), 2);
    assert!(matches!(
        index.first_decodable(&DecoderHash::default()),
        Err(Error::NoDecodableFrame(_))
    ));
}

#[test]
fn test_duplicate_insert_rejected() {
    let (mut index, _) = catalog(&dark_stream());
    let mut copy = index.find_by_id(2).unwrap().clone();
    copy.frame_id = 10;
    assert!(matches!(index.insert(copy), Err(Error::DuplicateIdentity(_))));
    assert!(!index.has_frame_id(10));
}

#[test]
fn test_save_and_open() {
    let (index, _) = catalog(&bright_stream());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.jsonl");

    index.save(&path).unwrap();
    let loaded = FrameIndex::open(&path).unwrap();
    assert_eq!(loaded.len(), index.len());
    for frame in index.iter() {
        assert_eq!(loaded.find_by_id(frame.frame_id), Some(frame));
        assert!(loaded.has_identity(&frame.source, &frame.target));
    }
}

#[test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = FrameIndex::open(dir.path().join("absent.jsonl"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_shared_index_across_threads() {
    let (dark, _) = catalog(&dark_stream());
    let (bright, _) = catalog(&bright_stream());
    let shared = SharedFrameIndex::new(dark);

    let mut player = TrackingPlayer::new(16, 16);
    player.decode(&key_frame(16, 16, 0)).unwrap();
    let hash = player.decoder_hash();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || shared.find_decodable(&hash).len())
        })
        .collect();
    shared.merge(&bright, 0).unwrap();

    for reader in readers {
        let count = reader.join().unwrap();
        // Either before or after the merge, never in between
        assert!(count == 3 || count == 4, "{}", count);
    }
    assert_eq!(shared.find_decodable(&hash).len(), 4);
    assert_eq!(shared.len(), 4);
}
