//! Decode and index performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vpx_trajectory::codec::vp8::tables::{ChromaMode, LumaMode};
use vpx_trajectory::codec::vp8::{FrameBuilder, MacroblockRecipe, ReferenceFrame};
use vpx_trajectory::format::CatalogImporter;
use vpx_trajectory::tracking::TrackingPlayer;
use vpx_trajectory::Decoder;

/// Key frame with a varying DC per macroblock
fn create_key_frame(width: u16, height: u16) -> Vec<u8> {
    let mb_width = (width as usize + 15) / 16;
    let mb_height = (height as usize + 15) / 16;
    let mut builder = FrameBuilder::key_frame(width, height);
    for row in 0..mb_height {
        for col in 0..mb_width {
            builder = builder.set(
                col,
                row,
                MacroblockRecipe::Intra {
                    luma: LumaMode::Dc,
                    chroma: ChromaMode::Dc,
                    dc: ((col * 7 + row * 3) % 5) as i16 * 8 - 16,
                },
            );
        }
    }
    builder.header_mut().loop_filter_level = 20;
    builder.build().expect("key frame")
}

fn create_inter_frame(width: u16, height: u16, dc: i16) -> Vec<u8> {
    let mut builder = FrameBuilder::inter_frame(width, height).fill(MacroblockRecipe::Inter {
        reference: ReferenceFrame::Last,
        dc,
    });
    builder.header_mut().loop_filter_level = 20;
    builder.build().expect("inter frame")
}

/// Benchmark key frame decoding at various resolutions
fn bench_key_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("vp8_key_frame_decode");

    for (width, height) in [(176u16, 144u16), (640, 480), (1280, 720)] {
        let data = create_key_frame(width, height);
        group.throughput(Throughput::Elements((width as u64) * (height as u64)));
        group.bench_with_input(
            BenchmarkId::new("resolution", format!("{}x{}", width, height)),
            &data,
            |b, data| {
                let mut decoder = Decoder::new(width, height);
                b.iter(|| black_box(decoder.decode(black_box(data)).expect("decode")));
            },
        );
    }

    group.finish();
}

/// Benchmark inter frames, with and without state tracking
fn bench_inter_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("vp8_inter_frame_decode");
    let (width, height) = (640u16, 480u16);
    let key = create_key_frame(width, height);
    let inter = create_inter_frame(width, height, 0);
    group.throughput(Throughput::Elements((width as u64) * (height as u64)));

    group.bench_function("decoder", |b| {
        let mut decoder = Decoder::new(width, height);
        decoder.decode(&key).expect("key frame");
        b.iter(|| black_box(decoder.decode(black_box(&inter)).expect("decode")));
    });

    group.bench_function("tracking_player", |b| {
        let mut player = TrackingPlayer::new(width, height);
        player.decode(&key).expect("key frame");
        b.iter(|| black_box(player.decode(black_box(&inter)).expect("decode")));
    });

    group.finish();
}

/// Benchmark trajectory-switch queries on a catalog of diverging streams
fn bench_find_decodable(c: &mut Criterion) {
    let (width, height) = (64u16, 64u16);
    let key = create_key_frame(width, height);
    let mut importer = CatalogImporter::new(width, height);
    for stream in 0..32i16 {
        importer.import(&key).expect("key frame");
        for step in 0..8i16 {
            let frame = create_inter_frame(width, height, (stream * 8 + step) % 64 - 32);
            importer.import(&frame).expect("inter frame");
        }
    }
    let (index, _) = importer.into_parts();

    let mut player = TrackingPlayer::new(width, height);
    player.decode(&key).expect("key frame");
    let hash = player.decoder_hash();

    c.bench_function("frame_index_find_decodable", |b| {
        b.iter(|| black_box(index.find_decodable(black_box(&hash)).count()))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        bench_key_frame_decode,
        bench_inter_frame_decode,
        bench_find_decodable,
}

criterion_main!(benches);
