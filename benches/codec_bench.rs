//! Performance benchmarks for the card-pass byte codec.
//!
//! The scanner decodes one pass per card presentation, so these numbers are
//! mostly a regression guard for the hex round trip.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tapgate_core::codec::{block_to_text, bytes_to_hex, hex_to_bytes, text_to_block};

/// Benchmark encoding pass text into a padded block.
fn bench_text_to_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_to_block");
    group.throughput(Throughput::Elements(1));

    group.bench_function("short_pass", |b| {
        b.iter(|| black_box(text_to_block(black_box("abc")).unwrap()));
    });

    group.bench_function("full_block_pass", |b| {
        b.iter(|| black_box(text_to_block(black_box("0123456789abcdef")).unwrap()));
    });

    group.finish();
}

/// Benchmark the block -> hex -> block round trip.
fn bench_hex_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("hex_roundtrip");
    group.throughput(Throughput::Bytes(16));

    let block = text_to_block("DevKeyPass").unwrap();

    group.bench_function("encode", |b| {
        b.iter(|| black_box(bytes_to_hex(black_box(&block))));
    });

    let hex_text = bytes_to_hex(&block);
    group.bench_function("decode", |b| {
        b.iter(|| black_box(hex_to_bytes(black_box(&hex_text)).unwrap()));
    });

    group.bench_function("decode_odd_length", |b| {
        let truncated = &hex_text[..hex_text.len() - 1];
        b.iter(|| black_box(hex_to_bytes(black_box(truncated)).unwrap()));
    });

    group.finish();
}

/// Benchmark the full pass decode used on every card read.
fn bench_block_to_text(c: &mut Criterion) {
    let block = text_to_block("DevKeyPass").unwrap();

    c.bench_function("block_to_text", |b| {
        b.iter(|| black_box(block_to_text(black_box(&block)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_text_to_block,
    bench_hex_roundtrip,
    bench_block_to_text
);
criterion_main!(benches);
