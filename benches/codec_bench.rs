use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fragdex::codec::{decode_doc_ids, encode_doc_ids, CompressedIndex};
use fragdex::index::IndexBuilder;

fn make_ids(count: usize, gap: u64) -> Vec<u64> {
    (0..count as u64).map(|i| i * gap + (i % 3)).collect()
}

fn make_corpus(doc_count: usize) -> Vec<String> {
    (0..doc_count)
        .map(|i| format!("rust programming language doc {} topic {}", i, i % 17))
        .collect()
}

fn bench_doc_id_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("doc_id_codec");
    for &gap in &[3u64, 1_000, 1 << 20] {
        let ids = make_ids(10_000, gap);
        let encoded = encode_doc_ids(&ids).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", gap), &ids, |b, ids| {
            b.iter(|| black_box(encode_doc_ids(ids).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", gap), &encoded, |b, bytes| {
            b.iter(|| black_box(decode_doc_ids(bytes).unwrap()));
        });
    }
    group.finish();
}

fn bench_fragment_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_codec");
    for &count in &[1_000usize, 10_000] {
        let mut builder = IndexBuilder::new();
        for doc in make_corpus(count) {
            builder.add_document(&doc).unwrap();
        }
        let index = builder.into_index();
        let bytes = CompressedIndex::from_index(&index).unwrap().to_bytes();

        group.bench_with_input(BenchmarkId::new("to_bytes", count), &index, |b, index| {
            b.iter(|| black_box(CompressedIndex::from_index(index).unwrap().to_bytes()));
        });
        group.bench_with_input(BenchmarkId::new("decode_index", count), &bytes, |b, bytes| {
            b.iter(|| black_box(CompressedIndex::decode_index(bytes, "bench").unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_doc_id_codec, bench_fragment_codec);
criterion_main!(benches);
