//! Benchmarks for index encoding, decoding and set algebra.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sidx::{BuildOptions, Encoding, Index};

const ENCODINGS: [(&str, Encoding); 3] = [
    ("plain", Encoding::Plain),
    ("for", Encoding::FrameOfReference),
    ("huffman", Encoding::HuffmanDelta),
];

fn sample_ids(num_ids: u32, stride: u32) -> Vec<u32> {
    (0..num_ids).map(|i| i * stride + (i % stride)).collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for num_ids in [1000u32, 100_000] {
        let ids = sample_ids(num_ids, 13);
        group.throughput(Throughput::Elements(num_ids as u64));
        for (name, encoding) in ENCODINGS {
            let options = BuildOptions::new().with_encoding(encoding);
            group.bench_with_input(BenchmarkId::new(name, num_ids), &ids, |bench, ids| {
                bench.iter(|| Index::build(black_box(ids.clone()), &options).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for num_ids in [1000u32, 100_000] {
        let ids = sample_ids(num_ids, 13);
        group.throughput(Throughput::Elements(num_ids as u64));
        for (name, encoding) in ENCODINGS {
            let index = Index::build(ids.clone(), &BuildOptions::new().with_encoding(encoding))
                .unwrap();
            group.bench_with_input(BenchmarkId::new(name, num_ids), &index, |bench, index| {
                bench.iter(|| index.iter().map(|id| id.unwrap() as u64).sum::<u64>())
            });
        }
    }

    group.finish();
}

fn bench_random_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_access");

    let num_ids = 100_000u32;
    let ids = sample_ids(num_ids, 13);
    let positions: Vec<usize> = (0..1000).map(|i| (i * 7919) % num_ids as usize).collect();
    group.throughput(Throughput::Elements(positions.len() as u64));

    for (name, encoding) in ENCODINGS {
        let index =
            Index::build(ids.clone(), &BuildOptions::new().with_encoding(encoding)).unwrap();
        group.bench_function(name, |bench| {
            bench.iter(|| {
                positions
                    .iter()
                    .map(|&pos| index.at(black_box(pos)).unwrap() as u64)
                    .sum::<u64>()
            })
        });
    }

    group.finish();
}

fn bench_set_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_algebra");

    let a_ids = sample_ids(50_000, 6);
    let b_ids = sample_ids(50_000, 10);
    group.throughput(Throughput::Elements((a_ids.len() + b_ids.len()) as u64));

    for (name, encoding) in ENCODINGS {
        let options = BuildOptions::new().with_encoding(encoding);
        let a = Index::build(a_ids.clone(), &options).unwrap();
        let b = Index::build(b_ids.clone(), &options).unwrap();
        group.bench_function(BenchmarkId::new("union", name), |bench| {
            bench.iter(|| black_box(&a).union(black_box(&b)).unwrap())
        });
        group.bench_function(BenchmarkId::new("intersect", name), |bench| {
            bench.iter(|| black_box(&a).intersect(black_box(&b)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_iterate,
    bench_random_access,
    bench_set_algebra
);
criterion_main!(benches);
