//! Benchmarks for index-free vs index-cached packing and row gathers.

use ams_compute::pack::{build_index, gather_rows, pack, pack_with_index, unpack_with_index};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn make_bench_data(n: usize, stride: usize) -> (Vec<bool>, Vec<f64>, Vec<f64>) {
    let predicate = (0..n).map(|i| i % stride == 0).collect();
    let density = (0..n).map(|i| 1.0 + (i as f64 * 0.37) % 5.0).collect();
    let energy = (0..n).map(|i| 10.0 + (i as f64 * 1.3) % 40.0).collect();
    (predicate, density, energy)
}

fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack");

    for n in [1_000, 64_000, 640_000] {
        let (pred, rho, e) = make_bench_data(n, 3);
        let mut d_rho = vec![0.0; n];
        let mut d_e = vec![0.0; n];
        let mut index = vec![0u32; n];

        group.bench_with_input(BenchmarkId::new("index_free", n), &n, |b, _| {
            b.iter(|| {
                let count = pack(
                    black_box(&pred),
                    &[black_box(&rho[..]), black_box(&e[..])],
                    &mut [&mut d_rho[..], &mut d_e[..]],
                    true,
                )
                .unwrap();
                black_box(count)
            })
        });

        group.bench_with_input(BenchmarkId::new("with_index", n), &n, |b, _| {
            b.iter(|| {
                let count = pack_with_index(
                    black_box(&pred),
                    &mut index,
                    &[black_box(&rho[..]), black_box(&e[..])],
                    &mut [&mut d_rho[..], &mut d_e[..]],
                    true,
                )
                .unwrap();
                black_box(count)
            })
        });

        let count = pack_with_index(&pred, &mut index, &[&rho[..]], &mut [&mut d_rho[..]], true).unwrap();
        let mut out = vec![0.0; n];
        group.bench_with_input(BenchmarkId::new("unpack_with_index", n), &n, |b, _| {
            b.iter(|| {
                unpack_with_index(black_box(&index), count, &[&d_rho[..]], &mut [&mut out[..]])
                    .unwrap();
                black_box(&out);
            })
        });
    }

    group.finish();
}

fn bench_gather_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("gather_rows");
    let width = 64;

    for elems in [1_000, 10_000] {
        let pred: Vec<bool> = (0..elems).map(|i| i % 2 == 0).collect();
        let index = build_index(&pred, true).unwrap();
        let sparse: Vec<f64> = (0..elems * width).map(|i| i as f64).collect();
        let mut dense = vec![0.0; index.len() * width];

        group.bench_with_input(BenchmarkId::new("half_active", elems), &elems, |b, _| {
            b.iter(|| {
                gather_rows(black_box(&index), width, black_box(&sparse), &mut dense).unwrap();
                black_box(&dense);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pack, bench_gather_rows);
criterion_main!(benches);
