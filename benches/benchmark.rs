// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains benchmarks for the `orp` crate.

extern crate criterion;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{rngs::StdRng, SeedableRng};

use orp::{
    ArrayServer, Bitonic, Bucket, CountAccessesServer, Element, MelbourneShuffle, Orp, Waksman,
};

const BLOCK_SIZE: usize = 100;
const SIZES_TO_BENCHMARK: [u32; 2] = [1 << 10, 1 << 14];
const BUCKET_CAPACITY: u32 = 256;
const MELBOURNE_P: u32 = 5;

fn prepared_server(n: u32) -> CountAccessesServer<BLOCK_SIZE> {
    let mut server = CountAccessesServer::new();
    server.create_array(0, n).unwrap();
    for key in 0..n {
        server.put(0, key, Element::new(key)).unwrap();
    }
    server.reset_io();
    server
}

fn run_permute<T: Orp>(n: u32, mut orp: T) -> u64 {
    let mut rng = StdRng::seed_from_u64(1);
    let mut server = prepared_server(n);
    orp.permute(&mut server, 0, &mut rng).unwrap();
    server.io_count()
}

/// Prints the I/O counts once per algorithm and size, as the regression
/// numbers tracked alongside the timings.
fn report_io_counts() {
    let mut rng = StdRng::seed_from_u64(0);
    for n in SIZES_TO_BENCHMARK {
        let io = run_permute(n, Bitonic::new(n, &mut rng).unwrap());
        println!("bitonic    n = {n}: {io} I/Os");
        let io = run_permute(n, Bucket::new(n, BUCKET_CAPACITY, &mut rng).unwrap());
        println!("bucket     n = {n}: {io} I/Os");
        let io = run_permute(n, MelbourneShuffle::new(n, MELBOURNE_P, MELBOURNE_P, &mut rng).unwrap());
        println!("melbourne  n = {n}: {io} I/Os");
        let io = run_permute(n, Waksman::new(n, &mut rng).unwrap());
        println!("waksman    n = {n}: {io} I/Os");
    }
}

fn benchmark_permute(c: &mut Criterion) {
    report_io_counts();

    let mut group = c.benchmark_group("permute");
    group.sample_size(10);

    for n in SIZES_TO_BENCHMARK {
        group.bench_with_input(BenchmarkId::new("bitonic", n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let mut rng = StdRng::seed_from_u64(0);
                    (prepared_server(n), Bitonic::new(n, &mut rng).unwrap(), rng)
                },
                |(mut server, mut orp, mut rng)| orp.permute(&mut server, 0, &mut rng).unwrap(),
                BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("bucket", n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let mut rng = StdRng::seed_from_u64(0);
                    (
                        prepared_server(n),
                        Bucket::new(n, BUCKET_CAPACITY, &mut rng).unwrap(),
                        rng,
                    )
                },
                |(mut server, mut orp, mut rng)| orp.permute(&mut server, 0, &mut rng).unwrap(),
                BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("melbourne", n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let mut rng = StdRng::seed_from_u64(0);
                    (
                        prepared_server(n),
                        MelbourneShuffle::new(n, MELBOURNE_P, MELBOURNE_P, &mut rng).unwrap(),
                        rng,
                    )
                },
                |(mut server, mut orp, mut rng)| orp.permute(&mut server, 0, &mut rng).unwrap(),
                BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("waksman", n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let mut rng = StdRng::seed_from_u64(0);
                    (prepared_server(n), Waksman::new(n, &mut rng).unwrap(), rng)
                },
                |(mut server, mut orp, mut rng)| orp.permute(&mut server, 0, &mut rng).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_permute);
criterion_main!(benches);
