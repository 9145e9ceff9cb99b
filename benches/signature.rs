/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Benchmarks word segmentation, shingling, and signature computation on
//! synthetic HTML pages.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use warc_cluster::shingle::{SignatureBuilder, Words};

fn page(rng: &mut SmallRng, words: usize) -> Vec<u8> {
    let mut page = b"<html><head><title>bench</title><script>var x = 1 < 2;</script></head><body>"
        .to_vec();
    for i in 0..words {
        if i % 50 == 0 {
            page.extend_from_slice(b"<p class=\"text\">");
        }
        let len = rng.random_range(2..10);
        page.extend((0..len).map(|_| rng.random_range(b'a'..=b'z')));
        page.push(b' ');
    }
    page.extend_from_slice(b"</body></html>");
    page
}

fn bench_words(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(0);
    let page = page(&mut rng, 10_000);
    let mut group = c.benchmark_group("words");
    group.throughput(Throughput::Bytes(page.len() as u64));
    group.bench_function("words_10000", |b| {
        b.iter(|| Words::new(black_box(&page)).count())
    });
    group.finish();
}

fn bench_signature(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(0);
    let page = page(&mut rng, 2_000);
    let mut group = c.benchmark_group("signature");
    group.throughput(Throughput::Bytes(page.len() as u64));
    for width in [20, 64, 128] {
        let builder = SignatureBuilder::new(width, 25);
        group.bench_function(format!("signature_{}", width), |b| {
            b.iter(|| builder.signature(black_box(&page)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_words, bench_signature);
criterion_main!(benches);
