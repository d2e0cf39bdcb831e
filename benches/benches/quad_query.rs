// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::Rect;
use loam_quad::SpatialIndex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn gen_boxes(n: usize, seed: u64) -> Vec<(u32, Rect)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let x = rng.random_range(-170.0..170.0);
        let y = rng.random_range(-80.0..80.0);
        let w = rng.random_range(0.0..0.05);
        let h = rng.random_range(0.0..0.05);
        #[allow(clippy::cast_possible_truncation, reason = "bench ids fit in u32")]
        out.push((i as u32, Rect::new(x, y, x + w, y + h)));
    }
    out
}

fn build_index(boxes: &[(u32, Rect)]) -> SpatialIndex<u32> {
    let mut idx = SpatialIndex::new();
    for (id, bbox) in boxes {
        idx.add(*id, *bbox);
    }
    idx
}

fn bench_insert(c: &mut Criterion) {
    let boxes = gen_boxes(10_000, 7);
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(boxes.len() as u64));
    group.bench_function("quad_10k", |b| {
        b.iter_batched(
            || boxes.clone(),
            |boxes| black_box(build_index(&boxes)),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let boxes = gen_boxes(10_000, 7);
    let idx = build_index(&boxes);
    let views = gen_boxes(64, 11)
        .into_iter()
        .map(|(_, r)| Rect::new(r.x0, r.y0, r.x0 + 2.0, r.y0 + 2.0))
        .collect::<Vec<_>>();

    let mut group = c.benchmark_group("query");
    group.throughput(Throughput::Elements(views.len() as u64));
    group.bench_function("quad_viewports", |b| {
        b.iter(|| {
            let mut count = 0_usize;
            for view in &views {
                idx.query(*view, |_| count += 1);
            }
            black_box(count)
        });
    });
    group.bench_function("linear_scan_viewports", |b| {
        b.iter(|| {
            let mut count = 0_usize;
            for view in &views {
                for (_, bbox) in &boxes {
                    if bbox.x0 < view.x1
                        && view.x0 < bbox.x1
                        && bbox.y0 < view.y1
                        && view.y0 < bbox.y1
                    {
                        count += 1;
                    }
                }
            }
            black_box(count)
        });
    });
    group.finish();
}

fn bench_region_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("region");
    group.bench_function("needed_then_merge", |b| {
        b.iter_batched(
            SpatialIndex::<u32>::new,
            |mut idx| {
                for i in 0..16 {
                    let x = f64::from(i) * 0.7;
                    let view = Rect::new(x, 0.0, x + 0.5, 0.5);
                    for piece in idx.rects_needed_to_cover(view) {
                        idx.merge_fetched_region(piece, true);
                    }
                }
                black_box(idx)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_query, bench_region_tracking);
criterion_main!(benches);
