use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use trapmap::{Point, PointLocator, Segment, TrapMap};

/// Random non-crossing horizontal segments: distinct integer heights, distinct
/// integer x coordinates drawn from both sides of the origin.
fn horizontal_segments(n: usize, rng: &mut ChaCha8Rng) -> Vec<Segment> {
    let mut xs: Vec<f64> = (1..=n).flat_map(|i| [i as f64, -(i as f64)]).collect();
    let mut ys: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    xs.shuffle(rng);
    ys.shuffle(rng);
    (0..n)
        .map(|i| {
            Segment::new(
                Point::new(xs[2 * i], ys[i]),
                Point::new(xs[2 * i + 1], ys[i]),
            )
        })
        .collect()
}

pub fn build_trap_map(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for n in [100, 1_000, 10_000] {
        let segments = horizontal_segments(n, &mut rng);

        c.bench_with_input(
            BenchmarkId::new("Build trapezoidal map", n),
            &segments,
            |b, segments| b.iter(|| TrapMap::from_segments(segments.clone()).unwrap()),
        );
    }
}

pub fn locate_points(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for n in [100, 1_000, 10_000] {
        let segments = horizontal_segments(n, &mut rng);
        let trap_map = TrapMap::from_segments(segments).unwrap();

        let queries: Vec<[f64; 2]> = (0..42_000)
            .map(|_| {
                [
                    rng.gen_range(-(n as f64)..n as f64),
                    rng.gen_range(0.5..n as f64),
                ]
            })
            .collect();

        c.bench_with_input(
            BenchmarkId::new("Locate points", n),
            &queries,
            |b, queries| b.iter(|| trap_map.locate_many(queries)),
        );
        c.bench_with_input(
            BenchmarkId::new("Locate points in parallel", n),
            &queries,
            |b, queries| b.iter(|| trap_map.par_locate_many(queries)),
        );
    }
}

criterion_group!(benches, build_trap_map, locate_points);
criterion_main!(benches);
