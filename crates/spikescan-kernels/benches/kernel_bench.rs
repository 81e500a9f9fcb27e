use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spikescan_kernels::{
    fire_backward, fire_forward, leaky_backward, leaky_forward, FireParams, Float, Raster,
};

const STEPS: usize = 256;

fn build_problem(rows: usize) -> (Raster, Vec<Float>, Vec<Float>, Vec<Float>) {
    let mut rng = StdRng::seed_from_u64(4242);
    let input = Raster::from_vec(
        (0..rows * STEPS).map(|_| rng.gen_range(-0.5..1.5)).collect(),
        rows,
        STEPS,
    )
    .unwrap();
    let alphas = (0..rows).map(|_| rng.gen_range(0.5..1.0)).collect();
    let v_init = vec![0.0; rows];
    let act0 = vec![0.0; rows];
    (input, alphas, v_init, act0)
}

fn surrogate(v: Float, th: Float) -> Float {
    (-2.0 * (v - th).abs()).exp()
}

fn bench_leaky(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaky_scan");

    for &rows in &[64usize, 256, 1024] {
        group.throughput(Throughput::Elements((rows * STEPS) as u64));
        group.bench_with_input(BenchmarkId::new("forward", rows), &rows, |b, &rows| {
            let (input, alphas, v_init, _) = build_problem(rows);
            b.iter(|| leaky_forward(input.view(), &v_init, (&alphas).into()).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("backward", rows), &rows, |b, &rows| {
            let (input, alphas, v_init, _) = build_problem(rows);
            let trace = leaky_forward(input.view(), &v_init, (&alphas).into()).unwrap();
            b.iter_batched(
                || input.clone(),
                |upstream| {
                    leaky_backward(
                        upstream.view(),
                        trace.view(),
                        &v_init,
                        (&alphas).into(),
                        true,
                    )
                    .unwrap()
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_fire(c: &mut Criterion) {
    let mut group = c.benchmark_group("fire_scan");
    let params = FireParams::new(1.0).with_min_v_mem(-1.0);

    for &rows in &[64usize, 256, 1024] {
        group.throughput(Throughput::Elements((rows * STEPS) as u64));
        group.bench_with_input(BenchmarkId::new("forward", rows), &rows, |b, &rows| {
            let (input, alphas, v_init, act0) = build_problem(rows);
            b.iter(|| {
                fire_forward(
                    input.view(),
                    (&alphas).into(),
                    &v_init,
                    &act0,
                    None,
                    &params,
                )
                .unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("backward", rows), &rows, |b, &rows| {
            let (input, alphas, v_init, act0) = build_problem(rows);
            let out = fire_forward(
                input.view(),
                (&alphas).into(),
                &v_init,
                &act0,
                None,
                &params,
            )
            .unwrap();
            b.iter(|| {
                fire_backward(
                    &surrogate,
                    input.view(),
                    None,
                    out.v_mem.view(),
                    (&alphas).into(),
                    &v_init,
                    &act0,
                    None,
                    &params,
                    true,
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_leaky, bench_fire);
criterion_main!(benches);
