use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use rkmips::prelude::*;
use rkmips::rng::create_rng;

fn random_vectors(n: usize, d: usize, seed: u64) -> Vec<f32> {
    let mut rng = create_rng(seed);
    (0..n * d).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn bench_build(c: &mut Criterion) {
    let d = 64;
    let n = 5_000;
    let m = 1_000;
    let items = random_vectors(n, d, 1);
    let item_ids: Vec<u32> = (0..n as u32).collect();
    let users = random_vectors(m, d, 2);
    let user_ids: Vec<u32> = (0..m as u32).collect();
    let config = BuildConfig::new(10).b(0.5);

    c.bench_function("build_h2_simpfer", |b| {
        b.iter(|| {
            build_engine(
                black_box(&items),
                &item_ids,
                n,
                black_box(&users),
                &user_ids,
                m,
                d,
                Variant::H2Simpfer,
                &config,
            )
            .unwrap()
        })
    });
}

fn bench_query(c: &mut Criterion) {
    let d = 64;
    let n = 5_000;
    let m = 1_000;
    let items = random_vectors(n, d, 1);
    let item_ids: Vec<u32> = (0..n as u32).collect();
    let users = random_vectors(m, d, 2);
    let user_ids: Vec<u32> = (0..m as u32).collect();
    let config = BuildConfig::new(10).b(0.5);
    let engine = build_engine(
        &items, &item_ids, n, &users, &user_ids, m, d, Variant::H2Simpfer, &config,
    )
    .unwrap();
    let query = random_vectors(1, d, 3);

    c.bench_function("reverse_k_mips_h2_simpfer", |b| {
        b.iter(|| black_box(engine.reverse_k_mips(black_box(&query), 10)))
    });
}

criterion_group!(benches, bench_build, bench_query);
criterion_main!(benches);
