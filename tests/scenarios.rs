//! End-to-end scenarios straight from the worked examples: build an engine
//! through the public API and check the returned user ids, rather than
//! reaching into any internal module.
use rand::Rng;
use rkmips::prelude::*;

#[test]
fn exact_singleton() {
    // I = [(1,0),(0,1)], U = [(1,0)], q = (2,0), k = 1 -> [0].
    let items = [1.0f32, 0.0, 0.0, 1.0];
    let item_ids = [0u32, 1];
    let users = [1.0f32, 0.0];
    let user_ids = [0u32];
    let config = BuildConfig::new(1);
    let engine = build_engine(
        &items,
        &item_ids,
        2,
        &users,
        &user_ids,
        1,
        2,
        Variant::ExhaustiveScan,
        &config,
    )
    .unwrap();
    assert_eq!(engine.reverse_k_mips(&[2.0, 0.0], 1), vec![0]);
}

#[test]
fn rejected_by_bound() {
    let items = [1.0f32, 0.0, 0.0, 1.0];
    let item_ids = [0u32, 1];
    let users = [1.0f32, 0.0];
    let user_ids = [0u32];
    let config = BuildConfig::new(1);
    let engine = build_engine(
        &items,
        &item_ids,
        2,
        &users,
        &user_ids,
        1,
        2,
        Variant::ExhaustiveScan,
        &config,
    )
    .unwrap();
    assert!(engine.reverse_k_mips(&[0.5, 0.0], 1).is_empty());
}

#[test]
fn cone_tree_partition_acceptance() {
    // I = [(1,0),(0.9,0)], U = 10 unit vectors at 0,10,..,90 degrees, q=(1,0), k=1.
    // Every user's tau_1 equals cos(theta) via the near-parallel items, and
    // <q,u> = cos(theta) too, so the cone-tree must return every user.
    let items = [1.0f32, 0.0, 0.9, 0.0];
    let item_ids = [0u32, 1];
    let mut users = Vec::new();
    let mut user_ids = Vec::new();
    for i in 0..10 {
        let theta = (i as f32) * 10.0 * std::f32::consts::PI / 180.0;
        users.push(theta.cos());
        users.push(theta.sin());
        user_ids.push(i as u32);
    }
    let config = BuildConfig::new(1).b(0.5).leaf_size(2);
    let engine = build_engine(
        &items,
        &item_ids,
        2,
        &users,
        &user_ids,
        10,
        2,
        Variant::H2Cone,
        &config,
    )
    .unwrap();
    let mut result = engine.reverse_k_mips(&[1.0, 0.0], 1);
    result.sort();
    assert_eq!(result, (0..10).collect::<Vec<u32>>());
}

/// Normalizes every row to unit norm so the whole catalogue falls into a
/// single block regardless of `b` -- the only way to get a block past
/// [`rkmips::items::N_INDEX_THRESHOLD`] in a test fixture this small.
fn unit_norm_rows(mut data: Vec<f32>, n: usize, d: usize) -> Vec<f32> {
    for row in data.chunks_exact_mut(d) {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in row.iter_mut() {
            *x /= norm;
        }
    }
    data
}

#[test]
fn item_partitioner_builds_sub_index_above_threshold() {
    use rkmips::items::{ItemPartitioner, Transform, N_INDEX_THRESHOLD};

    let n = 1500usize;
    let d = 32usize;
    let mut rng = rkmips::rng::create_rng(7);
    let raw: Vec<f32> = (0..n * d).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let data = unit_norm_rows(raw, n, d);
    let ids: Vec<u32> = (0..n as u32).collect();

    let items = ItemPartitioner::build(&data, &ids, n, d, 0.5, Transform::H2, 64, 7).unwrap();
    assert!(n > N_INDEX_THRESHOLD);
    assert!(
        items.blocks.iter().any(|b| b.has_sub_index()),
        "a {}-item single-norm catalogue must push at least one block through the QALSH gate",
        n
    );
}

#[test]
fn approximate_lsh_recall_against_exhaustive_scan() {
    // Items share a norm so they land in one block past N_INDEX_THRESHOLD,
    // forcing H2Simpfer to verify through QALSH instead of a plain scan.
    let n = 1500usize;
    let m = 100usize;
    let d = 32usize;
    let k = 10usize;

    let mut rng = rkmips::rng::create_rng(41);
    let raw_items: Vec<f32> = (0..n * d).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let items = unit_norm_rows(raw_items, n, d);
    let item_ids: Vec<u32> = (0..n as u32).collect();
    let users: Vec<f32> = (0..m * d).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let user_ids: Vec<u32> = (0..m as u32).collect();

    let exact_config = BuildConfig::new(k).seed(41);
    let exact = build_engine(
        &items,
        &item_ids,
        n,
        &users,
        &user_ids,
        m,
        d,
        Variant::ExhaustiveScan,
        &exact_config,
    )
    .unwrap();

    let approx_config = BuildConfig::new(k).b(0.5).seed(41);
    let approx = build_engine(
        &items,
        &item_ids,
        n,
        &users,
        &user_ids,
        m,
        d,
        Variant::H2Simpfer,
        &approx_config,
    )
    .unwrap();

    let queries = 20;
    let mut good = 0;
    for qi in 0..queries {
        let query: Vec<f32> = (0..d)
            .map(|j| ((qi * d + j) as f32 * 0.017).sin())
            .collect();
        let truth = exact.reverse_k_mips(&query, k);
        let found = approx.reverse_k_mips(&query, k);
        if truth.is_empty() {
            good += 1;
            continue;
        }
        let found_set: std::collections::HashSet<_> = found.into_iter().collect();
        let hits = truth.iter().filter(|id| found_set.contains(id)).count();
        let recall = hits as f32 / truth.len() as f32;
        if recall >= 0.90 {
            good += 1;
        }
    }
    assert!(
        good as f32 / queries as f32 >= 0.90,
        "only {good}/{queries} queries met the recall band"
    );
}
