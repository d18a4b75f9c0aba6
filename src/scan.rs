//! Exhaustive baseline (C8): exact per-user `tau_k(u)` for every `k` in
//! `[1, k_max]`, computed in parallel across users. Used both as the
//! ground-truth generator and as the `ExhaustiveScan` engine variant.
use crate::error::Result;
use crate::items::ItemSet;
use crate::math::{inner_product, l2_norm};
use crate::pool::{build_thread_pool, DEFAULT_WORKERS};
use crate::topk::MaxKArray;
use rayon::prelude::*;

pub struct ScanIndex {
    pub d: usize,
    pub n: usize,
    pub original_ids: Vec<u32>,
    pub norms: Vec<f32>,
    pub vectors: Vec<f32>,
    /// Row-major exact `tau_k(u)` for `k in 1..=k_max`, `n * k_max` entries.
    pub k_bounds: Vec<f32>,
    pub k_max: usize,
}

impl ScanIndex {
    pub fn vector(&self, local_id: usize) -> &[f32] {
        &self.vectors[local_id * self.d..(local_id + 1) * self.d]
    }

    pub fn k_bounds(&self, local_id: usize) -> &[f32] {
        &self.k_bounds[local_id * self.k_max..(local_id + 1) * self.k_max]
    }

    /// Builds the exact `tau_k(u)` table for every user against the full
    /// (norm-sorted) item set. Each user's inner loop early-exits once
    /// `user_norm * item_norm[j] < tau` (running k-th best), same shape as
    /// the lower-bound seeding in §4.7 but unrestricted in item count and
    /// therefore exact rather than an under-approximation.
    pub fn build(data: &[f32], original_ids: &[u32], n: usize, d: usize, k_max: usize, items: &ItemSet) -> Result<ScanIndex> {
        assert_eq!(data.len(), n * d);
        assert_eq!(original_ids.len(), n);

        let norms: Vec<f32> = (0..n).map(|i| l2_norm(&data[i * d..(i + 1) * d])).collect();

        let pool = build_thread_pool(DEFAULT_WORKERS);
        let k_bounds_rows: Vec<Vec<f32>> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| {
                    let user_vec = &data[i * d..(i + 1) * d];
                    let user_norm = norms[i];
                    let mut arr = MaxKArray::new(k_max);
                    for (j, &norm_j) in items.norms.iter().enumerate() {
                        if arr.len() >= k_max && user_norm * norm_j <= arr.min_key() {
                            break;
                        }
                        let ip = inner_product(user_vec, items.vector(j));
                        arr.insert(ip);
                    }
                    let mut row = vec![f32::NEG_INFINITY; k_max];
                    for k in 0..arr.len() {
                        row[k] = arr.ith_key(k);
                    }
                    row
                })
                .collect()
        });
        let k_bounds: Vec<f32> = k_bounds_rows.into_iter().flatten().collect();

        log::debug!("scan build: m={} n={} k_max={}", n, items.n, k_max);

        Ok(ScanIndex {
            d,
            n,
            original_ids: original_ids.to_vec(),
            norms,
            vectors: data.to_vec(),
            k_bounds,
            k_max,
        })
    }

    /// Answers a reverse-k-MIPS query by comparing `<q, u>` against the
    /// stored exact `tau_k(u)` for every user.
    pub fn reverse_k_mips(&self, query: &[f32], k: usize) -> Vec<u32> {
        let mut result = Vec::new();
        for i in 0..self.n {
            let ip = inner_product(query, self.vector(i));
            if ip >= self.k_bounds(i)[k - 1] {
                result.push(self.original_ids[i]);
            }
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::items::{ItemPartitioner, Transform};

    #[test]
    fn test_scan_matches_worked_example_exact_singleton() {
        // spec §8 scenario 1: I = [(1,0),(0,1)], U = [(1,0)], q = (2,0), k = 1.
        let item_data = vec![1.0f32, 0.0, 0.0, 1.0];
        let item_ids = vec![0u32, 1];
        let items = ItemPartitioner::build(&item_data, &item_ids, 2, 2, 0.5, Transform::H2, 64, 41)
            .unwrap()
            .set;

        let user_data = vec![1.0f32, 0.0];
        let user_ids = vec![0u32];
        let scan = ScanIndex::build(&user_data, &user_ids, 1, 2, 1, &items).unwrap();

        let result = scan.reverse_k_mips(&[2.0, 0.0], 1);
        assert_eq!(result, vec![0]);
    }

    #[test]
    fn test_scan_rejected_by_bound() {
        // spec §8 scenario 2.
        let item_data = vec![1.0f32, 0.0, 0.0, 1.0];
        let item_ids = vec![0u32, 1];
        let items = ItemPartitioner::build(&item_data, &item_ids, 2, 2, 0.5, Transform::H2, 64, 41)
            .unwrap()
            .set;

        let user_data = vec![1.0f32, 0.0];
        let user_ids = vec![0u32];
        let scan = ScanIndex::build(&user_data, &user_ids, 1, 2, 1, &items).unwrap();

        let result = scan.reverse_k_mips(&[0.5, 0.0], 1);
        assert!(result.is_empty());
    }
}
