//! UserIndex — linear blocking (C6), the Simpfer scheme.
//!
//! Users are sorted by descending norm, each gets a `lower_bounds[0..k_max]`
//! array seeded from an exact k-MIPS against the top-norm items (§4.7), and
//! consecutive users are grouped into fixed-size blocks whose
//! `block_lower_bounds` is the component-wise minimum over members --
//! letting the engine's L3 prune skip an entire block in one comparison.
use crate::error::Result;
use crate::items::ItemSet;
use crate::math::l2_norm;
use crate::pool::{build_thread_pool, DEFAULT_WORKERS};
use crate::users::{compute_lower_bounds, min_bounds};
use rayon::prelude::*;

pub struct UserSet {
    pub d: usize,
    pub n: usize,
    pub original_ids: Vec<u32>,
    pub norms: Vec<f32>,
    pub vectors: Vec<f32>,
    /// Row-major, `n * k_max`.
    pub lower_bounds: Vec<f32>,
    pub k_max: usize,
}

impl UserSet {
    pub fn vector(&self, local_id: usize) -> &[f32] {
        &self.vectors[local_id * self.d..(local_id + 1) * self.d]
    }

    pub fn lower_bounds(&self, local_id: usize) -> &[f32] {
        &self.lower_bounds[local_id * self.k_max..(local_id + 1) * self.k_max]
    }
}

pub struct UserBlock {
    pub start: usize,
    pub len: usize,
    pub block_lower_bounds: Vec<f32>,
}

impl UserBlock {
    pub fn max_norm(&self, set: &UserSet) -> f32 {
        // members are sorted descending, so the block's first member holds
        // the largest norm.
        set.norms[self.start]
    }
}

pub struct SimpferIndex {
    pub set: UserSet,
    pub blocks: Vec<UserBlock>,
}

impl SimpferIndex {
    /// Fixed block size `ceil(log2(m) * 20)`, clamped to `[1, m]`; spec §4.7.
    pub fn block_size(m: usize) -> usize {
        if m == 0 {
            return 0;
        }
        let raw = ((m as f32).log2() * 20.0).ceil();
        (raw.max(1.0) as usize).min(m)
    }

    pub fn build(
        data: &[f32],
        original_ids: &[u32],
        n: usize,
        d: usize,
        k_max: usize,
        items: &ItemSet,
    ) -> Result<SimpferIndex> {
        assert_eq!(data.len(), n * d);
        assert_eq!(original_ids.len(), n);

        let norms: Vec<f32> = (0..n).map(|i| l2_norm(&data[i * d..(i + 1) * d])).collect();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| norms[b].partial_cmp(&norms[a]).unwrap());

        let sorted_norms: Vec<f32> = order.iter().map(|&i| norms[i]).collect();
        let sorted_ids: Vec<u32> = order.iter().map(|&i| original_ids[i]).collect();
        let mut sorted_vectors = Vec::with_capacity(n * d);
        for &i in &order {
            sorted_vectors.extend_from_slice(&data[i * d..(i + 1) * d]);
        }

        let pool = build_thread_pool(DEFAULT_WORKERS);
        let lower_bounds: Vec<Vec<f32>> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| {
                    compute_lower_bounds(
                        &sorted_vectors[i * d..(i + 1) * d],
                        sorted_norms[i],
                        &items.norms,
                        &items.vectors,
                        items.d,
                        k_max,
                    )
                })
                .collect()
        });
        let flat_lower_bounds: Vec<f32> = lower_bounds.iter().flatten().copied().collect();

        let block_size = Self::block_size(n);
        let mut blocks = Vec::new();
        let mut start = 0usize;
        while start < n {
            let end = (start + block_size).min(n);
            let member_bounds: Vec<&[f32]> = (start..end).map(|i| lower_bounds[i].as_slice()).collect();
            let block_lower_bounds = min_bounds(member_bounds, k_max);
            blocks.push(UserBlock {
                start,
                len: end - start,
                block_lower_bounds,
            });
            start = end;
        }

        log::debug!(
            "simpfer build: m={} block_size={} blocks={}",
            n,
            block_size,
            blocks.len()
        );

        Ok(SimpferIndex {
            set: UserSet {
                d,
                n,
                original_ids: sorted_ids,
                norms: sorted_norms,
                vectors: sorted_vectors,
                lower_bounds: flat_lower_bounds,
                k_max,
            },
            blocks,
        })
    }
}
