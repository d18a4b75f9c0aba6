//! ItemPartitioner (C5): norm-sorted item blocks, each optionally backed by
//! a QALSH or SRP-LSH sub-index over a dimension-extended transform of its
//! members.
//!
//! Items are sorted once by descending norm; the partitioner then walks the
//! sorted list greedily, closing a block once the ratio to its first
//! (largest) member's norm drops below `b`, or the block reaches
//! [`BLOCK_MAX`] members. A block larger than [`N_INDEX_THRESHOLD`] gets a
//! sub-index (H2-ALSH -> QALSH, or SA-ALSH -> SRP-LSH); smaller blocks are
//! left for a plain linear scan at verification time.
use crate::error::{Error, Result};
use crate::math::{centroid, inner_product, l2_norm};
use crate::qalsh::{Qalsh, DEFAULT_C0};
use crate::rng::create_rng;
use crate::srp::Srp;

/// Blocks larger than this get an LSH sub-index; spec §3's `N_INDEX_THRESHOLD`.
pub const N_INDEX_THRESHOLD: usize = 1_000;
/// Hard cap on block size; spec §3's `BLOCK_MAX`.
pub const BLOCK_MAX: usize = 10_000;

/// Which transform/sub-index pairing a partitioner instance uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Homocentric-hyperspheres transform, verified via QALSH (NNS).
    H2,
    /// Shift-aware transform, verified via SRP-LSH (MCSS).
    Sa,
}

/// The sorted, immutable backing store items are referenced into by id.
pub struct ItemSet {
    pub d: usize,
    pub n: usize,
    /// Caller-supplied ids, reordered to match the sort-by-norm-descending
    /// position; `original_ids[i]` is the caller's id for sorted position `i`.
    pub original_ids: Vec<u32>,
    /// Descending.
    pub norms: Vec<f32>,
    /// Row-major, sorted order, length `n * d`.
    pub vectors: Vec<f32>,
}

impl ItemSet {
    pub fn vector(&self, local_id: usize) -> &[f32] {
        &self.vectors[local_id * self.d..(local_id + 1) * self.d]
    }

    pub fn norm(&self, local_id: usize) -> f32 {
        self.norms[local_id]
    }

    pub fn original_id(&self, local_id: usize) -> u32 {
        self.original_ids[local_id]
    }

    /// Sorts `data`/`original_ids` by descending norm with no further
    /// partitioning -- the bare arena the `ExhaustiveScan` variant needs,
    /// and the first step [`ItemPartitioner::build`] itself performs before
    /// carving out blocks.
    pub fn sorted_by_norm_desc(data: &[f32], original_ids: &[u32], n: usize, d: usize) -> ItemSet {
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

        ItemSet {
            d,
            n,
            original_ids: sorted_ids,
            norms: sorted_norms,
            vectors: sorted_vectors,
        }
    }
}

enum SubIndex {
    NoIndex,
    Qalsh(Qalsh),
    Srp(Srp),
}

/// Result of a sub-index candidate query: either a concrete candidate list
/// (ids local to the item set, i.e. already offset by the block's start) or
/// a request to fall back to a linear scan of the block's members.
pub enum Candidates {
    Ids(Vec<usize>),
    ScanAll,
}

pub struct ItemBlock {
    pub start: usize,
    pub len: usize,
    /// First (largest) member's norm -- the block's upper bound for L2/L3.
    pub max_norm: f32,
    /// Radius used by the transform: `M` for H2 blocks, `R_hat` for SA blocks.
    radius: f32,
    sub_index: SubIndex,
}

impl ItemBlock {
    pub fn members(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }

    pub fn has_sub_index(&self) -> bool {
        !matches!(self.sub_index, SubIndex::NoIndex)
    }

    /// Heap bytes held by this block's sub-index, if any.
    pub fn sub_index_memory_bytes(&self) -> usize {
        match &self.sub_index {
            SubIndex::NoIndex => 0,
            SubIndex::Qalsh(q) => q.memory_bytes(),
            SubIndex::Srp(s) => s.memory_bytes(),
        }
    }

    /// Retrieves verification candidates for `user_norm`/`query` against
    /// this block. `kip` is the current best inner product seen by the
    /// verification routine (only used to narrow QALSH's search range).
    /// Returned ids are local to the owning [`ItemSet`] (already offset by
    /// `self.start`).
    pub fn candidates(&self, user_norm: f32, query: &[f32], kip: f32, k: usize) -> Candidates {
        if user_norm <= 0.0 {
            return Candidates::ScanAll;
        }
        let lambda = self.radius / user_norm;
        match &self.sub_index {
            SubIndex::NoIndex => Candidates::ScanAll,
            SubIndex::Qalsh(q) => {
                let mut tq: Vec<f32> = query.iter().map(|x| x * lambda).collect();
                tq.push(0.0);
                let r_sqr = 2.0 * (self.radius * self.radius - lambda * kip);
                let r = if r_sqr > 0.0 { r_sqr.sqrt() } else { 0.0 };
                let ids = q
                    .knn_candidates(k, r, &tq)
                    .into_iter()
                    .map(|local| self.start + local as usize)
                    .collect();
                Candidates::Ids(ids)
            }
            SubIndex::Srp(s) => {
                let mut tq: Vec<f32> = query.iter().map(|x| x * lambda).collect();
                tq.push(0.0);
                let ids = s
                    .query(k, &tq)
                    .into_iter()
                    .map(|local| self.start + local as usize)
                    .collect();
                Candidates::Ids(ids)
            }
        }
    }
}

pub struct Items {
    pub set: ItemSet,
    pub blocks: Vec<ItemBlock>,
}

pub struct ItemPartitioner;

impl ItemPartitioner {
    /// Builds the partitioned, transformed item index.
    ///
    /// `data` is row-major, length `n * d`; `original_ids[i]` is the
    /// caller's id for `data[i]`. `b` is the block norm ratio (must lie in
    /// `(0, 1)`); `k_srp` is only consulted for [`Transform::Sa`] and must
    /// be a positive multiple of 64.
    pub fn build(
        data: &[f32],
        original_ids: &[u32],
        n: usize,
        d: usize,
        b: f32,
        transform: Transform,
        k_srp: usize,
        seed: u64,
    ) -> Result<Items> {
        if !(b > 0.0 && b < 1.0) {
            return Err(Error::Config(format!("b must be in (0, 1), got {}", b)));
        }
        if transform == Transform::Sa && (k_srp == 0 || k_srp % 64 != 0) {
            return Err(Error::Config(format!(
                "k_srp must be a positive multiple of 64, got {}",
                k_srp
            )));
        }
        let sorted = ItemSet::sorted_by_norm_desc(data, original_ids, n, d);
        let sorted_norms = sorted.norms;
        let sorted_ids = sorted.original_ids;
        let sorted_vectors = sorted.vectors;

        let mut rng = create_rng(seed);
        let mut blocks = Vec::new();
        let mut start = 0usize;
        let mut covered = 0usize;

        while start < n {
            let m = sorted_norms[start];
            let mut end = start + 1;
            while end < n && sorted_norms[end] >= b * m && (end - start) < BLOCK_MAX {
                end += 1;
            }
            let len = end - start;
            let block_vectors = &sorted_vectors[start * d..end * d];

            let (sub_index, radius) = if len > N_INDEX_THRESHOLD {
                match transform {
                    Transform::H2 => {
                        let mut ext = Vec::with_capacity(len * (d + 1));
                        for row in block_vectors.chunks_exact(d) {
                            ext.extend_from_slice(row);
                            let norm_sqr = inner_product(row, row);
                            let under = (m * m - norm_sqr).max(0.0);
                            ext.push(under.sqrt());
                        }
                        let q = Qalsh::build(&ext, len, d + 1, DEFAULT_C0, &mut rng);
                        (SubIndex::Qalsh(q), m)
                    }
                    Transform::Sa => {
                        let c = centroid(block_vectors, len, d);
                        let mut shifted_norms = Vec::with_capacity(len);
                        let mut shifted = Vec::with_capacity(len * d);
                        for row in block_vectors.chunks_exact(d) {
                            let s: Vec<f32> = row.iter().zip(&c).map(|(x, ci)| x - ci).collect();
                            shifted_norms.push(l2_norm(&s));
                            shifted.extend_from_slice(&s);
                        }
                        let r_hat = shifted_norms.iter().cloned().fold(0.0f32, f32::max);
                        let mut ext = Vec::with_capacity(len * (d + 1));
                        for (row, &rn) in shifted.chunks_exact(d).zip(&shifted_norms) {
                            ext.extend_from_slice(row);
                            let under = (r_hat * r_hat - rn * rn).max(0.0);
                            ext.push(under.sqrt());
                        }
                        let s = Srp::build(&ext, len, d + 1, k_srp, &mut rng);
                        (SubIndex::Srp(s), r_hat)
                    }
                }
            } else {
                (SubIndex::NoIndex, m)
            };

            blocks.push(ItemBlock {
                start,
                len,
                max_norm: m,
                radius,
                sub_index,
            });
            covered += len;
            start = end;
        }

        if covered != n {
            return Err(Error::Index(format!(
                "item block partitioning covered {} of {} items",
                covered, n
            )));
        }
        // Strictly decreasing in the common case; a `BLOCK_MAX`-forced split
        // across a run of equal-norm items repeats the same `max_norm`
        // across adjacent blocks, so only non-increasing is guaranteed.
        let mut prev_max = f32::INFINITY;
        for block in &blocks {
            if block.max_norm > prev_max {
                return Err(Error::Index(
                    "item blocks are not non-increasing in max norm".into(),
                ));
            }
            prev_max = block.max_norm;
        }

        log::debug!(
            "item partitioner: n={} blocks={} transform={:?}",
            n,
            blocks.len(),
            transform
        );

        Ok(Items {
            set: ItemSet {
                d,
                n,
                original_ids: sorted_ids,
                norms: sorted_norms,
                vectors: sorted_vectors,
            },
            blocks,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_blocks_cover_all_items_and_decrease() {
        let data = vec![
            5.0, 0.0, // norm 5
            0.0, 4.0, // norm 4
            0.1, 0.1, // tiny
        ];
        let ids = vec![10, 11, 12];
        let items = ItemPartitioner::build(&data, &ids, 3, 2, 0.5, Transform::H2, 64, 41).unwrap();
        let total: usize = items.blocks.iter().map(|b| b.len).sum();
        assert_eq!(total, 3);
        assert_eq!(items.set.original_ids.len(), 3);
        // sorted descending by norm
        assert!(items.set.norms.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_rejects_bad_b() {
        let data = vec![1.0, 0.0];
        let ids = vec![0];
        let err = ItemPartitioner::build(&data, &ids, 1, 2, 1.5, Transform::H2, 64, 41);
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_bad_k_srp_for_sa() {
        let data = vec![1.0, 0.0];
        let ids = vec![0];
        let err = ItemPartitioner::build(&data, &ids, 1, 2, 0.5, Transform::Sa, 63, 41);
        assert!(err.is_err());
    }
}
