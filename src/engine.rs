//! ReverseKMipsEngine (C9): orchestrates the full query -- selects the
//! user-index variant, applies the four pruning lemmas (§4.1) coarsest
//! layer first, and dispatches surviving candidates to the verification
//! routine (§4.11) backed by an item-block sub-index.
//!
//! Per the design notes, the two user-index variants (linear blocks vs
//! cone-tree) are kept as concrete engine shapes sharing only
//! [`crate::topk`], [`crate::math`], and the item-block pipeline -- not
//! over-abstracted behind a common trait.
use crate::error::{Error, Result};
use crate::items::{Candidates, ItemPartitioner, ItemSet, Items, Transform};
use crate::math::{inner_product, l2_norm};
use crate::metrics::Counters;
use crate::scan::ScanIndex;
use crate::topk::MaxKArray;
use crate::users::cone::ConeTree;
use crate::users::simpfer::SimpferIndex;
use std::time::Instant;

/// Which engine configuration to build; spec §6's `variant` parameter.
///
/// `H2Linear` and `H2Simpfer` name the same configuration -- H2-ALSH item
/// blocks over a Simpfer (linear) user index -- carried as two spellings
/// because the source this spec was distilled from wired the identical
/// pairing under both names in its two near-duplicate driver programs
/// (spec §9's open question). Both construct the same engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    ExhaustiveScan,
    H2Linear,
    H2Simpfer,
    SAlshSimpfer,
    SAHCone,
    H2Cone,
}

/// The engine's own build-time configuration layer (spec §1's CLI/config
/// parsing is out of scope; this is the CORE's input validation, carried
/// regardless).
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub k_max: usize,
    pub b: f32,
    pub k_srp: usize,
    pub leaf_size: usize,
    pub seed: u64,
}

impl BuildConfig {
    pub fn new(k_max: usize) -> Self {
        BuildConfig {
            k_max,
            b: 0.5,
            k_srp: 64,
            leaf_size: 32,
            seed: crate::rng::DEFAULT_SEED,
        }
    }

    pub fn b(mut self, b: f32) -> Self {
        self.b = b;
        self
    }

    pub fn k_srp(mut self, k_srp: usize) -> Self {
        self.k_srp = k_srp;
        self
    }

    pub fn leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checked once at `build`, per spec §4.12/§7. Returns the first
    /// violated invariant.
    fn validate(&self, variant: Variant) -> Result<()> {
        if self.k_max == 0 {
            return Err(Error::Config("k_max must be > 0".into()));
        }
        if variant != Variant::ExhaustiveScan && !(self.b > 0.0 && self.b < 1.0) {
            return Err(Error::Config(format!("b must be in (0, 1), got {}", self.b)));
        }
        let uses_srp = matches!(variant, Variant::SAlshSimpfer | Variant::SAHCone);
        if uses_srp && (self.k_srp == 0 || self.k_srp % 64 != 0) {
            return Err(Error::Config(format!(
                "k_srp must be a positive multiple of 64, got {}",
                self.k_srp
            )));
        }
        let uses_cone = matches!(variant, Variant::SAHCone | Variant::H2Cone);
        if uses_cone && self.leaf_size == 0 {
            return Err(Error::Config("leaf_size must be > 0".into()));
        }
        Ok(())
    }
}

enum EngineKind {
    Scan(ScanIndex),
    Linear { items: Items, users: SimpferIndex },
    Cone { items: Items, tree: ConeTree },
}

pub struct ReverseKMipsEngine {
    kind: EngineKind,
    k_max: usize,
}

impl ReverseKMipsEngine {
    pub fn build(
        item_data: &[f32],
        item_ids: &[u32],
        n: usize,
        user_data: &[f32],
        user_ids: &[u32],
        m: usize,
        d: usize,
        variant: Variant,
        config: &BuildConfig,
    ) -> Result<Self> {
        config.validate(variant)?;

        let kind = match variant {
            Variant::ExhaustiveScan => {
                let items = ItemSet::sorted_by_norm_desc(item_data, item_ids, n, d);
                let scan = ScanIndex::build(user_data, user_ids, m, d, config.k_max, &items)?;
                EngineKind::Scan(scan)
            }
            Variant::H2Linear | Variant::H2Simpfer => {
                let items = ItemPartitioner::build(
                    item_data, item_ids, n, d, config.b, Transform::H2, config.k_srp, config.seed,
                )?;
                let users =
                    SimpferIndex::build(user_data, user_ids, m, d, config.k_max, &items.set)?;
                EngineKind::Linear { items, users }
            }
            Variant::SAlshSimpfer => {
                let items = ItemPartitioner::build(
                    item_data, item_ids, n, d, config.b, Transform::Sa, config.k_srp, config.seed,
                )?;
                let users =
                    SimpferIndex::build(user_data, user_ids, m, d, config.k_max, &items.set)?;
                EngineKind::Linear { items, users }
            }
            Variant::SAHCone => {
                let items = ItemPartitioner::build(
                    item_data, item_ids, n, d, config.b, Transform::Sa, config.k_srp, config.seed,
                )?;
                let tree = ConeTree::build(
                    user_data,
                    user_ids,
                    m,
                    d,
                    config.k_max,
                    config.leaf_size,
                    &items.set,
                    config.seed,
                )?;
                EngineKind::Cone { items, tree }
            }
            Variant::H2Cone => {
                let items = ItemPartitioner::build(
                    item_data, item_ids, n, d, config.b, Transform::H2, config.k_srp, config.seed,
                )?;
                let tree = ConeTree::build(
                    user_data,
                    user_ids,
                    m,
                    d,
                    config.k_max,
                    config.leaf_size,
                    &items.set,
                    config.seed,
                )?;
                EngineKind::Cone { items, tree }
            }
        };

        Ok(ReverseKMipsEngine {
            kind,
            k_max: config.k_max,
        })
    }

    /// `reverse_k_mips(q, k) -> list<user_id>`. `k` must lie in
    /// `1..=k_max`; per spec §7 no error channel exists at query time, so
    /// (matching the public API's `k: 1..=k_max` contract) this is a
    /// caller invariant checked with a debug assertion rather than a
    /// `Result`.
    pub fn reverse_k_mips(&self, query: &[f32], k: usize) -> Vec<u32> {
        let mut scratch = Counters::new();
        self.reverse_k_mips_with_metrics(query, k, &mut scratch)
    }

    /// Same query, but folds inner-product counts and wall-clock time into
    /// the caller-owned `counters` (spec §5: single-threaded benchmarking
    /// use only, never shared across concurrent queries).
    pub fn reverse_k_mips_with_metrics(
        &self,
        query: &[f32],
        k: usize,
        counters: &mut Counters,
    ) -> Vec<u32> {
        debug_assert!(k >= 1 && k <= self.k_max, "k must lie in 1..=k_max");
        let started = Instant::now();
        let result = match &self.kind {
            EngineKind::Scan(scan) => {
                counters.record_ip(scan.n as u64);
                scan.reverse_k_mips(query, k)
            }
            EngineKind::Linear { items, users } => {
                Self::query_linear(items, users, query, k, counters)
            }
            EngineKind::Cone { items, tree } => Self::query_cone(items, tree, query, k, counters),
        };
        counters.add_query_time(started.elapsed());
        result
    }

    pub fn memory_estimate(&self) -> usize {
        let base = std::mem::size_of::<ReverseKMipsEngine>();
        base + match &self.kind {
            EngineKind::Scan(scan) => {
                scan.vectors.len() * 4 + scan.k_bounds.len() * 4 + scan.norms.len() * 4
            }
            EngineKind::Linear { items, users } => {
                items_memory(items) + users.set.vectors.len() * 4 + users.set.lower_bounds.len() * 4
            }
            EngineKind::Cone { items, tree } => {
                items_memory(items)
                    + tree.set.vectors.len() * 4
                    + tree.set.lower_bounds.len() * 4
                    + tree.set.cos_to_center.len() * 4
                    + tree.set.sin_to_center.len() * 4
            }
        }
    }

    fn item_k_norm(items: &ItemSet, k: usize) -> f32 {
        if items.n == 0 {
            return 0.0;
        }
        items.norm((k - 1).min(items.n - 1))
    }

    fn query_linear(
        items: &Items,
        users: &SimpferIndex,
        query: &[f32],
        k: usize,
        counters: &mut Counters,
    ) -> Vec<u32> {
        let q_norm = l2_norm(query);
        let item_k_norm = Self::item_k_norm(&items.set, k);
        let mut result = Vec::new();

        for block in &users.blocks {
            let block_max_norm = block.max_norm(&users.set);
            if block_max_norm * q_norm < block.block_lower_bounds[k - 1] {
                continue;
            }
            for i in block.start..block.start + block.len {
                let u_norm = users.set.norms[i];
                let lb = users.set.lower_bounds(i)[k - 1];
                if q_norm * u_norm < lb {
                    continue;
                }
                let u_vec = users.set.vector(i);
                let ip = inner_product(query, u_vec);
                counters.record_ip(1);
                if ip < lb {
                    continue;
                }
                if ip >= u_norm * item_k_norm {
                    result.push(users.set.original_ids[i]);
                    continue;
                }
                if verify(
                    items,
                    query,
                    u_vec,
                    u_norm,
                    ip,
                    users.set.lower_bounds(i),
                    k,
                    counters,
                ) {
                    result.push(users.set.original_ids[i]);
                }
            }
        }
        result
    }

    fn query_cone(
        items: &Items,
        tree: &ConeTree,
        query: &[f32],
        k: usize,
        counters: &mut Counters,
    ) -> Vec<u32> {
        let q_norm = l2_norm(query);
        let item_k_norm = Self::item_k_norm(&items.set, k);
        let mut result = Vec::new();
        traverse_cone(
            &tree.root,
            items,
            &tree.set,
            query,
            q_norm,
            item_k_norm,
            k,
            &mut result,
            counters,
        );
        result
    }
}

fn items_memory(items: &Items) -> usize {
    let base = items.set.vectors.len() * 4 + items.set.norms.len() * 4;
    let sub_indexes: usize = items.blocks.iter().map(|b| b.sub_index_memory_bytes()).sum();
    base + sub_indexes
}

/// Verification (§4.11): decides whether `u` belongs in the reverse-k-MIPS
/// result once the cheap pruning lemmas couldn't settle it outright.
#[allow(clippy::too_many_arguments)]
fn verify(
    items: &Items,
    query: &[f32],
    u_vec: &[f32],
    u_norm: f32,
    uq_ip: f32,
    lower_bounds: &[f32],
    k: usize,
    counters: &mut Counters,
) -> bool {
    let mut top = MaxKArray::init(k, &lower_bounds[..k]);

    for block in &items.blocks {
        let upper = block.max_norm * u_norm;
        if upper <= uq_ip {
            return true;
        }
        let kip = top.min_key();
        if upper <= kip {
            return true;
        }

        let candidates = block.candidates(u_norm, query, kip, k);
        match candidates {
            Candidates::Ids(ids) => {
                for x in ids {
                    let item_norm = items.set.norm(x);
                    if item_norm * u_norm > top.min_key() {
                        let ip = inner_product(items.set.vector(x), u_vec);
                        counters.record_ip(1);
                        top.insert(ip);
                        if top.min_key() > uq_ip {
                            return false;
                        }
                    }
                }
            }
            Candidates::ScanAll => {
                for x in block.members() {
                    let item_norm = items.set.norm(x);
                    if item_norm * u_norm <= top.min_key().max(uq_ip) {
                        break;
                    }
                    let ip = inner_product(items.set.vector(x), u_vec);
                    counters.record_ip(1);
                    top.insert(ip);
                    if top.min_key() > uq_ip {
                        return false;
                    }
                }
            }
        }
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn traverse_cone(
    node: &crate::users::cone::ConeNode,
    items: &Items,
    tree_set: &crate::users::cone::ConeUserSet,
    query: &[f32],
    q_norm: f32,
    item_k_norm: f32,
    k: usize,
    result: &mut Vec<u32>,
    counters: &mut Counters,
) {
    let center = node.center();
    let center_norm = node.center_norm();
    let (q_cos, q_sin) = if center_norm > 0.0 {
        let qc = inner_product(query, center) / center_norm;
        let qs = (q_norm * q_norm - qc * qc).max(0.0).sqrt();
        (qc, qs)
    } else {
        (0.0, q_norm)
    };

    let upper = q_cos * node.m_cos() + q_sin * node.m_sin();
    if upper < node.lower_bounds()[k - 1] {
        return;
    }

    if let Some(range) = node.leaf_range() {
        for i in range {
            let lb = tree_set.lower_bounds(i)[k - 1];
            if q_norm < lb {
                continue;
            }
            let cos_i = tree_set.cos_to_center[i];
            let sin_i = tree_set.sin_to_center[i];
            let user_upper = q_cos * cos_i + q_sin * sin_i;
            if user_upper < lb {
                continue;
            }
            let u_vec = tree_set.vector(i);
            let ip = inner_product(query, u_vec);
            counters.record_ip(1);
            if ip < lb {
                continue;
            }
            if ip >= item_k_norm {
                result.push(tree_set.original_ids[i]);
                continue;
            }
            if verify(
                items,
                query,
                u_vec,
                1.0,
                ip,
                tree_set.lower_bounds(i),
                k,
                counters,
            ) {
                result.push(tree_set.original_ids[i]);
            }
        }
    } else {
        traverse_cone(
            node.left().unwrap(),
            items,
            tree_set,
            query,
            q_norm,
            item_k_norm,
            k,
            result,
            counters,
        );
        traverse_cone(
            node.right().unwrap(),
            items,
            tree_set,
            query,
            q_norm,
            item_k_norm,
            k,
            result,
            counters,
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exact_singleton_exhaustive_scan() {
        // spec §8 scenario 1.
        let items = vec![1.0f32, 0.0, 0.0, 1.0];
        let item_ids = vec![0u32, 1];
        let users = vec![1.0f32, 0.0];
        let user_ids = vec![0u32];
        let config = BuildConfig::new(1);
        let engine = ReverseKMipsEngine::build(
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
    fn test_rejected_by_bound_exhaustive_scan() {
        // spec §8 scenario 2.
        let items = vec![1.0f32, 0.0, 0.0, 1.0];
        let item_ids = vec![0u32, 1];
        let users = vec![1.0f32, 0.0];
        let user_ids = vec![0u32];
        let config = BuildConfig::new(1);
        let engine = ReverseKMipsEngine::build(
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
    fn test_l2_accept_path_linear() {
        // spec §8 scenario 3: L2 should accept without verification ever
        // touching a sub-index (n is far below N_INDEX_THRESHOLD, so the
        // block is linear-scan-only regardless; the behaviour under test
        // is the early L2 accept itself).
        let items = vec![3.0f32, 0.0, 0.0, 3.0, 1.0, 1.0, 1.0, 0.0];
        let item_ids = vec![0u32, 1, 2, 3];
        let users = vec![2.0f32, 0.0];
        let user_ids = vec![0u32];
        let config = BuildConfig::new(1).b(0.2);
        let engine = ReverseKMipsEngine::build(
            &items,
            &item_ids,
            4,
            &users,
            &user_ids,
            1,
            2,
            Variant::H2Simpfer,
            &config,
        )
        .unwrap();
        assert_eq!(engine.reverse_k_mips(&[10.0, 0.0], 1), vec![0]);
    }

    #[test]
    fn test_block_prune_linear() {
        // spec §8 scenario 4.
        let items = vec![5.0f32, 0.0, 0.0, 5.0];
        let item_ids = vec![0u32, 1];
        let users = vec![1.0f32, 0.0, 0.0, 0.1];
        let user_ids = vec![0u32, 1];
        let config = BuildConfig::new(1).b(0.2);
        let engine = ReverseKMipsEngine::build(
            &items,
            &item_ids,
            2,
            &users,
            &user_ids,
            2,
            2,
            Variant::H2Simpfer,
            &config,
        )
        .unwrap();
        assert!(engine.reverse_k_mips(&[0.01, 0.01], 1).is_empty());
    }

    #[test]
    fn test_metrics_record_ip_counts() {
        let items = vec![1.0f32, 0.0, 0.0, 1.0];
        let item_ids = vec![0u32, 1];
        let users = vec![1.0f32, 0.0];
        let user_ids = vec![0u32];
        let config = BuildConfig::new(1);
        let engine = ReverseKMipsEngine::build(
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
        let mut counters = Counters::new();
        engine.reverse_k_mips_with_metrics(&[2.0, 0.0], 1, &mut counters);
        assert_eq!(counters.ip_count(), 1);
    }

    #[test]
    fn test_memory_estimate_nonzero() {
        let items = vec![1.0f32, 0.0, 0.0, 1.0];
        let item_ids = vec![0u32, 1];
        let users = vec![1.0f32, 0.0];
        let user_ids = vec![0u32];
        let config = BuildConfig::new(1);
        let engine = ReverseKMipsEngine::build(
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
        assert!(engine.memory_estimate() > 0);
    }

    #[test]
    fn test_rejects_bad_config() {
        let items = vec![1.0f32, 0.0];
        let item_ids = vec![0u32];
        let users = vec![1.0f32, 0.0];
        let user_ids = vec![0u32];
        let config = BuildConfig::new(1).b(1.5);
        let err = ReverseKMipsEngine::build(
            &items,
            &item_ids,
            1,
            &users,
            &user_ids,
            1,
            2,
            Variant::H2Simpfer,
            &config,
        );
        assert!(err.is_err());
    }
}
