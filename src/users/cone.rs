//! UserIndex — cone-tree (C7).
//!
//! A binary tree over unit-normalised users built by recursive 2-pivot
//! angular splitting (§4.8). Leaves store a cone half-angle (`m_cos`,
//! `m_sin`) and per-member angle-to-center cosines/sines; internal nodes
//! store only their own cone bound, recomputed (never inherited) from every
//! member beneath them. Node-level lower bounds are the component-wise
//! minimum of the per-user lower bounds seeded the same way as the linear
//! index (§4.7), restricted to the top `k_max * COEFF` items by norm.
use crate::error::{Error, Result};
use crate::items::ItemSet;
use crate::math::{inner_product, l2_norm};
use crate::pool::{build_thread_pool, DEFAULT_WORKERS};
use crate::rng::create_rng;
use crate::users::{compute_lower_bounds, min_bounds};
use rand::rngs::SmallRng;
use rand::Rng;
use rayon::prelude::*;

const SPLIT_RETRIES: usize = 3;

pub enum ConeNode {
    Leaf {
        start: usize,
        len: usize,
        center: Vec<f32>,
        center_norm: f32,
        m_cos: f32,
        m_sin: f32,
        lower_bounds: Vec<f32>,
    },
    Internal {
        left: Box<ConeNode>,
        right: Box<ConeNode>,
        center: Vec<f32>,
        center_norm: f32,
        m_cos: f32,
        m_sin: f32,
        lower_bounds: Vec<f32>,
        count: usize,
    },
}

impl ConeNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, ConeNode::Leaf { .. })
    }

    pub fn center(&self) -> &[f32] {
        match self {
            ConeNode::Leaf { center, .. } => center,
            ConeNode::Internal { center, .. } => center,
        }
    }

    pub fn center_norm(&self) -> f32 {
        match self {
            ConeNode::Leaf { center_norm, .. } => *center_norm,
            ConeNode::Internal { center_norm, .. } => *center_norm,
        }
    }

    pub fn m_cos(&self) -> f32 {
        match self {
            ConeNode::Leaf { m_cos, .. } => *m_cos,
            ConeNode::Internal { m_cos, .. } => *m_cos,
        }
    }

    pub fn m_sin(&self) -> f32 {
        match self {
            ConeNode::Leaf { m_sin, .. } => *m_sin,
            ConeNode::Internal { m_sin, .. } => *m_sin,
        }
    }

    pub fn lower_bounds(&self) -> &[f32] {
        match self {
            ConeNode::Leaf { lower_bounds, .. } => lower_bounds,
            ConeNode::Internal { lower_bounds, .. } => lower_bounds,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            ConeNode::Leaf { len, .. } => *len,
            ConeNode::Internal { count, .. } => *count,
        }
    }

    /// Leaf-only member range into the tree's [`ConeUserSet`] arena.
    pub fn leaf_range(&self) -> Option<std::ops::Range<usize>> {
        match self {
            ConeNode::Leaf { start, len, .. } => Some(*start..*start + *len),
            ConeNode::Internal { .. } => None,
        }
    }

    pub fn left(&self) -> Option<&ConeNode> {
        match self {
            ConeNode::Internal { left, .. } => Some(left),
            ConeNode::Leaf { .. } => None,
        }
    }

    pub fn right(&self) -> Option<&ConeNode> {
        match self {
            ConeNode::Internal { right, .. } => Some(right),
            ConeNode::Leaf { .. } => None,
        }
    }

    fn fill_lower_bounds(&mut self, bounds_flat: &[f32], k_max: usize) -> Vec<f32> {
        match self {
            ConeNode::Leaf {
                start,
                len,
                lower_bounds,
                ..
            } => {
                let rows = (*start..*start + *len).map(|i| &bounds_flat[i * k_max..(i + 1) * k_max]);
                let agg = min_bounds(rows, k_max);
                *lower_bounds = agg.clone();
                agg
            }
            ConeNode::Internal {
                left,
                right,
                lower_bounds,
                ..
            } => {
                let lb = left.fill_lower_bounds(bounds_flat, k_max);
                let rb = right.fill_lower_bounds(bounds_flat, k_max);
                let agg = min_bounds([lb.as_slice(), rb.as_slice()], k_max);
                *lower_bounds = agg.clone();
                agg
            }
        }
    }
}

pub struct ConeUserSet {
    pub d: usize,
    pub n: usize,
    pub original_ids: Vec<u32>,
    /// Unit-normalised, arena order.
    pub vectors: Vec<f32>,
    pub cos_to_center: Vec<f32>,
    pub sin_to_center: Vec<f32>,
    /// Row-major, `n * k_max`.
    pub lower_bounds: Vec<f32>,
    pub k_max: usize,
}

impl ConeUserSet {
    pub fn vector(&self, local_id: usize) -> &[f32] {
        &self.vectors[local_id * self.d..(local_id + 1) * self.d]
    }

    pub fn lower_bounds(&self, local_id: usize) -> &[f32] {
        &self.lower_bounds[local_id * self.k_max..(local_id + 1) * self.k_max]
    }
}

pub struct ConeTree {
    pub set: ConeUserSet,
    pub root: ConeNode,
}

fn farthest(from: usize, candidates: &[usize], unit_vectors: &[f32], d: usize) -> usize {
    let from_vec = &unit_vectors[from * d..(from + 1) * d];
    *candidates
        .iter()
        .min_by(|&&a, &&b| {
            let ia = inner_product(from_vec, &unit_vectors[a * d..(a + 1) * d]);
            let ib = inner_product(from_vec, &unit_vectors[b * d..(b + 1) * d]);
            ia.partial_cmp(&ib).unwrap()
        })
        .expect("candidates must be non-empty")
}

fn cone_bound(members: &[usize], center: &[f32], center_norm: f32, unit_vectors: &[f32], d: usize) -> (f32, f32) {
    if center_norm <= 0.0 {
        return (-1.0, 0.0);
    }
    let m_cos = members
        .iter()
        .map(|&i| inner_product(&unit_vectors[i * d..(i + 1) * d], center) / center_norm)
        .fold(f32::INFINITY, f32::min);
    let m_sin = (1.0 - m_cos * m_cos).max(0.0).sqrt();
    (m_cos, m_sin)
}

fn centroid_of(members: &[usize], unit_vectors: &[f32], d: usize) -> Vec<f32> {
    let mut c = vec![0f32; d];
    for &i in members {
        let v = &unit_vectors[i * d..(i + 1) * d];
        for (ci, vi) in c.iter_mut().zip(v) {
            *ci += vi;
        }
    }
    let n = members.len() as f32;
    if n > 0.0 {
        for ci in c.iter_mut() {
            *ci /= n;
        }
    }
    c
}

#[allow(clippy::too_many_arguments)]
fn build_structure(
    unit_vectors: &[f32],
    d: usize,
    members: Vec<usize>,
    leaf_size: usize,
    rng: &mut SmallRng,
    arena_positions: &mut Vec<usize>,
    arena_cos: &mut Vec<f32>,
    arena_sin: &mut Vec<f32>,
) -> ConeNode {
    if members.len() <= leaf_size {
        let center = centroid_of(&members, unit_vectors, d);
        let center_norm = l2_norm(&center);
        let start = arena_positions.len();
        let mut m_cos = f32::INFINITY;
        for &i in &members {
            let v = &unit_vectors[i * d..(i + 1) * d];
            let cos = if center_norm > 0.0 {
                inner_product(v, &center) / center_norm
            } else {
                1.0
            };
            let sin = (1.0 - cos * cos).max(0.0).sqrt();
            arena_positions.push(i);
            arena_cos.push(cos);
            arena_sin.push(sin);
            if cos < m_cos {
                m_cos = cos;
            }
        }
        let m_sin = (1.0 - m_cos * m_cos).max(0.0).sqrt();
        return ConeNode::Leaf {
            start,
            len: members.len(),
            center,
            center_norm,
            m_cos,
            m_sin,
            lower_bounds: Vec::new(),
        };
    }

    let mut split: Option<(Vec<usize>, Vec<usize>)> = None;
    for _ in 0..SPLIT_RETRIES {
        let p0 = members[rng.gen_range(0..members.len())];
        let l = farthest(p0, &members, unit_vectors, d);
        let r = farthest(l, &members, unit_vectors, d);
        let l_vec = &unit_vectors[l * d..(l + 1) * d];
        let r_vec = &unit_vectors[r * d..(r + 1) * d];
        let diff: Vec<f32> = l_vec.iter().zip(r_vec).map(|(a, b)| a - b).collect();

        let mut left = Vec::new();
        let mut right = Vec::new();
        for &i in &members {
            let v = &unit_vectors[i * d..(i + 1) * d];
            if inner_product(&diff, v) < 0.0 {
                left.push(i);
            } else {
                right.push(i);
            }
        }
        if !left.is_empty() && !right.is_empty() {
            split = Some((left, right));
            break;
        }
    }

    let (left_members, right_members) = split.unwrap_or_else(|| {
        let mid = members.len() / 2;
        (members[..mid].to_vec(), members[mid..].to_vec())
    });

    let left_node = build_structure(
        unit_vectors,
        d,
        left_members,
        leaf_size,
        rng,
        arena_positions,
        arena_cos,
        arena_sin,
    );
    let right_node = build_structure(
        unit_vectors,
        d,
        right_members,
        leaf_size,
        rng,
        arena_positions,
        arena_cos,
        arena_sin,
    );

    let n_l = left_node.count() as f32;
    let n_r = right_node.count() as f32;
    let n = n_l + n_r;
    let mut center = vec![0f32; d];
    for (ci, (cl, cr)) in center.iter_mut().zip(left_node.center().iter().zip(right_node.center())) {
        *ci = (n_l * cl + n_r * cr) / n;
    }
    let center_norm = l2_norm(&center);
    let (m_cos, m_sin) = cone_bound(&members, &center, center_norm, unit_vectors, d);

    ConeNode::Internal {
        left: Box::new(left_node),
        right: Box::new(right_node),
        center,
        center_norm,
        m_cos,
        m_sin,
        lower_bounds: Vec::new(),
        count: members.len(),
    }
}

impl ConeTree {
    pub fn build(
        data: &[f32],
        original_ids: &[u32],
        n: usize,
        d: usize,
        k_max: usize,
        leaf_size: usize,
        items: &ItemSet,
        seed: u64,
    ) -> Result<ConeTree> {
        if leaf_size == 0 {
            return Err(Error::Config("leaf_size must be > 0".into()));
        }
        assert_eq!(data.len(), n * d);
        assert_eq!(original_ids.len(), n);

        let mut unit_vectors = vec![0f32; n * d];
        for i in 0..n {
            let row = &data[i * d..(i + 1) * d];
            let norm = l2_norm(row);
            let out = &mut unit_vectors[i * d..(i + 1) * d];
            if norm > 0.0 {
                for (o, x) in out.iter_mut().zip(row) {
                    *o = x / norm;
                }
            } else {
                out.copy_from_slice(row);
            }
        }

        let mut rng = create_rng(seed);
        let members: Vec<usize> = (0..n).collect();
        let mut arena_positions = Vec::with_capacity(n);
        let mut arena_cos = Vec::with_capacity(n);
        let mut arena_sin = Vec::with_capacity(n);
        let mut root = build_structure(
            &unit_vectors,
            d,
            members,
            leaf_size,
            &mut rng,
            &mut arena_positions,
            &mut arena_cos,
            &mut arena_sin,
        );

        if arena_positions.len() != n {
            return Err(Error::Index(format!(
                "cone tree arena holds {} of {} users",
                arena_positions.len(),
                n
            )));
        }

        let arena_ids: Vec<u32> = arena_positions.iter().map(|&p| original_ids[p]).collect();
        let mut arena_vectors = Vec::with_capacity(n * d);
        for &p in &arena_positions {
            arena_vectors.extend_from_slice(&unit_vectors[p * d..(p + 1) * d]);
        }

        let pool = build_thread_pool(DEFAULT_WORKERS);
        let lower_bounds_rows: Vec<Vec<f32>> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| {
                    compute_lower_bounds(
                        &arena_vectors[i * d..(i + 1) * d],
                        1.0,
                        &items.norms,
                        &items.vectors,
                        items.d,
                        k_max,
                    )
                })
                .collect()
        });
        let lower_bounds_flat: Vec<f32> = lower_bounds_rows.into_iter().flatten().collect();

        root.fill_lower_bounds(&lower_bounds_flat, k_max);

        log::debug!("cone tree build: m={} leaf_size={}", n, leaf_size);

        Ok(ConeTree {
            set: ConeUserSet {
                d,
                n,
                original_ids: arena_ids,
                vectors: arena_vectors,
                cos_to_center: arena_cos,
                sin_to_center: arena_sin,
                lower_bounds: lower_bounds_flat,
                k_max,
            },
            root,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::items::{ItemPartitioner, Transform};

    fn sample_items() -> ItemSet {
        let data = vec![1.0f32, 0.0, 0.0, 1.0];
        let ids = vec![0u32, 1];
        ItemPartitioner::build(&data, &ids, 2, 2, 0.5, Transform::H2, 64, 41)
            .unwrap()
            .set
    }

    #[test]
    fn test_tree_covers_all_users_and_m_cos_is_tight() {
        let items = sample_items();
        // 8 unit-ish vectors at various angles.
        let mut data = Vec::new();
        for i in 0..8 {
            let theta = (i as f32) * std::f32::consts::FRAC_PI_4;
            data.push(theta.cos());
            data.push(theta.sin());
        }
        let ids: Vec<u32> = (0..8).collect();
        let tree = ConeTree::build(&data, &ids, 8, 2, 2, 2, &items, 41).unwrap();
        assert_eq!(tree.set.n, 8);
        assert_eq!(tree.root.count(), 8);

        // spec §8: for every node, <x, center>/||center|| >= M_cos for every member.
        fn check(node: &ConeNode, set: &ConeUserSet) {
            match node {
                ConeNode::Leaf { start, len, .. } => {
                    for i in *start..*start + *len {
                        let v = set.vector(i);
                        let cos = inner_product(v, node.center()) / node.center_norm();
                        assert!(cos >= node.m_cos() - 1e-4);
                    }
                }
                ConeNode::Internal { left, right, .. } => {
                    check(left, set);
                    check(right, set);
                }
            }
        }
        check(&tree.root, &tree.set);
    }
}
