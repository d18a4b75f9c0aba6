//! User-side indexes (C6, C7): the linear Simpfer blocking index and the
//! cone-tree. Both share the same per-user lower-bound computation (§4.7),
//! factored out here.
pub mod cone;
pub mod simpfer;

use crate::math::inner_product;
use crate::topk::MaxKArray;

/// Restricts the exact k-MIPS used to seed lower bounds to the top
/// `k_max * COEFF` items by norm; spec §4.7's `COEFF`.
pub const COEFF: usize = 4;

/// Computes `lower_bounds[0..k_max]` for one user by running an exact
/// k-MIPS against only the top `k_max * COEFF` items by norm (items must
/// already be sorted descending by norm). Restricting the item set can
/// only decrease the true `tau_k`, so the result is always a valid (if
/// possibly loose) under-approximation. Early-exits the scan once the
/// running k_max-th best value exceeds the upper bound `user_norm *
/// item_norm[j]` offered by every remaining item.
pub fn compute_lower_bounds(
    user_vec: &[f32],
    user_norm: f32,
    item_norms: &[f32],
    item_vectors: &[f32],
    d: usize,
    k_max: usize,
) -> Vec<f32> {
    let limit = (k_max * COEFF).min(item_norms.len());
    let mut arr = MaxKArray::new(k_max);
    for (j, norm_j) in item_norms.iter().enumerate().take(limit) {
        if arr.len() >= k_max && user_norm * norm_j <= arr.min_key() {
            break;
        }
        let ip = inner_product(user_vec, &item_vectors[j * d..(j + 1) * d]);
        arr.insert(ip);
    }
    let mut bounds = vec![f32::NEG_INFINITY; k_max];
    for i in 0..arr.len() {
        bounds[i] = arr.ith_key(i);
    }
    bounds
}

/// Component-wise minimum of a set of per-user bound arrays, i.e. a
/// block's or cone node's aggregate lower bounds (§3: `block_lower_bounds[j]
/// = min over members of member.lower_bounds[j]`).
pub fn min_bounds<'a, I: IntoIterator<Item = &'a [f32]>>(bounds: I, k_max: usize) -> Vec<f32> {
    let mut agg = vec![f32::INFINITY; k_max];
    for b in bounds {
        for (a, &v) in agg.iter_mut().zip(b) {
            if v < *a {
                *a = v;
            }
        }
    }
    agg
}
