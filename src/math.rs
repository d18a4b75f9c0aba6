//! Math kernels (C2): inner product, L2 norm, centroid, cosine angle, and
//! the Gaussian CDF approximation used only at QALSH build time.
//!
//! All accumulation happens in `f32` throughout the crate (never promoted
//! to `f64` in the inner product), so the exhaustive baseline and the
//! stored lower bounds stay bit-for-bit reproducible across runs with the
//! same seed. `new_cdf` is the one exception: its numerical integration
//! runs in `f64` because it is evaluated a handful of times at build, never
//! in a hot loop.
use ndarray::prelude::*;

/// Dot product of two equal-length slices.
///
/// # Panics
/// Panics if `a.len() != b.len()`.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    aview1(a).dot(&aview1(b))
}

/// Euclidean (L2) norm of a vector.
pub fn l2_norm(x: &[f32]) -> f32 {
    aview1(x).dot(&aview1(x)).sqrt()
}

/// Squared L2 distance between two equal-length slices.
pub fn l2_sqr(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Cosine of the angle between two vectors.
pub fn cosine_angle(a: &[f32], b: &[f32]) -> f32 {
    inner_product(a, b) / (l2_norm(a) * l2_norm(b))
}

/// Centroid of a set of equal-length vectors given as a flattened row-major
/// slice of `n` vectors of dimension `d`.
pub fn centroid(rows: &[f32], n: usize, d: usize) -> Vec<f32> {
    let mut c = vec![0f32; d];
    if n == 0 {
        return c;
    }
    for row in rows.chunks_exact(d) {
        for (ci, xi) in c.iter_mut().zip(row) {
            *ci += *xi;
        }
    }
    let n = n as f32;
    for ci in c.iter_mut() {
        *ci /= n;
    }
    c
}

/// Gaussian pdf, `N(mu, sigma)`.
pub fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = x - mu;
    (-(z * z) / (2. * sigma * sigma)).exp() / (sigma * (2. * std::f64::consts::PI).sqrt())
}

/// Numerically integrates the standard normal pdf on `[-x, x]` with a fixed
/// step. Used only at QALSH construction time to derive `w` and the
/// collision thresholds `p1`/`p2` — not a hot path, hence the plain `f64`
/// Riemann sum rather than a closed-form `erf`.
pub fn new_cdf(x: f64, step: f64) -> f64 {
    if x <= 0. {
        return 0.;
    }
    let mut result = 0.;
    let mut v = -x;
    while v < x {
        result += step * normal_pdf(v, 0., 1.);
        v += step;
    }
    result
}
