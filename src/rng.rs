//! Seeded RNG construction (C10).
//!
//! Grounded on the teacher's `create_rng`/`rand_unit_vec` (`utils.rs`): a
//! `SmallRng` seeded from a single `u64`, so that index builds are
//! reproducible given the same seed (spec §6's "one fixed RNG seed, default
//! 41, controls projection-vector generation").
//!
//! The Gaussian sampler uses Marsaglia's polar method rather than
//! `rand_distr`'s ziggurat-based `StandardNormal`: the spec is explicit that
//! projection coefficients come from this particular method, and pinning the
//! exact algorithm (not just the seed) is what makes two builds with the
//! same seed byte-for-byte identical regardless of which `rand_distr`
//! version happens to be in the dependency graph.
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// The spec's default RNG seed for reproducible index builds.
pub const DEFAULT_SEED: u64 = 41;

pub fn create_rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// One standard-normal sample via Marsaglia's polar method. Draws pairs of
/// uniform variates until one falls inside the unit circle; each accepted
/// pair yields two independent normals, so callers get called twice as
/// often as draws are made -- we just take the first of the pair and
/// discard the second, trading a little efficiency for a simpler, stateless
/// per-call API.
pub fn gaussian_sample<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u = rng.gen_range(-1.0..1.0f64);
        let v = rng.gen_range(-1.0..1.0f64);
        let s = u * u + v * v;
        if s > 0.0 && s < 1.0 {
            let mul = (-2.0 * s.ln() / s).sqrt();
            return u * mul;
        }
    }
}

/// Samples `n` i.i.d. `N(0,1)` values as `f32`, e.g. to fill a projection
/// vector for QALSH or SRP-LSH.
pub fn gaussian_vec<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<f32> {
    (0..n).map(|_| gaussian_sample(rng) as f32).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reproducible() {
        let mut a = create_rng(41);
        let mut b = create_rng(41);
        let va = gaussian_vec(&mut a, 16);
        let vb = gaussian_vec(&mut b, 16);
        assert_eq!(va, vb);
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut a = create_rng(41);
        let mut b = create_rng(42);
        let va = gaussian_vec(&mut a, 16);
        let vb = gaussian_vec(&mut b, 16);
        assert_ne!(va, vb);
    }

    #[test]
    fn test_roughly_standard() {
        let mut rng = create_rng(7);
        let v = gaussian_vec(&mut rng, 20_000);
        let mean: f32 = v.iter().sum::<f32>() / v.len() as f32;
        assert!(mean.abs() < 0.05);
    }
}
