//! Reverse k-Maximum Inner Product Search.
//!
//! Given a fixed item catalogue and a fixed user set, a reverse k-MIPS query
//! returns every user `u` for whom the query vector `q` would land in `u`'s
//! own top-k items by inner product. [`build_engine`] picks one of six
//! preprocessing strategies (exhaustive baseline, H2-ALSH or SA-ALSH item
//! blocks paired with a linear or cone-tree user index) and returns a
//! [`ReverseKMipsEngine`] whose [`ReverseKMipsEngine::reverse_k_mips`]
//! answers queries against it.
//!
//! See the [`prelude`] module for the common imports.
pub mod engine;
pub mod error;
pub mod items;
pub mod math;
pub mod metrics;
pub mod pool;
pub mod prelude;
pub mod qalsh;
pub mod rng;
pub mod scan;
pub mod srp;
pub mod topk;
pub mod users;

pub use engine::{BuildConfig, ReverseKMipsEngine, Variant};
pub use error::{Error, Result};

/// Builds an engine for `variant` over the given item and user catalogues.
///
/// `item_data`/`user_data` are row-major, `n * d` and `m * d` respectively;
/// `item_ids`/`user_ids` are the caller's own ids for each row.
#[allow(clippy::too_many_arguments)]
pub fn build_engine(
    item_data: &[f32],
    item_ids: &[u32],
    n: usize,
    user_data: &[f32],
    user_ids: &[u32],
    m: usize,
    d: usize,
    variant: Variant,
    config: &BuildConfig,
) -> Result<ReverseKMipsEngine> {
    ReverseKMipsEngine::build(
        item_data, item_ids, n, user_data, user_ids, m, d, variant, config,
    )
}
