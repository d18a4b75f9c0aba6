//! Ergonomic re-exports for downstream crates.
pub use crate::engine::{BuildConfig, ReverseKMipsEngine, Variant};
pub use crate::error::{Error, Result};
pub use crate::items::Transform;
pub use crate::metrics::Counters;
pub use crate::build_engine;
