//! Error plumbing for the reverse k-MIPS engine.
//!
//! Mirrors a typical `thiserror`-based library error: one enum covering
//! every way `build_engine` or a query can fail, plus a catch-all `Other`
//! variant for the rare internal invariant check. The CORE never performs
//! I/O (that is the external loader's job), so there is no `Io` variant.
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid build-time configuration: bad `k`, `b`, `k_srp`, `leaf_size`,
    /// or `k_max < k`. Surfaced once, at `build_engine`.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A structural invariant was violated while building an index (block
    /// partitioning failed to cover every item, or a cone-tree split could
    /// not produce two children after retries). Fatal; the index is unusable.
    #[error("index build invariant violated: {0}")]
    Index(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
