//! Infrastructure (C10): process-wide-style metrics counters.
//!
//! Grounded on the original implementation's global `g_ip_count`/`g_time_*`
//! fields (`original_source/simpfer_dev/simpfer_index.hpp`), carried here as
//! a handle the caller owns rather than true globals -- idiomatic Rust has
//! no ambient mutable global, and the spec itself notes these counters
//! "exist only for single-threaded benchmarking" (spec §5, §9), so a handle
//! that is explicitly not `Sync`-shared during concurrent queries matches
//! the intended usage exactly.
use std::time::Duration;

/// Inner-product counter and phase timers. Not thread-safe: callers that
/// build or query from multiple threads must not share one `Counters`
/// across them (spec §5). The parallel preprocessing path (§4.7-4.9) keeps
/// one `Counters` per worker and reduces them with [`Counters::merge`] at
/// the join point instead.
#[derive(Debug, Default, Clone)]
pub struct Counters {
    ip_count: u64,
    norm_time: Duration,
    lower_bound_time: Duration,
    blocking_time: Duration,
    query_time: Duration,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ip(&mut self, n: u64) {
        self.ip_count += n;
    }

    pub fn add_norm_time(&mut self, d: Duration) {
        self.norm_time += d;
    }

    pub fn add_lower_bound_time(&mut self, d: Duration) {
        self.lower_bound_time += d;
    }

    pub fn add_blocking_time(&mut self, d: Duration) {
        self.blocking_time += d;
    }

    pub fn add_query_time(&mut self, d: Duration) {
        self.query_time += d;
    }

    pub fn ip_count(&self) -> u64 {
        self.ip_count
    }

    pub fn norm_time(&self) -> Duration {
        self.norm_time
    }

    pub fn lower_bound_time(&self) -> Duration {
        self.lower_bound_time
    }

    pub fn blocking_time(&self) -> Duration {
        self.blocking_time
    }

    pub fn query_time(&self) -> Duration {
        self.query_time
    }

    /// Folds another worker's counters into this one as a reduction sum --
    /// used to combine per-thread counters from the parallel-for over users
    /// (spec §5).
    pub fn merge(&mut self, other: &Counters) {
        self.ip_count += other.ip_count;
        self.norm_time += other.norm_time;
        self.lower_bound_time += other.lower_bound_time;
        self.blocking_time += other.blocking_time;
        self.query_time += other.query_time;
    }
}
