//! Infrastructure (C10): the thread-pool abstraction backing the parallel-
//! for over users during preprocessing (spec §5, §4.7/4.8/4.9).
//!
//! Grounded on the teacher's use of `rayon::prelude::*`/`into_par_iter()`
//! in `lsh/lsh.rs` (`query_bucket_ids_batch_par`), but built as a dedicated
//! pool rather than dispatched on the global rayon pool, so an embedding
//! host application's own rayon usage is left undisturbed.
use rayon::ThreadPool;

/// Default worker count for the preprocessing parallel-for; spec §5.
pub const DEFAULT_WORKERS: usize = 4;

pub fn build_thread_pool(workers: usize) -> ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .expect("failed to build preprocessing thread pool")
}
