//! # Threading Configuration
//!
//! Rayon thread pool construction. The only parallel loops are the per-row
//! binning map and the per-cell selection loop; both are deterministic for a
//! fixed seed whatever the pool size.

use crate::error::{GalsamplerError, Result};

/// Number of worker threads to use when none is requested.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Create a configured thread pool.
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .thread_name(|i| format!("galsampler-worker-{}", i))
        .build()
        .map_err(|e| GalsamplerError::config(format!("Failed to create thread pool: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size() {
        let pool = build_thread_pool(2).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        let name = pool.install(|| std::thread::current().name().map(str::to_owned));
        assert_eq!(name.as_deref().map(|n| n.starts_with("galsampler-worker-")), Some(true));
    }

    #[test]
    fn test_default_threads_positive() {
        assert!(default_threads() >= 1);
    }
}
