//! Bounded-parallel fan-out over a known-size index range.
//!
//! Each stage builds one pool and fans every batch out across it. Workers
//! must not assume any ordering between indices; the caller reassembles
//! results by index, which is what keeps per-record order stable through the
//! parallel section.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::error::Result;

/// A fixed-size worker pool wrapping a dedicated rayon thread pool.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `threads` workers; `0` falls back to the hardware
    /// thread count.
    pub fn new(threads: usize) -> Result<Self> {
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Invoke `f(i)` for every `i` in `[0, n)`, blocking until the batch
    /// drains. A panic in `f` propagates to the caller after all workers
    /// finish.
    pub fn run<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        self.pool.install(|| (0..n).into_par_iter().for_each(|i| f(i)));
    }

    /// Invoke `f(i, slot)` for every slot of `items`, each invocation owning
    /// its slot exclusively.
    pub fn run_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        self.pool
            .install(|| items.par_iter_mut().enumerate().for_each(|(i, t)| f(i, t)));
    }
}
