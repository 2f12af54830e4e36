//! Bounded worker pool shared by every fan-out in a run.
//!
//! Both the local existence probe and the similarity sweep hand the pool a
//! batch of independent work items. Workers never write shared state; the
//! caller combines the collected results single-threaded.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};

/// Threads per available processing unit when no explicit size is given.
const WORKERS_PER_CPU: usize = 4;

/// Upper bound on the default pool size.
const MAX_DEFAULT_WORKERS: usize = 64;

pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus * WORKERS_PER_CPU).clamp(1, MAX_DEFAULT_WORKERS)
}

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// `workers == 0` sizes the pool from the available parallelism.
    pub fn new(workers: usize) -> Result<Self> {
        let workers = if workers == 0 {
            default_workers()
        } else {
            workers
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("reorg-worker-{}", i))
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `work` to every item in parallel and keep the `Some` results,
    /// in input order.
    pub fn filter_map<I, T, F>(&self, items: Vec<I>, work: F) -> Vec<T>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Option<T> + Sync + Send,
    {
        self.pool
            .install(|| items.into_par_iter().filter_map(work).collect())
    }

    /// Fan `items` out to `work`, then hand every result to `combine` on the
    /// calling thread once all workers are done.
    pub fn run<I, T, R, F, C>(&self, items: Vec<I>, work: F, combine: C) -> R
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Option<T> + Sync + Send,
        C: FnOnce(Vec<T>) -> R,
    {
        let results = self.filter_map(items, work);
        combine(results)
    }
}
