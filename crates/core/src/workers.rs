//! Static page-range partitioning and the worker pool that runs one task per range.

use crate::error::IngestError;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::ops::Range;

/// Splits `0..total` into contiguous ranges, one per worker at most.
///
/// Ranges are assigned once; the last range absorbs the remainder.
pub fn partition_pages(total: u32, workers: usize) -> Vec<Range<u32>> {
    if total == 0 {
        return Vec::new();
    }

    let workers = (workers.max(1) as u32).min(total);
    let base = total / workers;
    let remainder = total % workers;

    let mut ranges = Vec::with_capacity(workers as usize);
    let mut start = 0;
    for worker in 0..workers {
        let len = base + u32::from(worker < remainder);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

pub struct WorkerPool {
    pool: ThreadPool,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, IngestError> {
        let size = size.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|index| format!("pdf-worker-{index}"))
            .build()
            .map_err(|error| IngestError::WorkerPool(error.to_string()))?;

        Ok(Self { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `task` once per range and blocks until all complete.
    ///
    /// Results come back in range order regardless of completion order.
    pub fn run_ranges<T, F>(&self, ranges: &[Range<u32>], task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Range<u32>) -> T + Send + Sync,
    {
        if self.size == 1 {
            return ranges.iter().cloned().map(&task).collect();
        }

        self.pool
            .install(|| ranges.par_iter().cloned().map(&task).collect())
    }
}
