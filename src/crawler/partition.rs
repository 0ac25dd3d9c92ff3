//! Work partitioning across parallel workers
//!
//! A shard is a pure function of `(total, n_workers, worker_id)`: a relaunch
//! with the same arguments always gets the same slice, which is what makes a
//! worker's ledger safe to resume.

use crate::HarvestError;
use std::ops::Range;

/// One worker's place in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    pub worker_id: u32,
    pub n_workers: u32,
}

impl ShardSpec {
    /// Creates a shard spec, rejecting `n_workers == 0` and out-of-range ids
    pub fn new(worker_id: u32, n_workers: u32) -> Result<Self, HarvestError> {
        if n_workers == 0 || worker_id >= n_workers {
            return Err(HarvestError::InvalidShard {
                worker_id,
                n_workers,
            });
        }
        Ok(Self {
            worker_id,
            n_workers,
        })
    }

    /// The whole item set handled by a single worker
    pub fn single() -> Self {
        Self {
            worker_id: 0,
            n_workers: 1,
        }
    }

    pub fn range(&self, total: usize) -> Range<usize> {
        shard_range(total, self.n_workers, self.worker_id)
    }

    /// Takes this worker's slice of `items`
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range(items.len())]
    }
}

/// Contiguous slice `[start, end)` of `total` items owned by `worker_id`
///
/// Every worker gets `total / n_workers` items; the last one also takes the
/// remainder. With fewer items than workers the early workers get empty
/// slices. `n_workers` must be non-zero and `worker_id < n_workers`.
pub fn shard_range(total: usize, n_workers: u32, worker_id: u32) -> Range<usize> {
    let n = n_workers.max(1) as usize;
    let w = (worker_id as usize).min(n - 1);
    let chunk = total / n;

    let start = w * chunk;
    let end = if w == n - 1 { total } else { (w + 1) * chunk };
    start..end
}
