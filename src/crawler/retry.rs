//! Retry rounds
//!
//! A page failure round re-harvests whole applications. A download round
//! refetches only the failed positions of each application. Both run the
//! same session; they differ in the work items handed to it and in the
//! ledger they write.

use crate::crawler::partition::ShardSpec;
use crate::crawler::session::WorkItem;
use crate::ledger::{Item, LedgerEntry};
use crate::reconcile::DownloadFailure;
use crate::HarvestError;
use std::path::{Path, PathBuf};

/// Default name of the first page failure round
pub const PAGE_RETRY_ROUND: &str = "rerun_page_failures";

/// Checks that a round name can be used as a ledger file stem
pub fn validate_round_name(round: &str) -> Result<(), HarvestError> {
    let trimmed = round.trim();
    if trimmed.is_empty()
        || trimmed != round
        || round.contains(['/', '\\'])
        || round == "."
        || round == ".."
    {
        return Err(HarvestError::InvalidRound(round.to_string()));
    }
    Ok(())
}

/// Full re-harvest work for every page failure
///
/// Each application keeps the worker id of the pass that first owned it.
pub fn page_failure_work(failures: &[LedgerEntry]) -> Vec<WorkItem> {
    failures
        .iter()
        .map(|entry| WorkItem::full(entry.item()))
        .collect()
}

/// Targeted refetch work for every download failure
pub fn download_failure_work(failures: &[DownloadFailure]) -> Vec<WorkItem> {
    failures
        .iter()
        .map(|failure| {
            WorkItem::targeted(
                Item {
                    row_index: failure.row_index,
                    item_id: failure.item_id.clone(),
                    shard_owner: failure.worker_id,
                },
                failure.positions.clone(),
                failure.failed_indices.clone(),
            )
        })
        .collect()
}

/// Takes one worker's share of a round's work
pub fn shard_work(work: Vec<WorkItem>, shard: ShardSpec) -> Vec<WorkItem> {
    let range = shard.range(work.len());
    tracing::info!(
        "Worker {}/{} takes {} of {} retry items",
        shard.worker_id,
        shard.n_workers,
        range.len(),
        work.len()
    );
    work.into_iter()
        .skip(range.start)
        .take(range.len())
        .collect()
}

/// Ledger of one worker in a retry round
///
/// A round run by a single worker writes `{round}.csv`; a sharded round
/// writes `{round}_worker_{w}.csv`.
pub fn round_ledger_path(dir: &Path, round: &str, shard: ShardSpec) -> PathBuf {
    if shard.n_workers == 1 {
        dir.join(format!("{}.csv", round))
    } else {
        dir.join(format!("{}_worker_{}.csv", round, shard.worker_id))
    }
}

/// Every ledger a round may have written, for merging
pub fn round_ledger_paths(dir: &Path, round: &str, n_workers: u32) -> Vec<PathBuf> {
    if n_workers <= 1 {
        return vec![dir.join(format!("{}.csv", round))];
    }
    (0..n_workers)
        .map(|w| dir.join(format!("{}_worker_{}.csv", round, w)))
        .collect()
}
