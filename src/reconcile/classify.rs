//! Failure classification
//!
//! Splits the entries of one or more ledgers into two retry worklists:
//! applications whose listing never loaded (page failures) and applications
//! with specific positions that could not be fetched (download failures).

use crate::ledger::LedgerEntry;
use crate::state::Positions;
use std::collections::BTreeSet;

/// An application with at least one failed position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    pub row_index: u64,
    pub worker_id: u32,
    pub item_id: String,
    /// The full, unmodified position list of the failing entry
    pub positions: Positions,
    pub failed_indices: BTreeSet<usize>,
}

impl DownloadFailure {
    pub fn from_entry(entry: &LedgerEntry) -> Option<Self> {
        let failed_indices = entry.positions.failed_indices();
        if failed_indices.is_empty() {
            return None;
        }

        Some(Self {
            row_index: entry.row_index,
            worker_id: entry.worker_id,
            item_id: entry.item_id.clone(),
            positions: entry.positions.clone(),
            failed_indices,
        })
    }
}

/// The two retry worklists derived from a pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureWorklists {
    /// Full ledger entries whose listing could not be loaded
    pub page: Vec<LedgerEntry>,
    pub download: Vec<DownloadFailure>,
}

impl FailureWorklists {
    pub fn is_empty(&self) -> bool {
        self.page.is_empty() && self.download.is_empty()
    }

    /// Total number of positions awaiting a refetch
    pub fn failed_positions(&self) -> usize {
        self.download.iter().map(|f| f.failed_indices.len()).sum()
    }

    pub fn log_summary(&self, scanned: usize) {
        tracing::info!(
            "Classified {} entries: {} page failures, {} download failures ({} failed positions)",
            scanned,
            self.page.len(),
            self.download.len(),
            self.failed_positions()
        );
    }
}

/// Classifies ledger entries into page and download failures
///
/// An entry with a non-empty error is a page failure and nothing else. An
/// entry without error joins the download list when any of its positions is
/// a failure. Lists keep the input order.
pub fn classify_failures<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> FailureWorklists {
    let mut lists = FailureWorklists::default();
    let mut scanned = 0usize;

    for entry in entries {
        scanned += 1;
        if entry.is_page_failure() {
            lists.page.push(entry.clone());
        } else if let Some(failure) = DownloadFailure::from_entry(entry) {
            lists.download.push(failure);
        }
    }

    lists.log_summary(scanned);
    lists
}

/// Download failures still present in a reconciled dataset
///
/// This is the input of the next download retry round.
pub fn residual_download_failures<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> Vec<DownloadFailure> {
    let residual: Vec<DownloadFailure> = entries
        .into_iter()
        .filter(|entry| !entry.is_page_failure())
        .filter_map(DownloadFailure::from_entry)
        .collect();

    tracing::info!(
        "{} rows still have failed positions ({} positions)",
        residual.len(),
        residual
            .iter()
            .map(|f| f.failed_indices.len())
            .sum::<usize>()
    );
    residual
}
