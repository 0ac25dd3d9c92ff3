//! Worklist files
//!
//! The page failure list is a ledger-shaped file of full rows. The download
//! failure list carries `row_index, worker_id, application_number,
//! failed_positions, observation_urls`.
//!
//! Loading never fails: a retry round handed a missing or unreadable
//! worklist has nothing to do.

use crate::ledger::{
    parse_int, read_ledger, read_rows, write_entries, write_rows_atomic, LedgerEntry, LedgerResult,
};
use crate::reconcile::DownloadFailure;
use crate::state::{format_failed_indices, parse_failed_indices, Positions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default file name of the page failure list
pub const PAGE_FAILURES_FILE: &str = "page_failures.csv";

/// Default file name of the download failure list
pub const DOWNLOAD_FAILURES_FILE: &str = "download_failures.csv";

pub const DOWNLOAD_FAILURE_COLUMNS: [&str; 5] = [
    "row_index",
    "worker_id",
    "application_number",
    "failed_positions",
    "observation_urls",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DownloadFailureRow {
    row_index: String,
    #[serde(default)]
    worker_id: String,
    application_number: String,
    #[serde(default)]
    failed_positions: String,
    #[serde(default)]
    observation_urls: String,
}

impl From<&DownloadFailure> for DownloadFailureRow {
    fn from(failure: &DownloadFailure) -> Self {
        Self {
            row_index: failure.row_index.to_string(),
            worker_id: failure.worker_id.to_string(),
            application_number: failure.item_id.clone(),
            failed_positions: format_failed_indices(&failure.failed_indices),
            observation_urls: failure.positions.to_ledger_string(),
        }
    }
}

impl DownloadFailureRow {
    fn into_failure(self) -> Option<DownloadFailure> {
        Some(DownloadFailure {
            row_index: parse_int(&self.row_index)?,
            worker_id: parse_int(&self.worker_id).unwrap_or(0) as u32,
            item_id: self.application_number.trim().to_string(),
            positions: Positions::parse_ledger(&self.observation_urls),
            failed_indices: parse_failed_indices(&self.failed_positions),
        })
    }
}

pub fn write_page_failures(path: &Path, entries: &[LedgerEntry]) -> LedgerResult<()> {
    write_entries(path, entries)?;
    tracing::info!("Wrote {} page failures to {}", entries.len(), path.display());
    Ok(())
}

pub fn write_download_failures(path: &Path, failures: &[DownloadFailure]) -> LedgerResult<()> {
    write_rows_atomic(
        path,
        Some(&DOWNLOAD_FAILURE_COLUMNS[..]),
        failures.iter().map(DownloadFailureRow::from),
    )?;
    tracing::info!(
        "Wrote {} download failures to {}",
        failures.len(),
        path.display()
    );
    Ok(())
}

/// Loads a page failure list; missing or unreadable files are empty
pub fn load_page_failures(path: &Path) -> Vec<LedgerEntry> {
    if !path.exists() {
        tracing::info!("No page failure list at {}; nothing to retry", path.display());
        return Vec::new();
    }

    match read_ledger(path) {
        Ok(entries) => {
            tracing::info!("Loaded {} page failures from {}", entries.len(), path.display());
            entries
        }
        Err(e) => {
            tracing::warn!("Unreadable page failure list {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Loads a download failure list; missing or unreadable files are empty
pub fn load_download_failures(path: &Path) -> Vec<DownloadFailure> {
    if !path.exists() {
        tracing::info!(
            "No download failure list at {}; nothing to retry",
            path.display()
        );
        return Vec::new();
    }

    let rows: Vec<DownloadFailureRow> = match read_rows(path) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("Unreadable download failure list {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut failures = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_index = row.row_index.clone();
        match row.into_failure() {
            Some(failure) => failures.push(failure),
            None => tracing::warn!(
                "Skipping download failure with invalid row_index '{}' in {}",
                raw_index,
                path.display()
            ),
        }
    }

    tracing::info!(
        "Loaded {} download failures from {}",
        failures.len(),
        path.display()
    );
    failures
}
