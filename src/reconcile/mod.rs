//! Failure classification and reconciliation
//!
//! This module contains everything that runs after a pass:
//! - Splitting a ledger into page and download failure worklists
//! - Reading and writing worklist files
//! - Merging the base pass with retry rounds into the canonical dataset
//! - Per-application observation counts

mod classify;
mod counts;
mod merge;
mod worklist;

pub use classify::{
    classify_failures, residual_download_failures, DownloadFailure, FailureWorklists,
};
pub use counts::{item_counts, write_item_counts, ItemCount, ITEM_COUNT_COLUMNS};
pub use merge::{merge, CanonicalDataset, LayerReport, MergeLayer, OverrideKind};
pub use worklist::{
    load_download_failures, load_page_failures, write_download_failures, write_page_failures,
    DOWNLOAD_FAILURES_FILE, DOWNLOAD_FAILURE_COLUMNS, PAGE_FAILURES_FILE,
};
