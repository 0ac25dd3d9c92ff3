//! Ledger traits and error types
//!
//! This module defines the trait interface for checkpoint ledgers and the
//! associated error types.

use crate::ledger::LedgerEntry;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur while reading or writing ledger files
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// An append-only, resumable record of one pass
///
/// A ledger is owned by exactly one writer for the duration of a pass.
/// Entries are never updated or removed; corrections happen in a later pass
/// and are reconciled by the merger.
pub trait Ledger {
    /// Returns the row indices already recorded
    ///
    /// A ledger that has never been written is empty, not an error.
    fn load_done_set(&self) -> LedgerResult<HashSet<u64>>;

    /// Durably appends exactly one entry before returning
    fn append(&mut self, entry: &LedgerEntry) -> LedgerResult<()>;
}
