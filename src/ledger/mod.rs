//! Checkpoint ledger for harvest passes
//!
//! This module handles:
//! - The `LedgerEntry` record written once per application per pass
//! - The append-only CSV ledger used to make every pass resumable
//! - Atomic whole-file writes for worklists and merged datasets

mod csv_ledger;
mod row;
mod traits;

pub use csv_ledger::{read_ledger, read_rows, write_entries, write_rows_atomic, CsvLedger};
pub use row::{LedgerRow, LEDGER_COLUMNS};
pub(crate) use row::parse_int;
pub use traits::{Ledger, LedgerError, LedgerResult};

use crate::state::{Positions, TerminalState};

/// One application assigned to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Global ordinal in the source list; the ledger primary key
    pub row_index: u64,

    /// Application number as searched on the portal
    pub item_id: String,

    /// Worker that owns this application
    pub shard_owner: u32,
}

/// The outcome of one application in one pass
///
/// A navigation failure is recorded with an empty position list and a
/// non-empty `error`; its terminal state is `HasRecords` because the listing
/// was never shown to be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub row_index: u64,
    pub worker_id: u32,
    pub item_id: String,
    pub terminal_state: TerminalState,
    pub positions: Positions,
    /// Navigation-level error text, empty if none
    pub error: String,
}

impl LedgerEntry {
    /// Entry for an application whose listing reported zero matches
    pub fn no_records(item: &Item) -> Self {
        Self {
            row_index: item.row_index,
            worker_id: item.shard_owner,
            item_id: item.item_id.clone(),
            terminal_state: TerminalState::NoRecords,
            positions: Positions::new(),
            error: String::new(),
        }
    }

    /// Entry for an application whose listing was enumerated
    pub fn with_positions(item: &Item, positions: Positions) -> Self {
        Self {
            row_index: item.row_index,
            worker_id: item.shard_owner,
            item_id: item.item_id.clone(),
            terminal_state: TerminalState::HasRecords,
            positions,
            error: String::new(),
        }
    }

    /// Entry for an application whose listing could not be loaded
    pub fn page_failure(item: &Item, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::with_positions(item, Positions::new())
        }
    }

    /// Number of artifacts discovered; always the length of the position list
    pub fn observation_count(&self) -> usize {
        self.positions.len()
    }

    pub fn has_observations(&self) -> bool {
        !self.positions.is_empty()
    }

    pub fn is_page_failure(&self) -> bool {
        !self.error.trim().is_empty()
    }

    pub fn item(&self) -> Item {
        Item {
            row_index: self.row_index,
            item_id: self.item_id.clone(),
            shard_owner: self.worker_id,
        }
    }
}
