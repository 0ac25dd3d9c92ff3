//! Statistics over a ledger or the canonical dataset
//!
//! This module provides functionality for summarizing harvest outcomes
//! and printing them for the operator.

use crate::ledger::LedgerEntry;
use crate::state::TerminalState;

/// Dataset statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetStatistics {
    /// Number of application rows
    pub rows: usize,

    /// Rows whose listing reported zero matches
    pub no_record_rows: usize,

    /// Rows with at least one observation position
    pub rows_with_observations: usize,

    /// Rows whose listing could not be loaded
    pub page_failures: usize,

    /// Rows with at least one failed position
    pub rows_with_failed_positions: usize,

    pub total_positions: usize,
    pub resolved_positions: usize,
    pub failed_positions: usize,
    pub already_present_positions: usize,
}

impl DatasetStatistics {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Self {
        let mut stats = Self::default();

        for entry in entries {
            stats.rows += 1;
            if entry.is_page_failure() {
                stats.page_failures += 1;
            } else if entry.terminal_state == TerminalState::NoRecords {
                stats.no_record_rows += 1;
            }
            if entry.has_observations() {
                stats.rows_with_observations += 1;
            }

            let (resolved, failed, present) = entry.positions.tally();
            if failed > 0 {
                stats.rows_with_failed_positions += 1;
            }
            stats.total_positions += entry.observation_count();
            stats.resolved_positions += resolved;
            stats.failed_positions += failed;
            stats.already_present_positions += present;
        }

        stats
    }

    /// Share of positions that hold an artifact (resolved or already present)
    pub fn fetch_rate(&self) -> f64 {
        if self.total_positions == 0 {
            return 0.0;
        }
        (self.resolved_positions + self.already_present_positions) as f64
            / self.total_positions as f64
            * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &DatasetStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Applications:");
    println!("  Rows: {}", stats.rows);
    println!("  No records: {}", stats.no_record_rows);
    println!("  With observations: {}", stats.rows_with_observations);
    println!("  Page failures: {}", stats.page_failures);
    println!(
        "  With failed positions: {}",
        stats.rows_with_failed_positions
    );
    println!();

    println!("Observation positions:");
    println!("  Total: {}", stats.total_positions);
    println!("  Resolved: {}", stats.resolved_positions);
    println!("  Already present: {}", stats.already_present_positions);
    println!("  Failed: {}", stats.failed_positions);
    println!();

    println!(
        "Fetch Rate: {:.1}% ({} / {} positions hold an artifact)",
        stats.fetch_rate(),
        stats.resolved_positions + stats.already_present_positions,
        stats.total_positions
    );
}
