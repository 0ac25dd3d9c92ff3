//! Column layout of ledger files
//!
//! Cells are read as strings and converted leniently: ledgers that went
//! through spreadsheet tooling carry `3.0` for integers, `True`/`False` for
//! booleans and `nan` for empty cells.

use crate::ledger::LedgerEntry;
use crate::state::{Positions, TerminalState};
use serde::{Deserialize, Serialize};

/// Header of every ledger, worklist-of-rows and merged dataset file
pub const LEDGER_COLUMNS: [&str; 8] = [
    "worker_id",
    "row_index",
    "application_number",
    "no_record_found",
    "has_third_party_observation",
    "n_observation_letters",
    "observation_urls",
    "error",
];

/// One ledger line as it appears on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub worker_id: String,
    pub row_index: String,
    pub application_number: String,
    #[serde(default)]
    pub no_record_found: String,
    #[serde(default)]
    pub has_third_party_observation: String,
    #[serde(default)]
    pub n_observation_letters: String,
    #[serde(default)]
    pub observation_urls: String,
    #[serde(default)]
    pub error: String,
}

impl From<&LedgerEntry> for LedgerRow {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            worker_id: entry.worker_id.to_string(),
            row_index: entry.row_index.to_string(),
            application_number: entry.item_id.clone(),
            no_record_found: entry.terminal_state.no_record_flag().to_string(),
            has_third_party_observation: if entry.has_observations() {
                "True".to_string()
            } else {
                "False".to_string()
            },
            n_observation_letters: entry.observation_count().to_string(),
            observation_urls: entry.positions.to_ledger_string(),
            error: single_line(&entry.error),
        }
    }
}

/// Keeps every ledger record on one physical line
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl LedgerRow {
    /// Converts the raw row into an entry
    ///
    /// The observation count is always derived from the position list. A
    /// disagreeing `n_observation_letters` cell is reported through
    /// `count_mismatch` but does not reject the row.
    pub fn into_entry(self) -> Result<LedgerEntry, String> {
        let row_index = parse_int(&self.row_index)
            .ok_or_else(|| format!("invalid row_index '{}'", self.row_index))?;
        let worker_id = match self.worker_id.trim() {
            "" => 0,
            raw => parse_int(raw).ok_or_else(|| format!("invalid worker_id '{}'", raw))? as u32,
        };

        let positions = Positions::parse_ledger(&self.observation_urls);
        if let Some(declared) = parse_int(&self.n_observation_letters) {
            if declared as usize != positions.len() {
                tracing::debug!(
                    "row {}: n_observation_letters={} but {} positions; using positions",
                    row_index,
                    declared,
                    positions.len()
                );
            }
        }

        let error = match self.error.trim() {
            "nan" => String::new(),
            other => other.to_string(),
        };

        Ok(LedgerEntry {
            row_index,
            worker_id,
            item_id: self.application_number.trim().to_string(),
            terminal_state: TerminalState::from_no_record_flag(parse_flag(&self.no_record_found)),
            positions,
            error,
        })
    }
}

/// Parses an integer cell, accepting a trailing `.0`
pub(crate) fn parse_int(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.strip_suffix(".0").unwrap_or(raw).parse().ok()
}

/// Parses a boolean-ish cell
pub(crate) fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "1.0" | "true" | "yes"
    )
}
