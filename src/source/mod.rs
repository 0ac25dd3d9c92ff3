//! Source list of applications
//!
//! Reads the application list from CSV. `row_index` is the 0-based ordinal
//! of the data row in the unfiltered file, so indices do not move when the
//! filter changes and stay comparable with ledgers of earlier passes.

use crate::config::SourceConfig;
use crate::crawler::ShardSpec;
use crate::ledger::Item;
use csv::{ReaderBuilder, StringRecord};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read source list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed source list: {0}")]
    Csv(#[from] csv::Error),

    #[error("Source list has no column '{0}'")]
    MissingColumn(String),
}

/// One application of the source list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub row_index: u64,
    pub item_id: String,
}

impl SourceRecord {
    pub fn into_item(self, shard_owner: u32) -> Item {
        Item {
            row_index: self.row_index,
            item_id: self.item_id,
            shard_owner,
        }
    }
}

/// Loads the application list, applying the configured filter
pub fn load_items(config: &SourceConfig) -> Result<Vec<SourceRecord>, SourceError> {
    read_items(config, true)
}

/// Loads every application of the source list, ignoring the filter
pub fn load_all_items(config: &SourceConfig) -> Result<Vec<SourceRecord>, SourceError> {
    read_items(config, false)
}

fn read_items(config: &SourceConfig, filtered: bool) -> Result<Vec<SourceRecord>, SourceError> {
    let file = std::fs::File::open(&config.path).map_err(|source| SourceError::Io {
        path: config.path.clone(),
        source,
    })?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader.headers()?.clone();

    let item_column = column_index(&headers, &config.item_column)?;
    let filter = match (&config.filter_column, &config.filter_value) {
        (Some(column), Some(value)) if filtered => Some((column_index(&headers, column)?, value.trim())),
        _ => None,
    };

    let mut records = Vec::new();
    let mut total = 0u64;
    let mut row = StringRecord::new();

    while reader.read_record(&mut row)? {
        let row_index = total;
        total += 1;

        if let Some((column, value)) = filter {
            if row.get(column).map(str::trim) != Some(value) {
                continue;
            }
        }

        records.push(SourceRecord {
            row_index,
            item_id: row.get(item_column).unwrap_or("").trim().to_string(),
        });
    }

    tracing::info!(
        "Loaded {} of {} applications from {}",
        records.len(),
        total,
        config.path.display()
    );
    Ok(records)
}

/// Takes one worker's share of the source list
pub fn shard_items(records: &[SourceRecord], shard: ShardSpec) -> Vec<Item> {
    let slice = shard.slice(records);
    tracing::info!(
        "Worker {}/{} owns {} applications",
        shard.worker_id,
        shard.n_workers,
        slice.len()
    );
    slice
        .iter()
        .cloned()
        .map(|record| record.into_item(shard.worker_id))
        .collect()
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize, SourceError> {
    headers
        .iter()
        .position(|header| header.trim_start_matches('\u{feff}').trim() == name)
        .ok_or_else(|| SourceError::MissingColumn(name.to_string()))
}

/// Normalizes an application number for joining
///
/// Trims, uppercases, drops spaces and maps `-` to `/`.
pub fn normalize_item_id(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '-' { '/' } else { c })
        .collect()
}
