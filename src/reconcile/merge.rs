//! Reconciliation of a base pass with retry rounds
//!
//! Layers are applied strictly in the order given, lowest precedence first,
//! so a later layer wins on any row it touches:
//! - a `FullRow` layer (page failure retry) replaces every field of the row,
//!   inserting it if the base never had it
//! - a `PositionsOnly` layer (download retry) replaces only the position
//!   list, and only for rows already in the dataset

use crate::ledger::{read_ledger, write_entries, LedgerEntry, LedgerResult};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// How a layer overrides the rows it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    FullRow,
    PositionsOnly,
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullRow => write!(f, "full-row"),
            Self::PositionsOnly => write!(f, "positions-only"),
        }
    }
}

/// One retry round's ledger entries
#[derive(Debug, Clone)]
pub struct MergeLayer {
    pub name: String,
    pub kind: OverrideKind,
    pub entries: Vec<LedgerEntry>,
}

impl MergeLayer {
    pub fn new(name: impl Into<String>, kind: OverrideKind, entries: Vec<LedgerEntry>) -> Self {
        Self {
            name: name.into(),
            kind,
            entries,
        }
    }

    /// Reads one layer from any number of ledger files (e.g. one per worker)
    pub fn from_files(kind: OverrideKind, paths: &[PathBuf]) -> LedgerResult<Self> {
        let mut entries = Vec::new();
        for path in paths {
            if !path.exists() {
                tracing::warn!("Merge input {} does not exist; skipping", path.display());
                continue;
            }
            entries.extend(read_ledger(path)?);
        }

        let name = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("+");
        Ok(Self::new(name, kind, entries))
    }
}

/// What applying one layer did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerReport {
    pub replaced: usize,
    pub inserted: usize,
    pub patched: usize,
    /// Positions-only rows whose `row_index` is not in the dataset
    pub ignored: usize,
}

/// The reconciled dataset: one entry per `row_index`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalDataset {
    rows: BTreeMap<u64, LedgerEntry>,
}

impl CanonicalDataset {
    /// Builds the base stage, keeping the first occurrence of each row
    pub fn from_base(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut rows = BTreeMap::new();
        let mut duplicates = 0usize;
        for entry in entries {
            if rows.contains_key(&entry.row_index) {
                duplicates += 1;
                continue;
            }
            rows.insert(entry.row_index, entry);
        }

        if duplicates > 0 {
            tracing::debug!("Dropped {} duplicate base rows", duplicates);
        }
        Self { rows }
    }

    /// Reads a dataset previously written with `write`
    pub fn load(path: &Path) -> LedgerResult<Self> {
        Ok(Self::from_base(read_ledger(path)?))
    }

    /// Applies one layer on top of the current rows
    pub fn apply(&mut self, layer: &MergeLayer) -> LayerReport {
        let mut report = LayerReport::default();

        for entry in &layer.entries {
            match layer.kind {
                OverrideKind::FullRow => {
                    if self.rows.insert(entry.row_index, entry.clone()).is_some() {
                        report.replaced += 1;
                    } else {
                        report.inserted += 1;
                    }
                }
                OverrideKind::PositionsOnly => match self.rows.get_mut(&entry.row_index) {
                    Some(target) => {
                        target.positions = entry.positions.clone();
                        report.patched += 1;
                    }
                    None => report.ignored += 1,
                },
            }
        }

        tracing::info!(
            "Applied {} layer {}: {} replaced, {} inserted, {} patched, {} ignored",
            layer.kind,
            layer.name,
            report.replaced,
            report.inserted,
            report.patched,
            report.ignored
        );
        report
    }

    pub fn get(&self, row_index: u64) -> Option<&LedgerEntry> {
        self.rows.get(&row_index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Entries in `row_index` order
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.rows.values()
    }

    /// Writes the dataset atomically in ledger layout
    pub fn write(&self, path: &Path) -> LedgerResult<()> {
        write_entries(path, self.entries())
    }

    pub fn log_summary(&self) {
        let page_failures = self.entries().filter(|e| e.is_page_failure()).count();
        let download_failures = self
            .entries()
            .filter(|e| !e.is_page_failure() && e.positions.has_failures())
            .count();
        let failed_positions: usize = self
            .entries()
            .map(|e| e.positions.failed_indices().len())
            .sum();

        tracing::info!(
            "Dataset: {} rows, {} page failures, {} rows with download failures, {} failed positions",
            self.len(),
            page_failures,
            download_failures,
            failed_positions
        );
    }
}

/// Merges a base with layers in ascending precedence
pub fn merge(base: Vec<LedgerEntry>, layers: &[MergeLayer]) -> CanonicalDataset {
    let mut dataset = CanonicalDataset::from_base(base);
    tracing::info!("Base stage: {} rows", dataset.len());

    for layer in layers {
        dataset.apply(layer);
    }

    dataset.log_summary();
    dataset
}
