//! Per-application observation counts
//!
//! Sums the observation count of every dataset row per application and
//! joins the totals onto the application list it is given. Given the
//! unfiltered source list, applications never harvested (or filtered out)
//! still appear with a count of zero.

use crate::ledger::{write_rows_atomic, LedgerEntry, LedgerResult};
use crate::source::normalize_item_id;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

pub const ITEM_COUNT_COLUMNS: [&str; 3] = [
    "application_number",
    "n_observation_letters",
    "has_observation",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemCount {
    #[serde(rename = "application_number")]
    pub item_id: String,
    #[serde(rename = "n_observation_letters")]
    pub count: usize,
    #[serde(serialize_with = "serialize_flag")]
    pub has_observation: bool,
}

fn serialize_flag<S: serde::Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*flag))
}

/// One count per entry of `item_ids`, in the same order
///
/// Both sides are joined on the normalized application number.
pub fn item_counts<'a, S: AsRef<str>>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    item_ids: &[S],
) -> Vec<ItemCount> {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        *totals.entry(normalize_item_id(&entry.item_id)).or_default() += entry.observation_count();
    }

    let counts: Vec<ItemCount> = item_ids
        .iter()
        .map(|id| {
            let item_id = normalize_item_id(id.as_ref());
            let count = totals.get(&item_id).copied().unwrap_or(0);
            ItemCount {
                item_id,
                count,
                has_observation: count > 0,
            }
        })
        .collect();

    tracing::info!(
        "{} applications, {} with observations",
        counts.len(),
        counts.iter().filter(|c| c.has_observation).count()
    );
    counts
}

pub fn write_item_counts(path: &Path, counts: &[ItemCount]) -> LedgerResult<()> {
    write_rows_atomic(path, Some(&ITEM_COUNT_COLUMNS[..]), counts)
}
