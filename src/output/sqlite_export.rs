//! SQLite export of the canonical dataset
//!
//! The database is built in a temporary file beside the target and renamed
//! into place, so a reader never sees a half-written export.

use crate::output::schema::{get_schema_version, initialize_schema};
use crate::reconcile::CanonicalDataset;
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// Exports `dataset` to a fresh SQLite database at `path`
///
/// Any existing file at `path` is replaced. Returns the number of rows written.
pub fn export_sqlite(
    dataset: &CanonicalDataset,
    path: &Path,
    config_hash: &str,
) -> Result<usize, HarvestError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let tmp = tempfile::Builder::new()
        .prefix(".export-")
        .suffix(".sqlite")
        .tempfile_in(&dir)?;

    {
        let mut conn = Connection::open(tmp.path())?;
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
        write_dataset(&mut conn, dataset, config_hash)?;
        conn.close().map_err(|(_, e)| HarvestError::Database(e))?;
    }

    tmp.persist(path).map_err(|e| HarvestError::Io(e.error))?;
    tracing::info!("Exported {} rows to {}", dataset.len(), path.display());
    Ok(dataset.len())
}

/// Writes the dataset into `conn` in one transaction
pub fn write_dataset(
    conn: &mut Connection,
    dataset: &CanonicalDataset,
    config_hash: &str,
) -> Result<(), rusqlite::Error> {
    initialize_schema(conn)?;
    let tx = conn.transaction()?;

    {
        let mut insert_row = tx.prepare(
            "INSERT INTO observations
             (row_index, worker_id, application_number, no_record_found,
              has_third_party_observation, n_observation_letters, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        let mut insert_position = tx.prepare(
            "INSERT INTO observation_positions (row_index, position, value, status)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for entry in dataset.entries() {
            let error = if entry.error.is_empty() {
                None
            } else {
                Some(entry.error.as_str())
            };

            insert_row.execute(params![
                entry.row_index as i64,
                entry.worker_id,
                entry.item_id,
                entry.terminal_state.no_record_flag(),
                entry.has_observations(),
                entry.observation_count() as i64,
                error,
            ])?;

            for (position, value) in entry.positions.iter().enumerate() {
                insert_position.execute(params![
                    entry.row_index as i64,
                    position as i64,
                    value.to_ledger_token(),
                    value.status(),
                ])?;
            }
        }

        let mut insert_meta =
            tx.prepare("INSERT OR REPLACE INTO export_meta (key, value) VALUES (?1, ?2)")?;
        insert_meta.execute(params!["exported_at", Utc::now().to_rfc3339()])?;
        insert_meta.execute(params!["config_hash", config_hash])?;
        insert_meta.execute(params!["row_count", dataset.len().to_string()])?;
        insert_meta.execute(params!["schema_version", get_schema_version().to_string()])?;
    }

    tx.commit()
}
