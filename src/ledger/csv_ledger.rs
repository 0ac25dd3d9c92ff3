//! CSV-backed checkpoint ledger
//!
//! Every append opens the file, writes one complete line (plus the header on
//! first write) and syncs it before returning, so an interrupted process loses
//! at most the application it was working on.

use crate::ledger::row::{LedgerRow, LEDGER_COLUMNS};
use crate::ledger::traits::{Ledger, LedgerError, LedgerResult};
use crate::ledger::LedgerEntry;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Checkpoint ledger stored as a CSV file
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    /// Creates a ledger handle; nothing is touched on disk until the first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger of one worker of the initial pass: `{dir}/{prefix}_{worker}.csv`
    pub fn for_worker(dir: &Path, prefix: &str, worker_id: u32) -> Self {
        Self::new(dir.join(format!("{}_{}.csv", prefix, worker_id)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every well-formed entry of this ledger
    pub fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        read_ledger(&self.path)
    }
}

impl Ledger for CsvLedger {
    fn load_done_set(&self) -> LedgerResult<HashSet<u64>> {
        Ok(read_ledger(&self.path)?
            .into_iter()
            .map(|entry| entry.row_index)
            .collect())
    }

    fn append(&mut self, entry: &LedgerEntry) -> LedgerResult<()> {
        ensure_parent_dir(&self.path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;
        let len = file.metadata()?.len();

        // Anything after the last newline is a torn record from an interrupted write
        let complete = complete_len(&mut file, len)?;
        if complete < len {
            tracing::warn!(
                "Dropping {} bytes of torn trailing record from {}",
                len - complete,
                self.path.display()
            );
            file.set_len(complete)?;
        }

        let mut buffer = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .has_headers(complete == 0)
                .from_writer(&mut buffer);
            writer.serialize(LedgerRow::from(entry))?;
            writer.flush()?;
        }

        file.seek(SeekFrom::Start(complete))?;
        file.write_all(&buffer)?;
        file.sync_data()?;
        Ok(())
    }
}

/// Length of the file up to and including its last newline
fn complete_len(file: &mut File, len: u64) -> std::io::Result<u64> {
    const CHUNK: u64 = 4096;
    let mut end = len;
    let mut chunk = Vec::new();
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        chunk.resize((end - start) as usize, 0);
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Reads a ledger (or any file with ledger columns), tolerating a missing file
///
/// Rows that do not have the header's field count, or whose cells cannot be
/// converted, are skipped with a warning.
pub fn read_ledger(path: &Path) -> LedgerResult<Vec<LedgerEntry>> {
    let rows: Vec<LedgerRow> = read_rows(path)?;
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let row_index = row.row_index.clone();
        match row.into_entry() {
            Ok(entry) => entries.push(entry),
            Err(reason) => tracing::warn!(
                "Skipping ledger row {} in {}: {}",
                row_index,
                path.display(),
                reason
            ),
        }
    }
    Ok(entries)
}

/// Reads typed rows from a headed CSV file, skipping malformed lines
///
/// A missing file yields no rows. Bytes after the last newline belong to a
/// record an interrupted writer never finished and are ignored, so the item
/// it was for is simply not considered done.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> LedgerResult<Vec<T>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let complete = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    if complete < content.len() {
        tracing::warn!(
            "Ignoring unterminated trailing record in {}",
            path.display()
        );
    }
    if complete == 0 {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(&content[..complete]);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    let mut record = StringRecord::new();

    loop {
        let line = reader.position().line();
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!("Skipping unreadable line {} in {}: {}", line, path.display(), e);
                continue;
            }
        }

        if record.len() != headers.len() {
            let err = LedgerError::MalformedRow {
                line,
                reason: format!("expected {} fields, found {}", headers.len(), record.len()),
            };
            tracing::warn!("{}: {}", path.display(), err);
            continue;
        }

        match record.deserialize::<T>(Some(&headers)) {
            Ok(row) => rows.push(row),
            Err(e) => tracing::warn!("Skipping line {} in {}: {}", line, path.display(), e),
        }
    }

    Ok(rows)
}

/// Writes ledger entries to `path` atomically (temp file in the same directory, then rename)
pub fn write_entries<'a>(
    path: &Path,
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> LedgerResult<()> {
    write_rows_atomic(path, Some(&LEDGER_COLUMNS[..]), entries.into_iter().map(LedgerRow::from))
}

/// Writes serializable rows to `path` atomically
///
/// `header` is written explicitly when given so that an empty file still
/// carries its columns.
pub fn write_rows_atomic<T: Serialize>(
    path: &Path,
    header: Option<&[&str]>,
    rows: impl IntoIterator<Item = T>,
) -> LedgerResult<()> {
    ensure_parent_dir(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = WriterBuilder::new()
            .has_headers(header.is_none())
            .from_writer(tmp.as_file_mut());
        if let Some(columns) = header {
            writer.write_record(columns)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| LedgerError::Io(e.error))?;
    Ok(())
}
