//! Output module for reporting on and exporting harvest results
//!
//! This module handles:
//! - Statistics over ledgers and the canonical dataset
//! - Exporting the canonical dataset to SQLite

mod schema;
mod sqlite_export;
pub mod stats;

pub use schema::{get_schema_version, initialize_schema, SCHEMA_SQL};
pub use sqlite_export::{export_sqlite, write_dataset};
pub use stats::{print_statistics, DatasetStatistics};
