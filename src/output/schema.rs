//! Schema of the exported dataset database

/// SQL schema for the export database
pub const SCHEMA_SQL: &str = r#"
-- One row per application row of the canonical dataset
CREATE TABLE IF NOT EXISTS observations (
    row_index INTEGER PRIMARY KEY,
    worker_id INTEGER NOT NULL,
    application_number TEXT NOT NULL,
    no_record_found INTEGER NOT NULL,
    has_third_party_observation INTEGER NOT NULL,
    n_observation_letters INTEGER NOT NULL,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_observations_application ON observations(application_number);

-- Every position of every application, in listing order
CREATE TABLE IF NOT EXISTS observation_positions (
    row_index INTEGER NOT NULL REFERENCES observations(row_index),
    position INTEGER NOT NULL,
    value TEXT NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (row_index, position)
);

CREATE INDEX IF NOT EXISTS idx_positions_status ON observation_positions(status);

-- Provenance of the export
CREATE TABLE IF NOT EXISTS export_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the export schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Version recorded in `export_meta`
pub fn get_schema_version() -> u32 {
    1
}
