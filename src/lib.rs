//! Objection-Harvest: a resumable harvester for planning-portal objection letters
//!
//! This crate walks the third-party observation listings of a paginated record
//! portal for every application in a source list, records one checkpointed
//! ledger row per application, classifies the failures of a pass into
//! retry worklists and reconciles the base pass with any number of retry
//! rounds into one canonical dataset.

pub mod config;
pub mod crawler;
pub mod ledger;
pub mod output;
pub mod portal;
pub mod reconcile;
pub mod source;
pub mod state;

use thiserror::Error;

/// Main error type for harvesting operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Source list error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Portal error: {0}")]
    Portal(#[from] portal::PortalError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid shard: worker {worker_id} of {n_workers}")]
    InvalidShard { worker_id: u32, n_workers: u32 },

    #[error("Invalid round name '{0}'")]
    InvalidRound(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::ItemPhase,
        to: state::ItemPhase,
    },

    #[error("Interrupted after {processed} items")]
    Interrupted { processed: usize },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// Result type alias for harvesting operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use ledger::{CsvLedger, Item, Ledger, LedgerEntry};
pub use state::{ItemPhase, ObservationPosition, Positions, TerminalState};
