//! Portal capability used by the harvester
//!
//! The harvester never talks to a portal directly. It drives a `Portal`,
//! which can load the listing for one application, report the listing's
//! summary text, enumerate the observation indicators of the current page,
//! resolve one indicator into a fetched artifact, and move to the next page.
//!
//! `HttpPortal` implements the capability over plain HTTP; tests use scripted
//! implementations.

mod http;
mod markup;
mod store;

pub use http::{build_http_client, HttpPortal};
pub use markup::{ListingMarkup, ListingSelectors, NextControl};
pub use store::ArtifactStore;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Navigation-level failures: the listing (or one of its pages) could not be loaded
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Timed out after {after_ms}ms while {stage}")]
    Timeout { stage: &'static str, after_ms: u64 },

    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("No listing is loaded")]
    NoListing,

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Artifact-level failures: one indicator could not be turned into a fetched artifact
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Indicator has no target")]
    NoTarget,

    #[error("Timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to store artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// One observation indicator found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorHandle {
    /// Position of the indicator on its page, in document order
    pub ordinal: usize,

    /// Accessible label or text of the indicator
    pub label: String,

    /// Absolute location the indicator leads to, if one could be found
    pub target: Option<String>,
}

/// Capability to browse one portal's listings
///
/// One instance is one browsing context and is never shared between
/// concurrent operations.
#[async_trait]
pub trait Portal: Send {
    /// Loads the first page of the listing for `item_id`
    async fn open_listing(&mut self, item_id: &str) -> Result<(), PortalError>;

    /// Text of the listing's summary region, if present
    async fn summary_text(&mut self) -> Option<String>;

    /// Observation indicators on the current page, in document order
    async fn indicators(&mut self) -> Result<Vec<IndicatorHandle>, PortalError>;

    /// Resolves an indicator, stores the artifact at `destination` and
    /// returns the artifact's final locator
    async fn resolve_artifact(
        &mut self,
        indicator: &IndicatorHandle,
        destination: &Path,
    ) -> Result<String, ResolveError>;

    /// Moves to the next listing page; `Ok(false)` when there is none
    async fn next_page(&mut self) -> Result<bool, PortalError>;

    /// Discards the browsing context and starts a fresh one
    async fn recycle(&mut self) -> Result<(), PortalError>;
}
