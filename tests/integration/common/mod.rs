//! Shared fixtures for integration tests
//!
//! `ScriptedPortal` plays back a fixed set of listings so sessions and
//! crawls can be driven deterministically without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use objection_harvest::crawler::{HarvestSession, ListingCrawler, SessionSettings};
use objection_harvest::ledger::{CsvLedger, Item};
use objection_harvest::portal::{
    ArtifactStore, IndicatorHandle, Portal, PortalError, ResolveError,
};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const NO_RECORDS: &str = "Showing 0 to 0 of 0 entries";

/// What happens when an indicator is resolved
#[derive(Debug, Clone)]
pub enum Outcome {
    Resolve(String),
    Fail,
    Hang,
}

pub fn ok(locator: &str) -> Outcome {
    Outcome::Resolve(locator.to_string())
}

pub fn fail() -> Outcome {
    Outcome::Fail
}

/// One application's listing
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Summary texts returned by successive reads; the last one repeats
    pub summaries: Vec<String>,
    pub pages: Vec<Vec<Outcome>>,
    /// Number of initial `open_listing` calls that fail
    pub nav_failures: u32,
    /// Loading the page after this 0-based page fails
    pub fail_next_after: Option<usize>,
}

impl Listing {
    pub fn pages(pages: Vec<Vec<Outcome>>) -> Self {
        let total: usize = pages.iter().map(Vec::len).sum();
        Self {
            summaries: vec![format!("Showing 1 to {} of {} entries", total, total)],
            pages,
            ..Self::default()
        }
    }

    pub fn no_records() -> Self {
        Self {
            summaries: vec![NO_RECORDS.to_string()],
            ..Self::default()
        }
    }

    pub fn with_nav_failures(mut self, failures: u32) -> Self {
        self.nav_failures = failures;
        self
    }

    pub fn with_summaries(mut self, summaries: &[&str]) -> Self {
        self.summaries = summaries.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_after_page(mut self, page: usize) -> Self {
        self.fail_next_after = Some(page);
        self
    }
}

#[derive(Debug, Clone)]
struct Cursor {
    item_id: String,
    page: usize,
    summary_reads: usize,
}

/// A portal that plays back scripted listings
#[derive(Debug, Default)]
pub struct ScriptedPortal {
    listings: HashMap<String, Listing>,
    attempts: HashMap<String, u32>,
    current: Option<Cursor>,
    /// Every `open_listing` call, in order
    pub opened: Vec<String>,
    /// Every resolution attempt as (item, page, ordinal on page)
    pub resolved: Vec<(String, usize, usize)>,
    pub next_page_calls: usize,
    pub recycles: usize,
}

impl ScriptedPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, item_id: &str, listing: Listing) -> Self {
        self.listings.insert(item_id.to_string(), listing);
        self
    }

    /// Distinct applications whose listing was opened successfully or not
    pub fn opened_items(&self) -> Vec<String> {
        let mut items: Vec<String> = Vec::new();
        for id in &self.opened {
            if items.last() != Some(id) {
                items.push(id.clone());
            }
        }
        items
    }

    fn listing(&self) -> Result<(&Cursor, &Listing), PortalError> {
        let cursor = self.current.as_ref().ok_or(PortalError::NoListing)?;
        let listing = self
            .listings
            .get(&cursor.item_id)
            .ok_or(PortalError::NoListing)?;
        Ok((cursor, listing))
    }
}

fn timeout(stage: &'static str) -> PortalError {
    PortalError::Timeout {
        stage,
        after_ms: 10,
    }
}

#[async_trait]
impl Portal for ScriptedPortal {
    async fn open_listing(&mut self, item_id: &str) -> Result<(), PortalError> {
        self.opened.push(item_id.to_string());
        self.current = None;

        let listing = self.listings.get(item_id).ok_or(PortalError::Status {
            url: format!("scripted://{}", item_id),
            status: 404,
        })?;

        let attempt = self.attempts.entry(item_id.to_string()).or_insert(0);
        *attempt += 1;
        if *attempt <= listing.nav_failures {
            return Err(timeout("loading listing page"));
        }

        self.current = Some(Cursor {
            item_id: item_id.to_string(),
            page: 0,
            summary_reads: 0,
        });
        Ok(())
    }

    async fn summary_text(&mut self) -> Option<String> {
        let (cursor, listing) = self.listing().ok()?;
        let text = listing
            .summaries
            .get(cursor.summary_reads)
            .or_else(|| listing.summaries.last())
            .cloned();
        if let Some(cursor) = self.current.as_mut() {
            cursor.summary_reads += 1;
        }
        text
    }

    async fn indicators(&mut self) -> Result<Vec<IndicatorHandle>, PortalError> {
        let (cursor, listing) = self.listing()?;
        let page = listing.pages.get(cursor.page).cloned().unwrap_or_default();

        Ok(page
            .iter()
            .enumerate()
            .map(|(ordinal, outcome)| IndicatorHandle {
                ordinal,
                label: "3rd Party Observation".to_string(),
                target: match outcome {
                    Outcome::Resolve(locator) => Some(locator.clone()),
                    Outcome::Fail => None,
                    Outcome::Hang => Some("hang".to_string()),
                },
            })
            .collect())
    }

    async fn resolve_artifact(
        &mut self,
        indicator: &IndicatorHandle,
        destination: &Path,
    ) -> Result<String, ResolveError> {
        let cursor = self.current.clone().ok_or(ResolveError::NoTarget)?;
        self.resolved
            .push((cursor.item_id, cursor.page, indicator.ordinal));

        match indicator.target.as_deref() {
            None => Err(ResolveError::NoTarget),
            Some("hang") => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ResolveError::Timeout { after_ms: 30_000 })
            }
            Some(locator) => {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(destination, b"%PDF-1.4 scripted")?;
                Ok(locator.to_string())
            }
        }
    }

    async fn next_page(&mut self) -> Result<bool, PortalError> {
        self.next_page_calls += 1;
        let (cursor, listing) = self.listing()?;

        if listing.fail_next_after == Some(cursor.page) {
            return Err(timeout("loading next page"));
        }
        if cursor.page + 1 >= listing.pages.len() {
            return Ok(false);
        }

        if let Some(cursor) = self.current.as_mut() {
            cursor.page += 1;
        }
        Ok(true)
    }

    async fn recycle(&mut self) -> Result<(), PortalError> {
        self.recycles += 1;
        self.current = None;
        Ok(())
    }
}

pub fn item(row_index: u64, item_id: &str) -> Item {
    Item {
        row_index,
        item_id: item_id.to_string(),
        shard_owner: 0,
    }
}

/// Settings with no waiting at all
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        navigation_attempts: 3,
        backoff_base: Duration::from_millis(1),
        settle: Duration::ZERO,
        confirm_pause: Duration::ZERO,
        item_delay: Duration::ZERO,
        recycle_every: 50,
        no_records_marker: "0 to 0 of 0".to_string(),
    }
}

pub fn crawler(artifact_dir: &Path) -> ListingCrawler {
    ListingCrawler::new(
        ArtifactStore::new(artifact_dir),
        Duration::from_millis(200),
        Duration::ZERO,
        true,
    )
}

/// Session over a scripted portal writing `{dir}/ledger.csv`
pub fn session(
    dir: &Path,
    portal: ScriptedPortal,
) -> HarvestSession<ScriptedPortal, CsvLedger> {
    HarvestSession::new(
        portal,
        CsvLedger::new(dir.join("ledger.csv")),
        crawler(&dir.join("pdfs")),
        fast_settings(),
    )
    .unwrap()
}
