//! Pagination crawler
//!
//! Walks every page of one application's listing and turns each observation
//! indicator into a position. The position counter is global across pages,
//! and an indicator that cannot be resolved still takes its slot as a
//! `Failed` sentinel so counts and positional retries stay consistent.

use crate::portal::{ArtifactStore, IndicatorHandle, Portal, PortalError};
use crate::state::{ObservationPosition, Positions};
use std::collections::BTreeSet;
use std::time::Duration;

/// What a crawl should do with the indicators it meets
#[derive(Debug, Clone, Copy)]
pub enum CrawlPlan<'a> {
    /// Resolve every indicator; the listing defines the position count
    Full,

    /// Only resolve positions in `failed`; everything else is copied from
    /// `known`, and the crawl stops once `known.len()` positions were seen
    Targeted {
        known: &'a Positions,
        failed: &'a BTreeSet<usize>,
    },
}

/// Enumerates and resolves the observation indicators of a listing
#[derive(Debug, Clone)]
pub struct ListingCrawler {
    store: ArtifactStore,
    /// Upper bound for resolving and storing one artifact
    resolve_budget: Duration,
    /// Wait after each page advance
    page_advance_delay: Duration,
    /// Treat an artifact already in the store as present
    skip_existing: bool,
}

impl ListingCrawler {
    pub fn new(
        store: ArtifactStore,
        resolve_budget: Duration,
        page_advance_delay: Duration,
        skip_existing: bool,
    ) -> Self {
        Self {
            store,
            resolve_budget,
            page_advance_delay,
            skip_existing,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Crawls the listing currently loaded in `portal`
    ///
    /// Errors are navigation-level: the indicators of a page could not be
    /// read, or the next page could not be loaded. Resolution failures never
    /// surface here; they become `Failed` positions.
    pub async fn crawl<P: Portal + ?Sized>(
        &self,
        portal: &mut P,
        item_id: &str,
        plan: CrawlPlan<'_>,
    ) -> Result<Positions, PortalError> {
        let mut positions = match plan {
            CrawlPlan::Full => Positions::new(),
            CrawlPlan::Targeted { known, .. } => known.clone(),
        };
        let mut cursor = 0usize;
        let mut page = 1usize;

        'pages: loop {
            let indicators = portal.indicators().await?;
            tracing::debug!(
                "{}: page {} has {} indicators",
                item_id,
                page,
                indicators.len()
            );

            for indicator in &indicators {
                match plan {
                    CrawlPlan::Full => {
                        let position = self.resolve_position(portal, item_id, cursor, indicator).await;
                        positions.push(position);
                    }
                    CrawlPlan::Targeted { known, failed } => {
                        if cursor >= known.len() {
                            break 'pages;
                        }
                        if failed.contains(&cursor) {
                            let position =
                                self.resolve_position(portal, item_id, cursor, indicator).await;
                            positions.set(cursor, position);
                        }
                    }
                }
                cursor += 1;
            }

            if let CrawlPlan::Targeted { known, .. } = plan {
                if cursor >= known.len() {
                    break;
                }
            }

            if !portal.next_page().await? {
                break;
            }
            page += 1;
            tokio::time::sleep(self.page_advance_delay).await;
        }

        if let CrawlPlan::Targeted { known, .. } = plan {
            if cursor < known.len() {
                tracing::warn!(
                    "{}: listing shows {} observations but {} were recorded; unseen positions kept",
                    item_id,
                    cursor,
                    known.len()
                );
            }
        }

        Ok(positions)
    }

    /// Resolves one indicator into a position, never failing the crawl
    async fn resolve_position<P: Portal + ?Sized>(
        &self,
        portal: &mut P,
        item_id: &str,
        index: usize,
        indicator: &IndicatorHandle,
    ) -> ObservationPosition {
        if self.skip_existing && self.store.exists(item_id, index) {
            tracing::debug!("{}: position {} already stored", item_id, index);
            return ObservationPosition::AlreadyPresent;
        }

        let destination = self.store.path_for(item_id, index);
        match tokio::time::timeout(
            self.resolve_budget,
            portal.resolve_artifact(indicator, &destination),
        )
        .await
        {
            Ok(Ok(locator)) => ObservationPosition::Resolved(locator),
            Ok(Err(e)) => {
                tracing::warn!("{}: position {} failed: {}", item_id, index, e);
                ObservationPosition::Failed
            }
            Err(_) => {
                tracing::warn!(
                    "{}: position {} timed out after {:?}",
                    item_id,
                    index,
                    self.resolve_budget
                );
                ObservationPosition::Failed
            }
        }
    }
}

/// Returns true if the listing reports zero matches on two reads separated
/// by `pause`
///
/// The summary region is filled asynchronously on the portal, so a single
/// read can see a stale "0 of 0".
pub async fn detect_no_records<P: Portal + ?Sized>(
    portal: &mut P,
    marker: &str,
    pause: Duration,
) -> bool {
    let shows_marker = |text: Option<String>| text.map_or(false, |t| t.contains(marker));

    if !shows_marker(portal.summary_text().await) {
        return false;
    }
    tokio::time::sleep(pause).await;
    shows_marker(portal.summary_text().await)
}
