//! Harvest session - one worker's sequential pass over its work
//!
//! For every application not yet in the pass's ledger the session:
//! 1. Loads the listing, retrying with exponential backoff
//! 2. Checks the "no records" marker
//! 3. Crawls the listing (fully, or only the failed positions of a refetch)
//! 4. Appends exactly one ledger entry
//! 5. Waits the politeness delay, recycling the portal periodically

use crate::config::Config;
use crate::crawler::listing::{detect_no_records, CrawlPlan, ListingCrawler};
use crate::ledger::{Item, Ledger, LedgerEntry};
use crate::portal::{Portal, PortalError};
use crate::state::{ItemPhase, Positions, TerminalState};
use crate::HarvestError;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pacing and retry knobs of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub navigation_attempts: u32,
    /// Delay before the second attempt; doubled for every further one
    pub backoff_base: Duration,
    /// Wait after a successful navigation before reading the listing
    pub settle: Duration,
    /// Pause between the two reads of the no-records marker
    pub confirm_pause: Duration,
    pub item_delay: Duration,
    /// Recycle the portal after this many processed items; 0 disables
    pub recycle_every: u32,
    pub no_records_marker: String,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            navigation_attempts: config.session.navigation_attempts,
            backoff_base: Duration::from_millis(config.session.backoff_base_ms),
            settle: Duration::from_millis(config.timeouts.settle),
            confirm_pause: Duration::from_millis(config.timeouts.confirm_pause),
            item_delay: Duration::from_millis(config.session.item_delay_ms),
            recycle_every: config.session.recycle_every,
            no_records_marker: config.portal.no_records_marker.clone(),
        }
    }

    /// Sleep before attempt `attempt + 1`, after `attempt` failures
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

/// Positions of an earlier pass to refetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefetchTarget {
    pub positions: Positions,
    pub failed: BTreeSet<usize>,
}

/// One unit of work for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub item: Item,
    /// `None` for a full harvest of the application
    pub target: Option<RefetchTarget>,
}

impl WorkItem {
    pub fn full(item: Item) -> Self {
        Self { item, target: None }
    }

    pub fn targeted(item: Item, positions: Positions, failed: BTreeSet<usize>) -> Self {
        Self {
            item,
            target: Some(RefetchTarget { positions, failed }),
        }
    }
}

/// Counters for one session run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Items appended to the ledger by this run
    pub processed: usize,
    /// Items skipped because the ledger already had them
    pub skipped: usize,
    pub no_records: usize,
    pub with_observations: usize,
    pub page_failures: usize,
    pub failed_positions: usize,
}

impl PassSummary {
    fn record(&mut self, entry: &LedgerEntry) {
        self.processed += 1;
        if entry.is_page_failure() {
            self.page_failures += 1;
        } else if entry.terminal_state == TerminalState::NoRecords {
            self.no_records += 1;
        }
        if entry.has_observations() {
            self.with_observations += 1;
        }
        self.failed_positions += entry.positions.failed_indices().len();
    }
}

/// A worker's pass over its work items
///
/// The session owns its portal and ledger; nothing is shared between
/// sessions, so several rounds can run in one process.
pub struct HarvestSession<P: Portal, L: Ledger> {
    portal: P,
    ledger: L,
    crawler: ListingCrawler,
    settings: SessionSettings,
    done: HashSet<u64>,
    stop: Arc<AtomicBool>,
}

impl<P: Portal, L: Ledger> HarvestSession<P, L> {
    /// Creates a session, loading the ledger's done set
    pub fn new(
        portal: P,
        ledger: L,
        crawler: ListingCrawler,
        settings: SessionSettings,
    ) -> Result<Self, HarvestError> {
        let done = ledger.load_done_set()?;
        if !done.is_empty() {
            tracing::info!("Resuming: {} items already in ledger", done.len());
        }

        Ok(Self {
            portal,
            ledger,
            crawler,
            settings,
            done,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Uses `stop` as the interruption flag; it is checked before each item
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn is_done(&self, row_index: u64) -> bool {
        self.done.contains(&row_index)
    }

    /// Processes every work item not yet in the ledger
    ///
    /// Returns `HarvestError::Interrupted` if the stop flag was raised; the
    /// item in progress is always completed and appended first. Ledger
    /// append failures are fatal.
    pub async fn run(&mut self, work: &[WorkItem]) -> Result<PassSummary, HarvestError> {
        let mut summary = PassSummary::default();
        let pending = work
            .iter()
            .filter(|w| !self.done.contains(&w.item.row_index))
            .count();
        tracing::info!(
            "Session starting: {} work items, {} pending",
            work.len(),
            pending
        );

        let start_time = Instant::now();

        for work_item in work {
            if self.done.contains(&work_item.item.row_index) {
                summary.skipped += 1;
                continue;
            }

            if self.stop.load(Ordering::SeqCst) {
                tracing::warn!("Stop requested; {} items processed", summary.processed);
                return Err(HarvestError::Interrupted {
                    processed: summary.processed,
                });
            }

            let entry = self.process_item(work_item).await?;
            self.ledger.append(&entry)?;
            self.done.insert(entry.row_index);
            log_completion(&entry);
            summary.record(&entry);

            if summary.processed % 10 == 0 {
                let elapsed = start_time.elapsed();
                let rate = summary.processed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    "Progress: {}/{} items, {} page failures, {:.2} items/sec",
                    summary.processed,
                    pending,
                    summary.page_failures,
                    rate
                );
            }

            if self.settings.recycle_every > 0
                && summary.processed % self.settings.recycle_every as usize == 0
            {
                tracing::debug!("Recycling portal after {} items", summary.processed);
                if let Err(e) = self.portal.recycle().await {
                    tracing::warn!("Failed to recycle portal: {}", e);
                }
            }

            tokio::time::sleep(self.settings.item_delay).await;
        }

        tracing::info!(
            "Session finished in {:?}: {} processed, {} skipped, {} no records, {} page failures, {} failed positions",
            start_time.elapsed(),
            summary.processed,
            summary.skipped,
            summary.no_records,
            summary.page_failures,
            summary.failed_positions
        );

        Ok(summary)
    }

    /// Runs one item through `Navigating -> {NoRecords, HasRecords} -> Done`
    async fn process_item(&mut self, work: &WorkItem) -> Result<LedgerEntry, HarvestError> {
        let item = &work.item;
        let phase = ItemPhase::Navigating;

        if item.item_id.trim().is_empty() {
            phase.transition(ItemPhase::Done)?;
            return Ok(failure_entry(work, "empty item id"));
        }

        // Nothing left to refetch: carry the row into this round unchanged
        if let Some(target) = &work.target {
            if target.failed.is_empty() || target.positions.is_empty() {
                phase.transition(ItemPhase::Done)?;
                return Ok(LedgerEntry::with_positions(item, target.positions.clone()));
            }
        }

        if let Err(e) = self.navigate(&item.item_id).await {
            phase.transition(ItemPhase::Done)?;
            return Ok(failure_entry(
                work,
                format!(
                    "navigation failed after {} attempts: {}",
                    self.settings.navigation_attempts.max(1),
                    e
                ),
            ));
        }

        tokio::time::sleep(self.settings.settle).await;

        let no_records = detect_no_records(
            &mut self.portal,
            &self.settings.no_records_marker,
            self.settings.confirm_pause,
        )
        .await;

        if no_records {
            match &work.target {
                None => {
                    phase
                        .transition(ItemPhase::NoRecords)?
                        .transition(ItemPhase::Done)?;
                    return Ok(LedgerEntry::no_records(item));
                }
                Some(target) => {
                    tracing::warn!(
                        "{}: listing reports no records but {} positions were recorded; keeping them",
                        item.item_id,
                        target.positions.len()
                    );
                    phase
                        .transition(ItemPhase::HasRecords)?
                        .transition(ItemPhase::Done)?;
                    return Ok(LedgerEntry::with_positions(item, target.positions.clone()));
                }
            }
        }

        let phase = phase.transition(ItemPhase::HasRecords)?;
        let plan = match &work.target {
            None => CrawlPlan::Full,
            Some(target) => CrawlPlan::Targeted {
                known: &target.positions,
                failed: &target.failed,
            },
        };
        let crawled = self
            .crawler
            .crawl(&mut self.portal, &item.item_id, plan)
            .await;
        phase.transition(ItemPhase::Done)?;

        Ok(match crawled {
            Ok(positions) => LedgerEntry::with_positions(item, positions),
            Err(e) => failure_entry(work, format!("pagination failed: {}", e)),
        })
    }

    /// Loads the listing, retrying with exponential backoff
    async fn navigate(&mut self, item_id: &str) -> Result<(), PortalError> {
        let attempts = self.settings.navigation_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.portal.open_listing(item_id).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.settings.backoff_delay(attempt);
                    tracing::warn!(
                        "{}: navigation attempt {}/{} failed: {}; retrying in {:?}",
                        item_id,
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Entry for a navigation-level failure
///
/// A full harvest records no positions. A refetch keeps the positions it was
/// given, so the failure never loses what an earlier pass found.
fn failure_entry(work: &WorkItem, error: impl Into<String>) -> LedgerEntry {
    match &work.target {
        None => LedgerEntry::page_failure(&work.item, error),
        Some(target) => LedgerEntry {
            error: error.into(),
            ..LedgerEntry::with_positions(&work.item, target.positions.clone())
        },
    }
}

fn log_completion(entry: &LedgerEntry) {
    let failed = entry.positions.failed_indices();
    if entry.is_page_failure() {
        tracing::info!(
            "row {} {}: {} observations, error: {}",
            entry.row_index,
            entry.item_id,
            entry.observation_count(),
            entry.error
        );
    } else if entry.terminal_state == TerminalState::NoRecords {
        tracing::info!("row {} {}: no records", entry.row_index, entry.item_id);
    } else {
        tracing::info!(
            "row {} {}: {} observations, failed positions {:?}",
            entry.row_index,
            entry.item_id,
            entry.observation_count(),
            failed
        );
    }
}
