//! Harvesting passes
//!
//! This module contains the core harvesting logic, including:
//! - Partitioning the application list across workers
//! - Walking a paginated listing into a position-indexed artifact list
//! - The per-worker session with resume, backoff and pacing
//! - Building work for page and download retry rounds

mod listing;
mod partition;
mod retry;
mod session;

pub use listing::{detect_no_records, CrawlPlan, ListingCrawler};
pub use partition::{shard_range, ShardSpec};
pub use retry::{
    download_failure_work, page_failure_work, round_ledger_path, round_ledger_paths, shard_work,
    validate_round_name, PAGE_RETRY_ROUND,
};
pub use session::{HarvestSession, PassSummary, RefetchTarget, SessionSettings, WorkItem};

use crate::config::Config;
use crate::ledger::CsvLedger;
use crate::portal::{ArtifactStore, HttpPortal};
use crate::reconcile::{load_download_failures, load_page_failures};
use crate::source::{load_items, shard_items};
use crate::HarvestError;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Builds the listing crawler described by `config`
///
/// One resolution may take the resolve timeout plus the download timeout.
pub fn build_crawler(config: &Config) -> ListingCrawler {
    ListingCrawler::new(
        ArtifactStore::new(&config.output.artifact_dir),
        config.timeouts.resolve() + config.timeouts.download(),
        Duration::from_millis(config.timeouts.page_advance),
        config.session.skip_existing_artifacts,
    )
}

/// Runs the initial pass for one worker
///
/// Writes `{ledger-dir}/{ledger-prefix}_{worker}.csv`, resuming it if it
/// already exists.
///
/// # Example
///
/// ```no_run
/// use objection_harvest::config::load_config;
/// use objection_harvest::crawler::{run_harvest, ShardSpec};
/// use std::path::Path;
/// use std::sync::atomic::AtomicBool;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let shard = ShardSpec::new(0, 4)?;
/// run_harvest(&config, shard, Arc::new(AtomicBool::new(false))).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: &Config,
    shard: ShardSpec,
    stop: Arc<AtomicBool>,
) -> Result<PassSummary, HarvestError> {
    let records = load_items(&config.source)?;
    let work: Vec<WorkItem> = shard_items(&records, shard)
        .into_iter()
        .map(WorkItem::full)
        .collect();

    let ledger = CsvLedger::for_worker(
        &config.output.ledger_dir,
        &config.output.ledger_prefix,
        shard.worker_id,
    );
    run_pass(config, ledger, &work, stop).await
}

/// Re-harvests the applications of a page failure list
///
/// Each page round writes its own ledgers named after `round`, so a later
/// round over the failures that survived an earlier one starts fresh. A
/// missing or unreadable worklist means there is nothing to do.
pub async fn run_page_retry(
    config: &Config,
    round: &str,
    worklist: &Path,
    shard: ShardSpec,
    stop: Arc<AtomicBool>,
) -> Result<PassSummary, HarvestError> {
    validate_round_name(round)?;
    let failures = load_page_failures(worklist);
    if failures.is_empty() {
        tracing::info!("No page failures to retry");
        return Ok(PassSummary::default());
    }

    let work = shard_work(page_failure_work(&failures), shard);
    let ledger = CsvLedger::new(round_ledger_path(&config.output.ledger_dir, round, shard));
    run_pass(config, ledger, &work, stop).await
}

/// Refetches the failed positions of a download failure list
pub async fn run_download_retry(
    config: &Config,
    round: &str,
    worklist: &Path,
    shard: ShardSpec,
    stop: Arc<AtomicBool>,
) -> Result<PassSummary, HarvestError> {
    validate_round_name(round)?;
    let failures = load_download_failures(worklist);
    if failures.is_empty() {
        tracing::info!("No download failures to retry");
        return Ok(PassSummary::default());
    }

    let work = shard_work(download_failure_work(&failures), shard);
    let ledger = CsvLedger::new(round_ledger_path(&config.output.ledger_dir, round, shard));
    run_pass(config, ledger, &work, stop).await
}

async fn run_pass(
    config: &Config,
    ledger: CsvLedger,
    work: &[WorkItem],
    stop: Arc<AtomicBool>,
) -> Result<PassSummary, HarvestError> {
    tracing::info!("Writing ledger {}", ledger.path().display());

    let crawler = build_crawler(config);
    crawler.store().ensure_root()?;
    let portal = HttpPortal::new(&config.portal, &config.timeouts)?;

    let mut session =
        HarvestSession::new(portal, ledger, crawler, SessionSettings::from_config(config))?
            .with_stop_flag(stop);
    session.run(work).await
}
