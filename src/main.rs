//! Objection-Harvest main entry point
//!
//! This is the command-line interface for the objection letter harvester.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use objection_harvest::config::{load_config_with_hash, Config};
use objection_harvest::crawler::{
    run_download_retry, run_harvest, run_page_retry, PassSummary, ShardSpec, PAGE_RETRY_ROUND,
};
use objection_harvest::ledger::read_ledger;
use objection_harvest::output::{export_sqlite, print_statistics, DatasetStatistics};
use objection_harvest::reconcile::{
    classify_failures, item_counts, merge, residual_download_failures, write_download_failures,
    write_item_counts, write_page_failures, CanonicalDataset, MergeLayer, OverrideKind,
    DOWNLOAD_FAILURES_FILE, PAGE_FAILURES_FILE,
};
use objection_harvest::source::load_all_items;
use objection_harvest::HarvestError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Objection-Harvest: a resumable harvester for planning objection letters
///
/// Harvests the third-party observation letters of every application in a
/// source list from a paginated planning portal, then classifies failures,
/// retries them and reconciles all passes into one dataset.
#[derive(Parser, Debug)]
#[command(name = "objection-harvest")]
#[command(version)]
#[command(about = "A resumable harvester for planning objection letters", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "harvest.toml", global = true)]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the initial pass for one worker
    Harvest {
        /// This worker's id, 0-based
        worker_id: u32,

        /// Total number of workers
        n_workers: u32,
    },

    /// Split ledgers into page and download failure worklists
    Classify {
        /// Ledgers to classify (default: every worker ledger in the ledger dir)
        ledgers: Vec<PathBuf>,

        /// Directory receiving the worklists (default: the ledger dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Re-harvest applications whose listing never loaded
    RetryPages {
        /// Name of this round; its ledgers are named after it
        #[arg(long, default_value = PAGE_RETRY_ROUND)]
        round: String,

        /// Page failure worklist (default: page_failures.csv in the ledger dir)
        #[arg(long)]
        worklist: Option<PathBuf>,

        #[command(flatten)]
        shard: ShardArgs,
    },

    /// Refetch the failed positions of a download failure worklist
    RetryDownloads {
        /// Name of this round; its ledgers are named after it
        #[arg(long)]
        round: String,

        /// Download failure worklist (default: download_failures.csv in the ledger dir)
        #[arg(long)]
        worklist: Option<PathBuf>,

        #[command(flatten)]
        shard: ShardArgs,
    },

    /// Reconcile the base pass with retry rounds into one dataset
    Merge {
        /// Base ledgers or a previously merged dataset
        #[arg(long, required = true, num_args = 1..)]
        base: Vec<PathBuf>,

        /// A download retry round, lowest precedence first; comma-separate
        /// the ledgers of one sharded round
        #[arg(long = "download-retry")]
        download_retry: Vec<String>,

        /// A page retry round, earliest first; overrides whole rows and is
        /// applied after every download round
        #[arg(long = "page-retry")]
        page_retry: Vec<String>,

        /// Where to write the merged dataset
        #[arg(long)]
        out: PathBuf,

        /// Also export the merged dataset to this SQLite file
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },

    /// Write the download failures still present in a dataset
    Residual {
        dataset: PathBuf,

        #[arg(long)]
        out: PathBuf,
    },

    /// Write per-application observation counts for the source list
    Counts {
        dataset: PathBuf,

        #[arg(long)]
        out: PathBuf,
    },

    /// Print statistics for a ledger or dataset
    Stats { dataset: PathBuf },

    /// Validate the configuration and print what would be harvested
    CheckConfig,
}

#[derive(Args, Debug)]
struct ShardArgs {
    /// This worker's id within the round
    #[arg(long, default_value_t = 0)]
    worker: u32,

    /// Number of workers sharing the round
    #[arg(long, default_value_t = 1)]
    workers: u32,
}

impl ShardArgs {
    fn spec(&self) -> Result<ShardSpec, HarvestError> {
        ShardSpec::new(self.worker, self.workers)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Harvest {
            worker_id,
            n_workers,
        } => {
            let shard = ShardSpec::new(worker_id, n_workers)?;
            let stop = install_stop_flag();
            finish_pass(run_harvest(&config, shard, stop).await)
        }

        Command::Classify { ledgers, out_dir } => {
            handle_classify(&config, ledgers, out_dir.as_deref())
        }

        Command::RetryPages {
            round,
            worklist,
            shard,
        } => {
            let worklist =
                worklist.unwrap_or_else(|| config.output.ledger_dir.join(PAGE_FAILURES_FILE));
            let stop = install_stop_flag();
            finish_pass(run_page_retry(&config, &round, &worklist, shard.spec()?, stop).await)
        }

        Command::RetryDownloads {
            round,
            worklist,
            shard,
        } => {
            if round == PAGE_RETRY_ROUND {
                bail!("round name '{}' is reserved for page retries", round);
            }
            let worklist =
                worklist.unwrap_or_else(|| config.output.ledger_dir.join(DOWNLOAD_FAILURES_FILE));
            let stop = install_stop_flag();
            finish_pass(run_download_retry(&config, &round, &worklist, shard.spec()?, stop).await)
        }

        Command::Merge {
            base,
            download_retry,
            page_retry,
            out,
            sqlite,
        } => handle_merge(
            &config_hash,
            &base,
            &download_retry,
            &page_retry,
            &out,
            sqlite.as_deref(),
        ),

        Command::Residual { dataset, out } => {
            let dataset = load_dataset(&dataset)?;
            let residual = residual_download_failures(dataset.entries());
            write_download_failures(&out, &residual)?;
            Ok(())
        }

        Command::Counts { dataset, out } => {
            let dataset = load_dataset(&dataset)?;
            let records = load_all_items(&config.source)?;
            let ids: Vec<&str> = records
                .iter()
                .map(|r| r.item_id.as_str())
                .filter(|id| !id.is_empty())
                .collect();
            let counts = item_counts(dataset.entries(), &ids[..]);
            write_item_counts(&out, &counts)?;
            println!("✓ Counts written to: {}", out.display());
            Ok(())
        }

        Command::Stats { dataset } => {
            let entries = read_ledger(&dataset)?;
            println!("Dataset: {}\n", dataset.display());
            print_statistics(&DatasetStatistics::from_entries(&entries));
            Ok(())
        }

        Command::CheckConfig => {
            handle_check_config(&config, &config_hash);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("objection_harvest=info,warn"),
            1 => EnvFilter::new("objection_harvest=debug,info"),
            2 => EnvFilter::new("objection_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Raises the returned flag on Ctrl-C; sessions stop before their next item
fn install_stop_flag() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing the current item");
            flag.store(true, Ordering::SeqCst);
        }
    });

    stop
}

fn finish_pass(result: Result<PassSummary, HarvestError>) -> anyhow::Result<()> {
    match result {
        Ok(summary) => {
            tracing::info!(
                "Pass complete: {} processed, {} skipped",
                summary.processed,
                summary.skipped
            );
            Ok(())
        }
        Err(HarvestError::Interrupted { processed }) => {
            tracing::warn!(
                "Interrupted after {} items; rerun the same command to resume",
                processed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Pass failed: {}", e);
            Err(e.into())
        }
    }
}

fn handle_classify(
    config: &Config,
    ledgers: Vec<PathBuf>,
    out_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let ledgers = if ledgers.is_empty() {
        discover_worker_ledgers(&config.output.ledger_dir, &config.output.ledger_prefix)?
    } else {
        ledgers
    };
    if ledgers.is_empty() {
        bail!(
            "no ledgers found in {}",
            config.output.ledger_dir.display()
        );
    }

    let mut entries = Vec::new();
    for path in &ledgers {
        let loaded = read_ledger(path)
            .with_context(|| format!("failed to read ledger {}", path.display()))?;
        tracing::info!("Read {} entries from {}", loaded.len(), path.display());
        entries.extend(loaded);
    }

    let lists = classify_failures(&entries);
    let out_dir = out_dir.unwrap_or(config.output.ledger_dir.as_path());
    write_page_failures(&out_dir.join(PAGE_FAILURES_FILE), &lists.page)?;
    write_download_failures(&out_dir.join(DOWNLOAD_FAILURES_FILE), &lists.download)?;
    Ok(())
}

/// Worker ledgers of the initial pass, `{prefix}_{n}.csv`, in worker order
fn discover_worker_ledgers(dir: &Path, prefix: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut found: Vec<(u32, PathBuf)> = Vec::new();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    for entry in read_dir {
        let path = entry?.path();
        let worker = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(prefix))
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(".csv"))
            .and_then(|id| id.parse::<u32>().ok());
        if let Some(worker) = worker {
            found.push((worker, path));
        }
    }

    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

fn handle_merge(
    config_hash: &str,
    base: &[PathBuf],
    download_retry: &[String],
    page_retry: &[String],
    out: &Path,
    sqlite: Option<&Path>,
) -> anyhow::Result<()> {
    let mut base_entries = Vec::new();
    for path in base {
        base_entries.extend(
            read_ledger(path).with_context(|| format!("failed to read base {}", path.display()))?,
        );
    }

    let mut layers = Vec::new();
    for round in download_retry {
        layers.push(MergeLayer::from_files(
            OverrideKind::PositionsOnly,
            &split_paths(round),
        )?);
    }
    for round in page_retry {
        layers.push(MergeLayer::from_files(
            OverrideKind::FullRow,
            &split_paths(round),
        )?);
    }

    let dataset = merge(base_entries, &layers);
    dataset
        .write(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("✓ Merged dataset written to: {}", out.display());

    if let Some(sqlite) = sqlite {
        export_sqlite(&dataset, sqlite, config_hash)?;
        println!("✓ SQLite export written to: {}", sqlite.display());
    }

    Ok(())
}

/// Splits a comma-separated list of ledger paths
fn split_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn load_dataset(path: &Path) -> anyhow::Result<CanonicalDataset> {
    CanonicalDataset::load(path).with_context(|| format!("failed to read dataset {}", path.display()))
}

/// Prints the validated configuration
fn handle_check_config(config: &Config, config_hash: &str) {
    println!("=== Objection-Harvest Configuration ===\n");

    println!("Portal:");
    println!("  Search endpoint: {}", config.portal.base_url);
    for (key, value) in &config.portal.search_params {
        println!("  Param: {}={}", key, value);
    }
    println!("  Item parameter: {}", config.portal.item_param);
    println!("  Indicator selector: {}", config.portal.indicator_selector);
    println!("  No-records marker: {}", config.portal.no_records_marker);

    println!("\nSession:");
    println!(
        "  Navigation attempts: {} (backoff from {}ms)",
        config.session.navigation_attempts, config.session.backoff_base_ms
    );
    println!("  Item delay: {}ms", config.session.item_delay_ms);
    println!("  Recycle every: {} items", config.session.recycle_every);
    println!(
        "  Skip existing artifacts: {}",
        config.session.skip_existing_artifacts
    );

    println!("\nSource:");
    println!("  File: {}", config.source.path.display());
    println!("  Item column: {}", config.source.item_column);
    if let (Some(column), Some(value)) = (&config.source.filter_column, &config.source.filter_value)
    {
        println!("  Filter: {} = {}", column, value);
    }

    println!("\nOutput:");
    println!("  Ledgers: {}", config.output.ledger_dir.display());
    println!("  Artifacts: {}", config.output.artifact_dir.display());
    println!("  Ledger prefix: {}", config.output.ledger_prefix);

    println!("\n✓ Configuration is valid (hash: {})", config_hash);
}
