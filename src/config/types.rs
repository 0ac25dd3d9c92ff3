use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}

/// Where the listing lives and how to read it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortalConfig {
    /// Search endpoint, without query string
    pub base_url: String,

    /// Static query parameters sent with every search
    #[serde(default)]
    pub search_params: Vec<(String, String)>,

    /// Query parameter that receives the application number
    #[serde(default = "default_item_param")]
    pub item_param: String,

    /// Optional query parameter used to ask for larger result pages
    #[serde(default)]
    pub page_size_param: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Element holding the "Showing x to y of z entries" text
    #[serde(default = "default_summary_selector")]
    pub summary_selector: String,

    /// Text inside the summary region meaning the search matched nothing
    #[serde(default = "default_no_records_marker")]
    pub no_records_marker: String,

    /// Elements marking one downloadable observation letter each
    #[serde(default = "default_indicator_selector")]
    pub indicator_selector: String,

    /// The "next page" control of the result table
    #[serde(default = "default_next_selector")]
    pub next_selector: String,

    /// Class present on the next control when there is no further page
    #[serde(default = "default_disabled_class")]
    pub disabled_class: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Timeouts and waits, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimeoutConfig {
    /// Upper bound for loading one listing page
    pub navigation: u64,

    /// Upper bound for resolving and fetching one artifact
    pub resolve: u64,

    /// HTTP timeout for the artifact body itself
    pub download: u64,

    /// Wait after navigation before reading the listing
    pub settle: u64,

    /// Pause between the two reads of the "no records" marker
    pub confirm_pause: u64,

    /// Wait after moving to the next listing page
    pub page_advance: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: 45_000,
            resolve: 15_000,
            download: 90_000,
            settle: 1_500,
            confirm_pause: 750,
            page_advance: 1_200,
        }
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation)
    }

    pub fn resolve(&self) -> Duration {
        Duration::from_millis(self.resolve)
    }

    pub fn download(&self) -> Duration {
        Duration::from_millis(self.download)
    }
}

/// Per-worker pacing and retry behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    /// Attempts at loading a listing before the item is recorded as a page failure
    pub navigation_attempts: u32,

    /// First backoff delay; doubled after every failed attempt
    pub backoff_base_ms: u64,

    /// Politeness delay between items
    pub item_delay_ms: u64,

    /// Rebuild the browsing context after this many items
    pub recycle_every: u32,

    /// Treat an artifact already on disk as fetched
    pub skip_existing_artifacts: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            navigation_attempts: 3,
            backoff_base_ms: 6_000,
            item_delay_ms: 1_250,
            recycle_every: 50,
            skip_existing_artifacts: true,
        }
    }
}

/// The application list being harvested
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Path to the source CSV
    pub path: PathBuf,

    #[serde(default = "default_item_column")]
    pub item_column: String,

    /// Keep only rows whose `filter_column` equals `filter_value`
    #[serde(default)]
    pub filter_column: Option<String>,

    #[serde(default)]
    pub filter_value: Option<String>,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding ledgers, worklists and merged datasets
    pub ledger_dir: PathBuf,

    /// Directory receiving downloaded letters
    pub artifact_dir: PathBuf,

    #[serde(default = "default_ledger_prefix")]
    pub ledger_prefix: String,
}

fn default_item_param() -> String {
    "Folder1_Ref".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_summary_selector() -> String {
    "#searchResult_info".to_string()
}

fn default_no_records_marker() -> String {
    "0 to 0 of 0".to_string()
}

fn default_indicator_selector() -> String {
    r#"span[aria-label*="3rd Party Observation"], span[aria-label*="Third Party Observation"]"#
        .to_string()
}

fn default_next_selector() -> String {
    "#searchResult_next".to_string()
}

fn default_disabled_class() -> String {
    "disabled".to_string()
}

fn default_user_agent() -> String {
    format!("objection-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_item_column() -> String {
    "Application Number".to_string()
}

fn default_ledger_prefix() -> String {
    "third_party_obs_worker".to_string()
}
