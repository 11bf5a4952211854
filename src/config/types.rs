use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default endpoint serving one tournament's information page
pub const DEFAULT_ENDPOINT: &str = "https://ratings.fide.com/tournament_information.phtml";

/// Browser-like user agent; the source rejects obvious bot strings
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure for Tourney-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub crawler: CrawlerConfig,
    pub fetcher: FetcherConfig,
}

/// Work-list selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InputConfig {
    /// Explicit path to a newline-delimited id file
    pub path: Option<PathBuf>,

    /// Year of the monthly id list (used with `month` when `path` is unset)
    pub year: Option<i32>,

    /// Month of the monthly id list, 1-12
    pub month: Option<u32>,

    /// Base directory for monthly id lists and default outputs
    pub data_dir: PathBuf,

    /// Process only the first N ids (0 = all)
    pub limit: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: None,
            year: None,
            month: None,
            data_dir: PathBuf::from("data"),
            limit: 0,
        }
    }
}

/// Output destination
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Final output file; stdout when unset
    pub path: Option<PathBuf>,

    /// Suffix appended to the output path to name the checkpoint file
    pub checkpoint_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            checkpoint_suffix: ".checkpoint".to_string(),
        }
    }
}

/// Crawl engine behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers per pass
    pub concurrency: usize,

    /// Initial request rate (requests per second)
    pub initial_rate: f64,

    /// Retry passes after the initial pass
    pub max_retry_passes: u32,

    /// Checkpoint every N successes (0 disables checkpointing)
    pub checkpoint_interval: u64,

    /// Cooldown before retry pass k+1 is `base_delay_secs * 2^k`
    pub base_delay_secs: f64,

    /// Log a progress line every N processed outcomes
    pub progress_every: u64,

    /// Log every outcome with timing information
    pub show_timing: bool,

    /// Log the attempt distribution and per-attempt errors at the end
    pub verbose_errors: bool,

    /// Log average rate-limit wait, HTTP and parse times at the end
    pub profile: bool,
}

impl CrawlerConfig {
    /// Base cooldown as a `Duration`; invalid values collapse to zero
    pub fn base_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.base_delay_secs).unwrap_or(Duration::ZERO)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            initial_rate: 1.5,
            max_retry_passes: 3,
            checkpoint_interval: 100,
            base_delay_secs: 3.0,
            progress_every: 50,
            show_timing: false,
            verbose_errors: false,
            profile: false,
        }
    }
}

/// HTTP fetcher settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Page URL; the work item id is passed as the `id_param` query value
    pub endpoint: String,

    /// Query parameter carrying the work item id
    pub id_param: String,

    pub user_agent: String,

    /// Total request deadline in seconds
    pub timeout_secs: u64,

    pub connect_timeout_secs: u64,

    /// HTTP attempts per fetch before the item is reported as failed
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles for each further attempt
    pub retry_backoff_ms: u64,
}

impl FetcherConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            id_param: "event".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 45,
            connect_timeout_secs: 10,
            max_attempts: 3,
            retry_backoff_ms: 100,
        }
    }
}
