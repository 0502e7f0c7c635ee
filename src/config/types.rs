use serde::Deserialize;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub fetcher: FetcherConfig,
    pub catalog: CatalogConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub names: NamesConfig,
}

/// Adaptive fetcher behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Delay the fetcher starts with and returns to after a quiet period (milliseconds)
    #[serde(rename = "initial-delay")]
    pub initial_delay: u64,

    /// Floor the delay decays toward on success (milliseconds)
    #[serde(rename = "min-delay")]
    pub min_delay: u64,

    /// Ceiling the delay grows toward on failure (milliseconds)
    #[serde(rename = "max-delay")]
    pub max_delay: u64,

    /// Factor applied to the delay on every rate-limit or network failure
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,

    /// Attempts per fetch before giving up
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound of the random jitter added to retry waits (milliseconds)
    #[serde(rename = "jitter-max", default = "default_jitter_max")]
    pub jitter_max: u64,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// TCP connect timeout (seconds)
    #[serde(rename = "connect-timeout", default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Overrides the built-in browser user agent
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,
}

/// Catalog location and seeds
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Catalog root; listing pages sit at `<base-url><group>/<subgroup>/`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Frame number appended to detail page URLs as `?frame_no=`
    #[serde(rename = "frame-number", default)]
    pub frame_number: Option<String>,

    /// Listing URLs enqueued as pending at start
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory downloaded diagram images are written to
    #[serde(rename = "images-dir")]
    pub images_dir: String,
}

/// Name normalizer configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamesConfig {
    /// Boilerplate phrases removed from subgroup and diagram names
    #[serde(rename = "strip-phrases", default)]
    pub strip_phrases: Vec<String>,
}

fn default_max_retries() -> u32 {
    5
}

fn default_jitter_max() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            initial_delay: 1000,
            min_delay: 500,
            max_delay: 60_000,
            backoff_multiplier: 2.0,
            max_retries: default_max_retries(),
            jitter_max: default_jitter_max(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: None,
        }
    }
}
