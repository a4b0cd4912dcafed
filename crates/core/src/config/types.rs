use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("file_management.db")
}

/// Data volume configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Root directory holding the `L2/`, `L3b/` and `L3m/` trees.
    #[serde(default = "default_data_root")]
    pub root: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

/// Remote granule catalog (NASA CMR) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Granules requested per catalog page (CMR caps this at 2000).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Mission letters queued when none are given on the command line.
    #[serde(default = "default_missions")]
    pub default_missions: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            provider: default_provider(),
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
            default_missions: default_missions(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://cmr.earthdata.nasa.gov/search/granules.umm_json".to_string()
}

fn default_provider() -> String {
    "OB_DAAC".to_string()
}

fn default_page_size() -> u32 {
    2000
}

fn default_timeout() -> u32 {
    30
}

fn default_missions() -> String {
    "atjns".to_string()
}

/// File retrieval configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// OB.DAAC application key appended to `getfile` URLs.
    #[serde(default)]
    pub appkey: Option<String>,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            appkey: None,
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

fn default_retrieval_timeout() -> u32 {
    600
}

/// Download scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloaderConfig {
    /// Maximum on-disk footprint of the data root before downloads block.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
    #[serde(default = "default_quota_poll_interval_ms")]
    pub quota_poll_interval_ms: u64,
    /// Number of quota polls before the run gives up.
    #[serde(default = "default_poll_attempts")]
    pub quota_poll_attempts: u32,
    /// Products fetched from the store per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota_bytes(),
            quota_poll_interval_ms: default_quota_poll_interval_ms(),
            quota_poll_attempts: default_poll_attempts(),
            batch_size: default_batch_size(),
        }
    }
}

impl DownloaderConfig {
    pub fn with_quota_bytes(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn with_quota_poll(mut self, interval_ms: u64, attempts: u32) -> Self {
        self.quota_poll_interval_ms = interval_ms;
        self.quota_poll_attempts = attempts;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }
}

fn default_quota_bytes() -> u64 {
    10 * 1024_u64.pow(4)
}

fn default_quota_poll_interval_ms() -> u64 {
    2 * 60 * 60 * 1000
}

fn default_poll_attempts() -> u32 {
    12
}

fn default_batch_size() -> u32 {
    100
}

/// Processing scheduler and worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Spatial resolution passed to the binning and mapping stages.
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// Wait between scheduling attempts while no group is ready.
    #[serde(default = "default_stall_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Idle polls tolerated before the scheduler declares a stall.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Capacity of the task queue between the scheduler and the workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_l2bin_path")]
    pub l2bin_path: PathBuf,
    #[serde(default = "default_l3mapgen_path")]
    pub l3mapgen_path: PathBuf,
    /// Geophysical product extracted per product suite (e.g. `OC` → `chlor_a`).
    #[serde(default = "default_products")]
    pub products: HashMap<String, String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resolution: default_resolution(),
            poll_interval_ms: default_stall_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
            queue_capacity: default_queue_capacity(),
            l2bin_path: default_l2bin_path(),
            l3mapgen_path: default_l3mapgen_path(),
            products: default_products(),
        }
    }
}

impl ProcessorConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_poll(mut self, interval_ms: u64, attempts: u32) -> Self {
        self.poll_interval_ms = interval_ms;
        self.poll_attempts = attempts;
        self
    }

    /// Geophysical product name for a product suite, falling back to the suite itself.
    pub fn product_for_suite<'a>(&'a self, suite: &'a str) -> &'a str {
        self.products.get(suite).map(String::as_str).unwrap_or(suite)
    }
}

fn default_workers() -> usize {
    11
}

fn default_resolution() -> String {
    "1km".to_string()
}

fn default_stall_poll_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_queue_capacity() -> usize {
    64
}

fn default_l2bin_path() -> PathBuf {
    PathBuf::from("l2bin")
}

fn default_l3mapgen_path() -> PathBuf {
    PathBuf::from("l3mapgen")
}

fn default_products() -> HashMap<String, String> {
    HashMap::from([
        ("OC".to_string(), "chlor_a".to_string()),
        ("SST".to_string(), "sst".to_string()),
        ("SST4".to_string(), "sst4".to_string()),
    ])
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub database: DatabaseConfig,
    pub data: DataConfig,
    pub catalog: CatalogConfig,
    pub retrieval: SanitizedRetrievalConfig,
    pub downloader: DownloaderConfig,
    pub processor: ProcessorConfig,
    pub logging: LoggingConfig,
}

/// Retrieval config with the application key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRetrievalConfig {
    pub appkey_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            database: config.database.clone(),
            data: config.data.clone(),
            catalog: config.catalog.clone(),
            retrieval: SanitizedRetrievalConfig {
                appkey_configured: config.retrieval.appkey.is_some(),
                timeout_secs: config.retrieval.timeout_secs,
            },
            downloader: config.downloader.clone(),
            processor: config.processor.clone(),
            logging: config.logging.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("file_management.db"));
        assert_eq!(config.downloader.quota_bytes, 10 * 1024 * 1024 * 1024 * 1024);
        assert_eq!(config.downloader.quota_poll_attempts, 12);
        assert_eq!(config.processor.workers, 11);
        assert_eq!(config.processor.resolution, "1km");
        assert_eq!(config.catalog.default_missions, "atjns");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_product_for_suite() {
        let config = ProcessorConfig::default();
        assert_eq!(config.product_for_suite("OC"), "chlor_a");
        assert_eq!(config.product_for_suite("KD"), "KD");
    }

    #[test]
    fn test_sanitized_config_hides_appkey() {
        let mut config = Config::default();
        config.retrieval.appkey = Some("secret".to_string());

        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(sanitized.retrieval.appkey_configured);
        assert!(!json.contains("secret"));
    }
}
