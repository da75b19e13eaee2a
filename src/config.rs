//! Crawler configuration

use crate::cache::CacheMode;
use crate::error::{CrawlError, CrawlResult};
use crate::proxy::RotationStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of URLs fetched concurrently
const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of attempts per URL
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default similarity above which a page counts as a duplicate
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Default consecutive failures before a proxy is dropped
const DEFAULT_MAX_PROXY_FAILURES: u32 = 3;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "MalayalamCrawler/1.0";

/// Configuration for a crawl run
///
/// Every field has a default, so a JSON config file only needs the keys it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// JSON file holding the URLs to crawl
    pub input_json_path: PathBuf,
    /// Root directory for reports and the page cache
    pub output_dir: PathBuf,
    /// Directory for the extracted markdown files
    pub markdown_dir: PathBuf,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Number of URLs fetched concurrently
    pub batch_size: usize,
    /// First URL index to crawl (inclusive)
    pub start_index: usize,
    /// Last URL index to crawl (exclusive)
    pub end_index: Option<usize>,
    /// File with one proxy per line
    pub proxy_list_path: Option<PathBuf>,
    /// How the next proxy is chosen
    pub rotation: RotationStrategy,
    /// Consecutive failures after which a proxy is evicted
    pub max_proxy_failures: u32,
    /// Page cache behaviour
    pub cache_mode: CacheMode,
    /// Headers merged over the built-in Malayalam headers
    pub custom_headers: HashMap<String, String>,
    /// Cosine similarity above which a page is a duplicate
    pub similarity_threshold: f64,
    /// Total attempts per URL
    pub max_retries: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Delay after the first failed attempt, in milliseconds
    pub backoff_base_ms: u64,
    /// Upper bound for the retry delay, in seconds
    pub max_backoff_secs: u64,
    /// Minimum share of Malayalam letters for a page to be kept
    pub min_malayalam_ratio: f64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        let mut custom_headers = HashMap::new();
        custom_headers.insert("Accept-Language".to_string(), "ml-IN,ml;q=0.9".to_string());
        custom_headers.insert("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string());

        Self {
            input_json_path: PathBuf::from("malayalam_urls.json"),
            output_dir: PathBuf::from("output"),
            markdown_dir: PathBuf::from("malayalam_output"),
            log_dir: PathBuf::from("logs"),
            batch_size: DEFAULT_BATCH_SIZE,
            start_index: 0,
            end_index: None,
            proxy_list_path: Some(PathBuf::from("good_proxies.txt")),
            rotation: RotationStrategy::RoundRobin,
            max_proxy_failures: DEFAULT_MAX_PROXY_FAILURES,
            cache_mode: CacheMode::Bypass,
            custom_headers,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            backoff_base_ms: 1000,
            max_backoff_secs: 60,
            min_malayalam_ratio: 0.0,
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> CrawlResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_json_path = path.into();
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_markdown_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.markdown_dir = path.into();
        self
    }

    pub fn with_log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_dir = path.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_range(mut self, start: usize, end: Option<usize>) -> Self {
        self.start_index = start;
        self.end_index = end;
        self
    }

    pub fn with_proxy_list(mut self, path: Option<PathBuf>) -> Self {
        self.proxy_list_path = path;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationStrategy) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self.max_backoff_secs = max.as_secs();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.custom_headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_min_malayalam_ratio(mut self, ratio: f64) -> Self {
        self.min_malayalam_ratio = ratio;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// SQLite file backing the page cache
    pub fn cache_db_path(&self) -> PathBuf {
        self.output_dir.join("page_cache.db")
    }

    pub fn validate(&self) -> CrawlResult<()> {
        if self.batch_size == 0 {
            return Err(CrawlError::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(CrawlError::Config("max_retries must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CrawlError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_malayalam_ratio) {
            return Err(CrawlError::Config(format!(
                "min_malayalam_ratio must be within [0, 1], got {}",
                self.min_malayalam_ratio
            )));
        }
        if let Some(end) = self.end_index {
            if end < self.start_index {
                return Err(CrawlError::Config(format!(
                    "end_index {} is before start_index {}",
                    end, self.start_index
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CrawlerConfig::default();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.cache_mode, CacheMode::Bypass);
        assert_eq!(config.rotation, RotationStrategy::RoundRobin);
        assert_eq!(
            config.custom_headers.get("User-Agent").map(String::as_str),
            Some(DEFAULT_USER_AGENT)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CrawlerConfig::new()
            .with_batch_size(4)
            .with_range(2, Some(8))
            .with_max_retries(5)
            .with_similarity_threshold(0.9)
            .with_timeout(Duration::from_secs(10))
            .with_cache_mode(CacheMode::UseCache);

        assert_eq!(config.batch_size, 4);
        assert_eq!(config.start_index, 2);
        assert_eq!(config.end_index, Some(8));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.similarity_threshold, 0.9);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.cache_mode, CacheMode::UseCache);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"batch_size": 3, "cache_mode": "update_cache", "rotation": "weighted"}"#;
        let config: CrawlerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.cache_mode, CacheMode::UpdateCache);
        assert_eq!(config.rotation, RotationStrategy::Weighted);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_config_validation() {
        assert!(CrawlerConfig::new().with_batch_size(0).validate().is_err());
        assert!(CrawlerConfig::new().with_max_retries(0).validate().is_err());
        assert!(CrawlerConfig::new()
            .with_similarity_threshold(1.5)
            .validate()
            .is_err());
        assert!(CrawlerConfig::new()
            .with_range(5, Some(2))
            .validate()
            .is_err());
    }
}
