//! Concurrent proxy validation

use crate::proxy::geo::GeoLocator;
use crate::proxy::models::{Proxy, ProxyCheckResult};
use crate::Result;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 10;

/// Default URL to test proxies against
const DEFAULT_TEST_URL: &str = "http://httpbin.org/ip";

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each proxy check
    pub timeout: Duration,
    /// Number of concurrent checks
    pub concurrency: usize,
    /// URL to test proxies against
    pub test_url: String,
    /// Path to MMDB file for geolocation (optional)
    pub mmdb_path: Option<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            test_url: DEFAULT_TEST_URL.to_string(),
            mmdb_path: None,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_mmdb_path(mut self, path: String) -> Self {
        self.mmdb_path = Some(path);
        self
    }
}

/// Probes proxies by fetching a test URL through them
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    geo_locator: Option<GeoLocator>,
}

impl ProxyChecker {
    pub fn new() -> Self {
        Self::with_config(CheckerConfig::default())
    }

    pub fn with_config(config: CheckerConfig) -> Self {
        let geo_locator = config
            .mmdb_path
            .as_ref()
            .and_then(|path| GeoLocator::from_path(path).ok());

        Self { config, geo_locator }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check a single proxy
    pub async fn check_proxy(&self, proxy: &Proxy) -> ProxyCheckResult {
        let start = Instant::now();

        let client = match client_for(proxy, self.config.timeout) {
            Ok(client) => client,
            Err(e) => return ProxyCheckResult::failed(proxy.clone(), e.to_string()),
        };

        let response = tokio::time::timeout(
            self.config.timeout,
            client.get(&self.config.test_url).send(),
        )
        .await;

        let result = match response {
            Ok(Ok(response)) if response.status().is_success() => {
                let elapsed = start.elapsed().as_millis() as u64;
                let mut result = ProxyCheckResult::working(proxy.clone(), elapsed);
                if let Some(ref geo) = self.geo_locator {
                    if let Ok(location) = geo.lookup(&proxy.host) {
                        result = result.with_geo_location(location);
                    }
                }
                result
            }
            Ok(Ok(response)) => ProxyCheckResult::failed(
                proxy.clone(),
                format!("HTTP status: {}", response.status()),
            ),
            Ok(Err(e)) => ProxyCheckResult::failed(proxy.clone(), e.to_string()),
            Err(_) => ProxyCheckResult::timeout(proxy.clone()),
        };

        debug!(proxy = %proxy, status = ?result.status, "Proxy checked");
        result
    }

    /// Check multiple proxies, at most `concurrency` at a time
    pub async fn check_proxies(&self, proxies: Vec<Proxy>) -> Vec<ProxyCheckResult> {
        stream::iter(proxies)
            .map(|proxy| async move { self.check_proxy(&proxy).await })
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<_>>()
            .await
    }

    /// Check proxies and separate into good and bad results
    pub async fn check_and_separate(
        &self,
        proxies: Vec<Proxy>,
    ) -> (Vec<ProxyCheckResult>, Vec<ProxyCheckResult>) {
        let total = proxies.len();
        let results = self.check_proxies(proxies).await;
        let (good, bad): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_working());

        info!(total, good = good.len(), bad = bad.len(), "Proxy check finished");
        (good, bad)
    }

    /// Only the proxies that answered, fastest first
    pub async fn working_proxies(&self, proxies: Vec<Proxy>) -> Vec<Proxy> {
        let (mut good, _) = self.check_and_separate(proxies).await;
        good.sort_by_key(|r| r.response_time_ms.unwrap_or(u64::MAX));
        good.into_iter().map(|r| r.proxy).collect()
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a reqwest client routed through `proxy`
pub fn client_for(proxy: &Proxy, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .proxy(ReqwestProxy::all(proxy.url())?)
        .timeout(timeout)
        .build()?;

    Ok(client)
}
