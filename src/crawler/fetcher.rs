//! HTTP fetching, directly or through a proxy

use crate::config::{CrawlerConfig, DEFAULT_USER_AGENT};
use crate::error::{CrawlError, CrawlResult};
use crate::proxy::Proxy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Headers every request carries unless overridden
const MALAYALAM_HEADERS: &[(&str, &str)] = &[
    ("Accept-Language", "ml-IN,ml;q=0.9,en-US;q=0.8,en;q=0.7"),
    ("Content-Language", "ml"),
    ("User-Agent", DEFAULT_USER_AGENT),
];

/// A successfully fetched page body
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

/// Merge the built-in Malayalam headers with user overrides
pub fn build_headers(custom: &HashMap<String, String>) -> CrawlResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let pairs = MALAYALAM_HEADERS
        .iter()
        .map(|(k, v)| (*k, *v))
        .chain(custom.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CrawlError::Config(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| CrawlError::Config(format!("invalid value for {}: {}", name, e)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Fetches pages, keeping one client per proxy so connections are reused
pub struct PageFetcher {
    headers: HeaderMap,
    timeout: Duration,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

impl PageFetcher {
    pub fn new(config: &CrawlerConfig) -> CrawlResult<Self> {
        let headers = build_headers(&config.custom_headers)?;
        let timeout = config.timeout();
        let direct = Self::build_client(&headers, timeout, None)?;

        Ok(Self {
            headers,
            timeout,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn build_client(
        headers: &HeaderMap,
        timeout: Duration,
        proxy: Option<&Proxy>,
    ) -> CrawlResult<Client> {
        let mut builder = Client::builder()
            .default_headers(headers.clone())
            .timeout(timeout)
            .gzip(true);

        if let Some(proxy) = proxy {
            // HTTP proxies tunnel https:// targets through CONNECT
            builder = builder.proxy(ReqwestProxy::all(proxy.url())?);
        } else {
            builder = builder.no_proxy();
        }

        Ok(builder.build()?)
    }

    fn client(&self, proxy: Option<&Proxy>) -> CrawlResult<Client> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&proxy.to_full_string()) {
            return Ok(client.clone());
        }
        let client = Self::build_client(&self.headers, self.timeout, Some(proxy))?;
        clients.insert(proxy.to_full_string(), client.clone());
        Ok(client)
    }

    fn classify(&self, error: reqwest::Error) -> CrawlError {
        if error.is_timeout() {
            CrawlError::Timeout(self.timeout.as_secs())
        } else {
            CrawlError::Http(error)
        }
    }

    /// GET `url`; any non-2xx status is an error
    pub async fn fetch(&self, url: &str, proxy: Option<&Proxy>) -> CrawlResult<FetchedPage> {
        let client = self.client(proxy)?;
        let start = Instant::now();

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text_with_charset("utf-8")
            .await
            .map_err(|e| self.classify(e))?;
        let elapsed = start.elapsed();
        debug!(url, bytes = body.len(), ?elapsed, "Fetched page");

        Ok(FetchedPage {
            url: url.to_string(),
            status: status.as_u16(),
            body,
            elapsed,
        })
    }
}
