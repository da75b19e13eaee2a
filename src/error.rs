//! Error types for crawling operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),
}

impl CrawlError {
    /// Whether another attempt at the same URL may succeed.
    ///
    /// Transport failures, timeouts, 407, 408, 429 and 5xx responses are retried.
    /// Other client errors are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlError::Http(e) => !e.is_builder() && !e.is_redirect(),
            CrawlError::Timeout(_) => true,
            CrawlError::Status { status, .. } => {
                matches!(*status, 407 | 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }

    /// Whether the failure was caused by the proxy rather than the origin.
    ///
    /// Any status other than 407 was relayed from the origin, so the proxy
    /// did its job.
    pub fn is_proxy_fault(&self) -> bool {
        match self {
            CrawlError::Status { status, .. } => *status == 407,
            _ => true,
        }
    }
}

pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> CrawlError {
        CrawlError::Status {
            status: code,
            url: "https://example.com".to_string(),
        }
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
    }

    #[test]
    fn test_client_errors_are_final() {
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!CrawlError::InvalidInput("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_proxy_fault() {
        assert!(status(407).is_proxy_fault());
        assert!(status(407).is_retryable());
        assert!(!status(404).is_proxy_fault());
        assert!(!status(503).is_proxy_fault());
        assert!(CrawlError::Timeout(30).is_proxy_fault());
    }

    #[test]
    fn test_timeout_is_retryable() {
        assert!(CrawlError::Timeout(30).is_retryable());
    }
}
