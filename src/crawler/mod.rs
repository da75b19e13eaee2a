//! Crawling Malayalam pages
//!
//! This module provides functionality for:
//! - Loading and slicing the URL list
//! - Fetching pages directly or through a proxy pool
//! - Running batches with bounded concurrency, retries and backoff
//! - Recording per-URL outcomes in a run report

pub mod dispatcher;
pub mod fetcher;
pub mod report;
pub mod retry;
pub mod urls;

pub use dispatcher::{CrawlDispatcher, CrawlEvent};
pub use fetcher::{build_headers, FetchedPage, PageFetcher};
pub use report::{CrawlReport, PageOutcome, PageResult};
pub use retry::RetryPolicy;
pub use urls::{load_urls, parse_urls, select_range};
