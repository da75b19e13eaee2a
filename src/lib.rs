//! Malayalam Crawler - batch web crawler for Malayalam text
//!
//! Fetches a list of URLs through a rotating proxy pool, converts each page
//! to markdown, drops near-duplicates by TF-IDF similarity and writes the
//! rest to disk.

pub mod cache;
pub mod config;
pub mod content;
pub mod crawler;
pub mod error;
pub mod logging;
pub mod output;
pub mod proxy;
pub mod tui;

pub use cache::{CacheMode, CachedPage, PageCache};
pub use config::CrawlerConfig;
pub use content::{ContentProcessor, ProcessedPage, Verdict};
pub use crawler::*;
pub use error::{CrawlError, CrawlResult};
pub use output::OutputWriter;
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
