//! Per-URL outcomes and the run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::proxy::ProxyStats;

/// How a single URL ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageOutcome {
    Saved {
        path: PathBuf,
        /// Highest similarity to any earlier page
        similarity: f64,
    },
    Duplicate {
        similarity: f64,
        /// URL of the page it duplicates
        of: String,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl PageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PageOutcome::Saved { .. } => "saved",
            PageOutcome::Duplicate { .. } => "duplicate",
            PageOutcome::Skipped { .. } => "skipped",
            PageOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result of crawling one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub outcome: PageOutcome,
    /// Network attempts made; 0 when served from cache
    pub attempts: u32,
    pub from_cache: bool,
    /// Proxy used by the last attempt, if any
    pub proxy: Option<String>,
    pub title: Option<String>,
}

impl PageResult {
    pub fn new(url: impl Into<String>, outcome: PageOutcome) -> Self {
        Self {
            url: url.into(),
            outcome,
            attempts: 0,
            from_cache: false,
            proxy: None,
            title: None,
        }
    }
}

/// Summary of a whole crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_urls: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the run was stopped before every batch ran
    pub interrupted: bool,
    pub pages: Vec<PageResult>,
    pub proxies: Vec<ProxyStats>,
}

impl CrawlReport {
    pub fn new(total_urls: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            total_urls,
            saved: 0,
            duplicates: 0,
            skipped: 0,
            failed: 0,
            interrupted: false,
            pages: Vec::new(),
            proxies: Vec::new(),
        }
    }

    pub fn record(&mut self, result: PageResult) {
        match result.outcome {
            PageOutcome::Saved { .. } => self.saved += 1,
            PageOutcome::Duplicate { .. } => self.duplicates += 1,
            PageOutcome::Skipped { .. } => self.skipped += 1,
            PageOutcome::Failed { .. } => self.failed += 1,
        }
        self.pages.push(result);
    }

    pub fn processed(&self) -> usize {
        self.pages.len()
    }

    pub fn finish(&mut self, proxies: Vec<ProxyStats>) {
        self.finished_at = Some(Utc::now());
        self.proxies = proxies;
    }
}
