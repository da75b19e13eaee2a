//! SQLite page cache
//!
//! Stores fetched page bodies keyed by URL so a rerun can skip the network.

use crate::error::{CrawlError, CrawlResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY NOT NULL,
    status INTEGER NOT NULL,
    body TEXT NOT NULL,
    fetched_at TEXT NOT NULL
)
"#;

/// How the crawler uses the page cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Ignore the cache completely
    #[default]
    Bypass,
    /// Serve cached pages when present, store fresh ones
    UseCache,
    /// Always fetch, then refresh the cache
    UpdateCache,
}

impl CacheMode {
    pub fn reads(&self) -> bool {
        matches!(self, CacheMode::UseCache)
    }

    pub fn writes(&self) -> bool {
        matches!(self, CacheMode::UseCache | CacheMode::UpdateCache)
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::Bypass => write!(f, "bypass"),
            CacheMode::UseCache => write!(f, "use_cache"),
            CacheMode::UpdateCache => write!(f, "update_cache"),
        }
    }
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bypass" => Ok(CacheMode::Bypass),
            "use_cache" => Ok(CacheMode::UseCache),
            "update_cache" => Ok(CacheMode::UpdateCache),
            other => Err(format!(
                "Invalid cache mode: {}. Use: bypass, use_cache, update_cache",
                other
            )),
        }
    }
}

/// A page body as stored in the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl CachedPage {
    pub fn new(url: String, status: u16, body: String) -> Self {
        Self {
            url,
            status,
            body,
            fetched_at: Utc::now(),
        }
    }
}

/// SQLite-backed page store
#[derive(Debug, Clone)]
pub struct PageCache {
    pool: SqlitePool,
}

impl PageCache {
    /// Open (or create) the cache database at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> CrawlResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    /// A cache living only as long as this value
    pub async fn in_memory() -> CrawlResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> CrawlResult<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn get(&self, url: &str) -> CrawlResult<Option<CachedPage>> {
        let row = sqlx::query("SELECT url, status, body, fetched_at FROM pages WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            debug!(url, "Cache miss");
            return Ok(None);
        };

        let status: i64 = row.try_get("status")?;
        Ok(Some(CachedPage {
            url: row.try_get("url")?,
            status: u16::try_from(status)
                .map_err(|_| CrawlError::InvalidInput(format!("bad cached status {}", status)))?,
            body: row.try_get("body")?,
            fetched_at: row.try_get("fetched_at")?,
        }))
    }

    pub async fn put(&self, page: &CachedPage) -> CrawlResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pages (url, status, body, fetched_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                status = excluded.status,
                body = excluded.body,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&page.url)
        .bind(i64::from(page.status))
        .bind(&page.body)
        .bind(page.fetched_at)
        .execute(&self.pool)
        .await?;

        debug!(url = %page.url, bytes = page.body.len(), "Cached page");
        Ok(())
    }

    pub async fn len(&self) -> CrawlResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> CrawlResult<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_mode_flags() {
        assert!(!CacheMode::Bypass.reads());
        assert!(!CacheMode::Bypass.writes());
        assert!(CacheMode::UseCache.reads());
        assert!(CacheMode::UseCache.writes());
        assert!(!CacheMode::UpdateCache.reads());
        assert!(CacheMode::UpdateCache.writes());
    }

    #[test]
    fn test_cache_mode_from_str() {
        assert_eq!("use-cache".parse(), Ok(CacheMode::UseCache));
        assert_eq!("UPDATE_CACHE".parse(), Ok(CacheMode::UpdateCache));
        assert!("sometimes".parse::<CacheMode>().is_err());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = PageCache::in_memory().await.unwrap();
        assert!(cache.is_empty().await.unwrap());
        assert!(cache.get("https://ml.example/a").await.unwrap().is_none());

        let page = CachedPage::new(
            "https://ml.example/a".to_string(),
            200,
            "<p>മലയാളം</p>".to_string(),
        );
        cache.put(&page).await.unwrap();

        let loaded = cache.get("https://ml.example/a").await.unwrap().unwrap();
        assert_eq!(loaded.status, 200);
        assert_eq!(loaded.body, "<p>മലയാളം</p>");
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let cache = PageCache::in_memory().await.unwrap();
        let url = "https://ml.example/b".to_string();

        cache
            .put(&CachedPage::new(url.clone(), 200, "old".to_string()))
            .await
            .unwrap();
        cache
            .put(&CachedPage::new(url.clone(), 200, "new".to_string()))
            .await
            .unwrap();

        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(cache.get(&url).await.unwrap().unwrap().body, "new");
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_cache.db");
        {
            let cache = PageCache::open(&path).await.unwrap();
            cache
                .put(&CachedPage::new("https://x.example".to_string(), 200, "x".to_string()))
                .await
                .unwrap();
            cache.close().await;
        }

        let reopened = PageCache::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
    }
}
