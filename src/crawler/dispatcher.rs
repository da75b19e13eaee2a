//! Batch crawl loop: bounded concurrency, proxy rotation, retries

use crate::cache::{CachedPage, PageCache};
use crate::config::CrawlerConfig;
use crate::content::{ContentProcessor, Verdict};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::report::{CrawlReport, PageOutcome, PageResult};
use crate::crawler::retry::RetryPolicy;
use crate::error::CrawlResult;
use crate::output::OutputWriter;
use crate::proxy::ProxyPool;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// Progress notifications for observers such as the terminal monitor
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    BatchStarted {
        batch: usize,
        total_batches: usize,
        size: usize,
    },
    Retrying {
        url: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    PageFinished(PageResult),
    Completed {
        interrupted: bool,
    },
}

/// Runs a crawl over a URL list in fixed-size batches
pub struct CrawlDispatcher {
    config: CrawlerConfig,
    fetcher: PageFetcher,
    pool: Arc<ProxyPool>,
    processor: Mutex<ContentProcessor>,
    writer: OutputWriter,
    cache: Option<PageCache>,
    retry: RetryPolicy,
    events: Option<UnboundedSender<CrawlEvent>>,
    stop: Arc<AtomicBool>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl CrawlDispatcher {
    pub fn new(config: CrawlerConfig, pool: Arc<ProxyPool>) -> CrawlResult<Self> {
        config.validate()?;
        let fetcher = PageFetcher::new(&config)?;
        let processor = Mutex::new(ContentProcessor::new(config.similarity_threshold));
        let writer = OutputWriter::new(&config);
        let retry = RetryPolicy::from_config(&config);

        Ok(Self {
            config,
            fetcher,
            pool,
            processor,
            writer,
            cache: None,
            retry,
            events: None,
            stop: Arc::new(AtomicBool::new(false)),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn with_cache(mut self, cache: PageCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Flag that stops the crawl once the running batch is done
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Highest number of simultaneous requests seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(events) = &self.events {
            // The observer may have gone away; the crawl carries on regardless.
            let _ = events.send(event);
        }
    }

    /// Crawl `urls` batch by batch and write the run report
    pub async fn run(&self, urls: &[String]) -> CrawlResult<CrawlReport> {
        self.writer.setup_directories()?;

        let mut report = CrawlReport::new(urls.len());
        let batch_size = self.config.batch_size;
        let total_batches = urls.len().div_ceil(batch_size);

        info!(
            run_id = %report.run_id,
            urls = urls.len(),
            batch_size,
            proxies = self.pool.len(),
            cache_mode = %self.config.cache_mode,
            "Starting crawl"
        );

        for (index, batch) in urls.chunks(batch_size).enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                warn!(remaining = urls.len() - report.processed(), "Crawl stopped early");
                report.interrupted = true;
                break;
            }

            info!("Processing batch {}/{}", index + 1, total_batches);
            self.emit(CrawlEvent::BatchStarted {
                batch: index + 1,
                total_batches,
                size: batch.len(),
            });

            let results = join_all(batch.iter().map(|url| self.crawl_url(url))).await;
            for result in results {
                self.emit(CrawlEvent::PageFinished(result.clone()));
                report.record(result);
            }
        }

        report.finish(self.pool.stats());
        self.writer.write_report(&report)?;
        self.emit(CrawlEvent::Completed {
            interrupted: report.interrupted,
        });

        info!(
            saved = report.saved,
            duplicates = report.duplicates,
            skipped = report.skipped,
            failed = report.failed,
            "Crawl finished"
        );
        Ok(report)
    }

    async fn cached_body(&self, url: &str) -> Option<String> {
        let cache = self.cache.as_ref().filter(|_| self.config.cache_mode.reads())?;
        match cache.get(url).await {
            Ok(page) => page.map(|p| p.body),
            Err(e) => {
                warn!(url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn store_in_cache(&self, url: &str, status: u16, body: &str) {
        let Some(cache) = self.cache.as_ref().filter(|_| self.config.cache_mode.writes()) else {
            return;
        };
        let page = CachedPage::new(url.to_string(), status, body.to_string());
        if let Err(e) = cache.put(&page).await {
            warn!(url, error = %e, "Failed to cache page");
        }
    }

    /// Crawl one URL to completion; never fails, the outcome says what happened
    pub async fn crawl_url(&self, url: &str) -> PageResult {
        if let Some(body) = self.cached_body(url).await {
            info!(url, "Serving page from cache");
            let mut result = self.process_page(url, &body);
            result.from_cache = true;
            return result;
        }

        let mut attempt = 0;
        loop {
            let proxy = self.pool.next();
            let started = Instant::now();

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            let fetched = self.fetcher.fetch(url, proxy.as_ref()).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match fetched {
                Ok(page) => {
                    if let Some(proxy) = &proxy {
                        self.pool.report_success(proxy, page.elapsed);
                    }
                    self.store_in_cache(url, page.status, &page.body).await;

                    let mut result = self.process_page(url, &page.body);
                    result.attempts = attempt + 1;
                    result.proxy = proxy.map(|p| p.to_string());
                    return result;
                }
                Err(e) => {
                    if let Some(proxy) = &proxy {
                        if e.is_proxy_fault() {
                            self.pool.report_failure(proxy);
                        } else {
                            self.pool.report_success(proxy, started.elapsed());
                        }
                    }

                    error!(
                        "Error processing {} (attempt {}/{}): {}",
                        url,
                        attempt + 1,
                        self.retry.max_attempts,
                        e
                    );

                    let retryable = e.is_retryable();
                    if !retryable || !self.retry.should_retry(attempt) {
                        if retryable {
                            error!("Max retries reached for {}", url);
                        }
                        let mut result =
                            PageResult::new(url, PageOutcome::Failed { error: e.to_string() });
                        result.attempts = attempt + 1;
                        result.proxy = proxy.map(|p| p.to_string());
                        return result;
                    }

                    let delay = self.retry.delay_for(attempt);
                    self.emit(CrawlEvent::Retrying {
                        url: url.to_string(),
                        attempt: attempt + 1,
                        delay,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Extract, filter and save a fetched body
    fn process_page(&self, url: &str, html: &str) -> PageResult {
        let page = ContentProcessor::process_html(html);
        let title = page.title.clone();

        let outcome = if page.is_empty() {
            warn!(url, "No content extracted");
            PageOutcome::Skipped {
                reason: "empty content".to_string(),
            }
        } else if page.malayalam_ratio < self.config.min_malayalam_ratio {
            info!(url, ratio = page.malayalam_ratio, "Skipped page with too little Malayalam");
            PageOutcome::Skipped {
                reason: format!(
                    "Malayalam ratio {:.2} below {:.2}",
                    page.malayalam_ratio, self.config.min_malayalam_ratio
                ),
            }
        } else {
            // Held until the page is on disk, so the index only ever holds saved pages
            let mut processor = self.processor.lock().unwrap_or_else(PoisonError::into_inner);

            match processor.verdict(&page.markdown) {
                Verdict::Duplicate { similarity, of } => {
                    info!(url, similarity, of = %of, "Skipped duplicate Malayalam content");
                    PageOutcome::Duplicate { similarity, of }
                }
                Verdict::Unique { max_similarity } => {
                    match self.writer.write_markdown(url, &page) {
                        Ok(path) => {
                            processor.add_content(url, &page.markdown);
                            info!(url, path = %path.display(), "Successfully saved Malayalam content");
                            PageOutcome::Saved {
                                path,
                                similarity: max_similarity,
                            }
                        }
                        Err(e) => {
                            error!(url, error = %e, "Failed to write markdown");
                            PageOutcome::Failed { error: e.to_string() }
                        }
                    }
                }
            }
        };

        let mut result = PageResult::new(url, outcome);
        result.title = title;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlError;
    use crate::output::url_to_filename;

    fn config(dir: &std::path::Path) -> CrawlerConfig {
        CrawlerConfig::new()
            .with_output_dir(dir.join("output"))
            .with_markdown_dir(dir.join("md"))
            .with_proxy_list(None)
    }

    #[test]
    fn test_dispatcher_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = CrawlDispatcher::new(
            config(dir.path()).with_batch_size(0),
            Arc::new(ProxyPool::direct()),
        );
        assert!(matches!(result, Err(CrawlError::Config(_))));
    }

    #[test]
    fn test_process_page_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = CrawlDispatcher::new(
            config(dir.path()).with_min_malayalam_ratio(0.5),
            Arc::new(ProxyPool::direct()),
        )
        .unwrap();
        dispatcher.writer.setup_directories().unwrap();

        let malayalam = "<html><body><p>തൃശ്ശൂർ പൂരം കേരളത്തിലെ പ്രസിദ്ധമായ ഉത്സവമാണ്.</p></body></html>";
        let saved = dispatcher.process_page("https://ml.example/pooram", malayalam);
        assert!(matches!(saved.outcome, PageOutcome::Saved { .. }));

        let again = dispatcher.process_page("https://mirror.example/pooram", malayalam);
        assert!(matches!(again.outcome, PageOutcome::Duplicate { ref of, .. } if of == "https://ml.example/pooram"));

        let english = dispatcher.process_page(
            "https://en.example/",
            "<p>An English page about something else entirely.</p>",
        );
        assert!(matches!(english.outcome, PageOutcome::Skipped { .. }));

        let empty = dispatcher.process_page("https://empty.example/", "<script>x()</script>");
        assert_eq!(
            empty.outcome,
            PageOutcome::Skipped {
                reason: "empty content".to_string()
            }
        );
    }

    #[test]
    fn test_failed_write_does_not_index_page() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher =
            CrawlDispatcher::new(config(dir.path()), Arc::new(ProxyPool::direct())).unwrap();
        dispatcher.writer.setup_directories().unwrap();

        let first = "https://ml.example/vartha";
        // A directory where the markdown file should go makes the write fail
        std::fs::create_dir(dir.path().join("md").join(format!("{}.md", url_to_filename(first))))
            .unwrap();

        let html = "<p>നിയമസഭാ തിരഞ്ഞെടുപ്പിന്റെ ഫലം ഇന്ന് പ്രഖ്യാപിക്കും.</p>";
        let failed = dispatcher.process_page(first, html);
        assert!(matches!(failed.outcome, PageOutcome::Failed { .. }));

        let retried = dispatcher.process_page("https://mirror.example/vartha", html);
        assert!(matches!(retried.outcome, PageOutcome::Saved { .. }));
        assert_eq!(dispatcher.processor.lock().unwrap().accepted(), 1);
    }

    #[tokio::test]
    async fn test_stopped_dispatcher_skips_all_batches() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher =
            CrawlDispatcher::new(config(dir.path()), Arc::new(ProxyPool::direct())).unwrap();
        dispatcher.stop_handle().store(true, Ordering::SeqCst);

        let urls = vec!["https://never.example/".to_string()];
        let report = dispatcher.run(&urls).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.processed(), 0);
    }
}
