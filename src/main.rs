use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use malayalam_crawler::{
    cache::{CacheMode, PageCache},
    config::CrawlerConfig,
    content::{similarity, ContentProcessor},
    crawler::{load_urls, select_range, CrawlDispatcher, CrawlReport},
    logging,
    proxy::{
        CheckerConfig, GeoLocator, ProxyChecker, ProxyParser, ProxyPool, ProxyType,
        RotationStrategy,
    },
    tui::CrawlMonitor,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A batch crawler for Malayalam web pages
#[derive(Parser)]
#[command(name = "malayalam-crawler")]
#[command(about = "Crawl Malayalam pages through rotating proxies and save them as markdown")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    crawl: CrawlArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the URL list (the default)
    Crawl(CrawlArgs),
    /// Check proxies and save the working ones
    CheckProxies {
        /// Input file containing proxies
        input: PathBuf,
        /// Output file for good proxies
        #[arg(short, long, default_value = "good_proxies.txt")]
        good: PathBuf,
        /// Output file for bad proxies
        #[arg(short, long)]
        bad: Option<PathBuf>,
        /// Proxy type for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long = "type", default_value = "http")]
        proxy_type: String,
        /// Number of concurrent checks
        #[arg(short = 'n', long, default_value = "10")]
        threads: usize,
        /// Timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
        /// URL to test proxies against
        #[arg(long, default_value = "http://httpbin.org/ip")]
        test_url: String,
        /// MMDB file used to show where working proxies are
        #[arg(long)]
        mmdb: Option<PathBuf>,
    },
    /// Print the TF-IDF similarity of two documents
    Similarity {
        a: PathBuf,
        b: PathBuf,
        /// Treat both files as HTML and compare the extracted markdown
        #[arg(long)]
        html: bool,
    },
}

#[derive(Args, Clone, Default)]
struct CrawlArgs {
    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// JSON file with the URLs to crawl
    #[arg(short, long)]
    urls: Option<PathBuf>,
    /// Proxy list file
    #[arg(short, long)]
    proxies: Option<PathBuf>,
    /// Connect directly, ignoring any proxy list
    #[arg(long, conflicts_with = "proxies")]
    no_proxies: bool,
    /// Directory for reports and the page cache
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Directory for markdown files
    #[arg(long)]
    markdown_dir: Option<PathBuf>,
    /// Number of URLs fetched concurrently
    #[arg(short, long)]
    batch_size: Option<usize>,
    /// First URL index to crawl
    #[arg(long)]
    start: Option<usize>,
    /// URL index to stop before
    #[arg(long)]
    end: Option<usize>,
    /// Attempts per URL
    #[arg(long)]
    max_retries: Option<u32>,
    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Similarity above which a page is a duplicate
    #[arg(long)]
    similarity_threshold: Option<f64>,
    /// Page cache mode (bypass, use_cache, update_cache)
    #[arg(long)]
    cache_mode: Option<CacheMode>,
    /// Proxy rotation (round_robin, random, weighted)
    #[arg(long)]
    rotation: Option<RotationStrategy>,
    /// Check every proxy before crawling and keep the working ones
    #[arg(long)]
    validate_proxies: bool,
    /// Only use proxies located in this country (ISO code)
    #[arg(long, requires = "mmdb")]
    country: Option<String>,
    /// MMDB file for the country filter
    #[arg(long)]
    mmdb: Option<PathBuf>,
    /// Show a live progress monitor
    #[arg(long)]
    tui: bool,
}

impl CrawlArgs {
    fn to_config(&self) -> Result<CrawlerConfig> {
        let mut config = match &self.config {
            Some(path) => CrawlerConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => CrawlerConfig::default(),
        };

        if let Some(urls) = &self.urls {
            config = config.with_input(urls);
        }
        if self.no_proxies {
            config = config.with_proxy_list(None);
        } else if let Some(proxies) = &self.proxies {
            config = config.with_proxy_list(Some(proxies.clone()));
        }
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir);
        }
        if let Some(dir) = &self.markdown_dir {
            config = config.with_markdown_dir(dir);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if self.start.is_some() || self.end.is_some() {
            let start = self.start.unwrap_or(config.start_index);
            let end = self.end.or(config.end_index);
            config = config.with_range(start, end);
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        if let Some(threshold) = self.similarity_threshold {
            config = config.with_similarity_threshold(threshold);
        }
        if let Some(mode) = self.cache_mode {
            config = config.with_cache_mode(mode);
        }
        if let Some(rotation) = self.rotation {
            config = config.with_rotation(rotation);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Crawl(args)) => crawl(args).await?,
        None => crawl(cli.crawl).await?,
        Some(Commands::CheckProxies {
            input,
            good,
            bad,
            proxy_type,
            threads,
            timeout,
            test_url,
            mmdb,
        }) => {
            let ptype: ProxyType = proxy_type.parse().map_err(|e: String| anyhow!(e))?;
            let proxies = ProxyParser::parse_file(&input, ptype)?;

            println!("Loaded {} proxies from {:?}", proxies.len(), input);
            println!("Checking with {} threads, timeout: {}s", threads, timeout);
            println!("Test URL: {}", test_url);
            println!();

            let mut config = CheckerConfig::new()
                .with_concurrency(threads)
                .with_timeout(Duration::from_secs(timeout))
                .with_test_url(test_url);
            if let Some(mmdb) = mmdb {
                config = config.with_mmdb_path(mmdb.to_string_lossy().into_owned());
            }

            let checker = ProxyChecker::with_config(config);
            let (mut good_results, bad_results) = checker.check_and_separate(proxies).await;
            good_results.sort_by_key(|r| r.response_time_ms.unwrap_or(u64::MAX));

            println!(
                "Results: {} good, {} bad",
                good_results.len(),
                bad_results.len()
            );

            let good_proxies: Vec<_> = good_results.iter().map(|r| r.proxy.clone()).collect();
            ProxyParser::save_to_file(&good_proxies, &good, true)?;
            println!("Saved {} good proxies to {:?}", good_proxies.len(), good);

            if let Some(bad_path) = bad {
                let bad_proxies: Vec<_> = bad_results.iter().map(|r| r.proxy.clone()).collect();
                ProxyParser::save_to_file(&bad_proxies, &bad_path, true)?;
                println!("Saved {} bad proxies to {:?}", bad_proxies.len(), bad_path);
            }

            if !good_results.is_empty() {
                println!("\nWorking proxies:");
                for result in &good_results {
                    let country = result.country_code().unwrap_or("??");
                    match result.response_time_ms {
                        Some(time) => {
                            println!("  {} [{}] ({}ms)", result.proxy.to_full_string(), country, time)
                        }
                        None => println!("  {} [{}]", result.proxy.to_full_string(), country),
                    }
                }
            }
        }
        Some(Commands::Similarity { a, b, html }) => {
            let read = |path: &Path| -> Result<String> {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {:?}", path))?;
                Ok(if html {
                    ContentProcessor::process_html(&content).markdown
                } else {
                    content
                })
            };
            let score = similarity(&read(&a)?, &read(&b)?);
            let default_threshold = CrawlerConfig::default().similarity_threshold;
            println!("Similarity: {:.4}", score);
            println!(
                "Duplicate at default threshold ({}): {}",
                default_threshold,
                score > default_threshold
            );
        }
    }

    Ok(())
}

async fn crawl(args: CrawlArgs) -> Result<()> {
    let config = args.to_config()?;
    let log_path = logging::init(&config.log_dir, !args.tui)?;

    let all_urls = load_urls(&config.input_json_path)
        .with_context(|| format!("Failed to load URLs from {:?}", config.input_json_path))?;
    let urls = select_range(&all_urls, config.start_index, config.end_index).to_vec();
    info!(
        selected = urls.len(),
        total = all_urls.len(),
        start = config.start_index,
        "Selected URLs"
    );

    let pool = Arc::new(build_pool(&config, &args).await?);

    let mut dispatcher = CrawlDispatcher::new(config.clone(), Arc::clone(&pool))?;
    if config.cache_mode != CacheMode::Bypass {
        std::fs::create_dir_all(&config.output_dir)?;
        let cache = PageCache::open(config.cache_db_path()).await?;
        dispatcher = dispatcher.with_cache(cache);
    }

    let stop = dispatcher.stop_handle();
    let ctrl_c_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            ctrl_c_stop.store(true, Ordering::SeqCst);
        }
    });

    let report = if args.tui {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let dispatcher = Arc::new(dispatcher.with_events(tx));
        let total = urls.len();
        let handle = tokio::spawn(async move { dispatcher.run(&urls).await });

        let mut monitor = CrawlMonitor::new(rx, total, stop);
        monitor.run().await?;
        handle.await??
    } else {
        println!(
            "Crawling {} URLs in batches of {} ({} proxies)",
            urls.len(),
            config.batch_size,
            pool.len()
        );
        dispatcher.run(&urls).await?
    };

    print_summary(&report, &config, &log_path);
    Ok(())
}

/// Load, optionally validate and filter the proxy list
async fn build_pool(config: &CrawlerConfig, args: &CrawlArgs) -> Result<ProxyPool> {
    let Some(path) = &config.proxy_list_path else {
        info!("No proxy list, using direct connections");
        return Ok(ProxyPool::direct());
    };

    if !args.validate_proxies && args.country.is_none() {
        return Ok(ProxyPool::from_file(
            path,
            config.rotation,
            config.max_proxy_failures,
        )?);
    }

    if !path.exists() {
        warn!(path = %path.display(), "Proxy list not found, using direct connections");
        return Ok(ProxyPool::direct());
    }

    let mut proxies = ProxyParser::parse_file(path, ProxyType::Http)?;

    if let (Some(country), Some(mmdb)) = (&args.country, &args.mmdb) {
        let locator = GeoLocator::from_path(mmdb)
            .with_context(|| format!("Failed to open MMDB file {:?}", mmdb))?;
        let before = proxies.len();
        proxies = locator.filter_by_country(proxies, country);
        info!(country = %country, kept = proxies.len(), before, "Filtered proxies by country");
    }

    if args.validate_proxies {
        println!("Validating {} proxies...", proxies.len());
        let checker = ProxyChecker::with_config(
            CheckerConfig::new().with_timeout(config.timeout().min(Duration::from_secs(10))),
        );
        proxies = checker.working_proxies(proxies).await;
        println!("{} proxies passed validation", proxies.len());
    }

    if proxies.is_empty() {
        warn!("No usable proxies left, using direct connections");
    }
    Ok(ProxyPool::new(
        proxies,
        config.rotation,
        config.max_proxy_failures,
    ))
}

fn print_summary(report: &CrawlReport, config: &CrawlerConfig, log_path: &Path) {
    println!();
    if report.interrupted {
        println!("Crawl stopped early after {} of {} URLs", report.processed(), report.total_urls);
    } else {
        println!("Crawl complete: {} URLs", report.total_urls);
    }
    println!("  Saved:      {}", report.saved);
    println!("  Duplicates: {}", report.duplicates);
    println!("  Skipped:    {}", report.skipped);
    println!("  Failed:     {}", report.failed);
    println!("Markdown written to {:?}", config.markdown_dir);
    println!(
        "Report: {:?}",
        config
            .output_dir
            .join(format!("crawl_report_{}.json", report.run_id))
    );
    println!("Log: {:?}", log_path);

    let evicted: Vec<_> = report.proxies.iter().filter(|p| p.evicted).collect();
    if !evicted.is_empty() {
        println!("\nEvicted proxies:");
        for stats in evicted {
            println!(
                "  {} ({} ok, {} failed)",
                stats.proxy, stats.successes, stats.failures
            );
        }
    }
}
