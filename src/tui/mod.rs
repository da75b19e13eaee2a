//! TUI module for terminal user interfaces

mod crawl_monitor;

pub use crawl_monitor::CrawlMonitor;
