//! Loading the list of URLs to crawl

use crate::error::{CrawlError, CrawlResult};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// Read URLs from a JSON file
///
/// Accepts an array of strings, or an object whose string values (or, when
/// no value is a string, whose keys) are the URLs.
pub fn load_urls<P: AsRef<Path>>(path: P) -> CrawlResult<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let urls = parse_urls(&content)?;
    info!(count = urls.len(), path = %path.display(), "Loaded URLs");
    Ok(urls)
}

/// Parse and validate a JSON URL list
pub fn parse_urls(content: &str) -> CrawlResult<Vec<String>> {
    let data: Value = serde_json::from_str(content)?;

    let candidates: Vec<Value> = match data {
        Value::Array(items) => items,
        Value::Object(map) => {
            if map.values().any(Value::is_string) {
                map.into_iter().map(|(_, v)| v).collect()
            } else {
                map.into_iter().map(|(k, _)| Value::String(k)).collect()
            }
        }
        other => {
            return Err(CrawlError::InvalidInput(format!(
                "expected a JSON array or object of URLs, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for candidate in candidates {
        let raw = match candidate {
            Value::String(raw) => raw,
            other => {
                warn!(item = %other, "Skipping non-string URL entry");
                continue;
            }
        };
        match validate_url(&raw) {
            Ok(url) => {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
            Err(e) => warn!(url = %raw, error = %e, "Skipping invalid URL"),
        }
    }

    Ok(urls)
}

fn validate_url(raw: &str) -> CrawlResult<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        scheme => Err(CrawlError::InvalidInput(format!("unsupported scheme {}", scheme))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `urls[start..end]`, clamped to the list bounds
pub fn select_range(urls: &[String], start: usize, end: Option<usize>) -> &[String] {
    let end = end.unwrap_or(urls.len()).min(urls.len());
    let start = start.min(end);
    &urls[start..end]
}
