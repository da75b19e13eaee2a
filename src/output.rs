//! Writing markdown pages and run reports to disk

use crate::config::CrawlerConfig;
use crate::content::normalize::{is_malayalam, is_word_char};
use crate::content::ProcessedPage;
use crate::crawler::report::CrawlReport;
use crate::error::CrawlResult;
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Upper bound for a generated file stem, in chars and in bytes
const MAX_FILENAME_LEN: usize = 200;

/// Turn a URL into a file stem, keeping Malayalam letters readable
pub fn url_to_filename(url: &str) -> String {
    let mut name = String::new();
    for (count, c) in url.chars().enumerate() {
        let c = if is_word_char(c) || is_malayalam(c) || c == '-' {
            c
        } else {
            '_'
        };
        if count >= MAX_FILENAME_LEN || name.len() + c.len_utf8() > MAX_FILENAME_LEN {
            break;
        }
        name.push(c);
    }
    name
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char
fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Writes extracted pages under the markdown directory
#[derive(Debug)]
pub struct OutputWriter {
    output_dir: PathBuf,
    markdown_dir: PathBuf,
    used_names: Mutex<HashSet<String>>,
}

impl OutputWriter {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self::with_dirs(&config.output_dir, &config.markdown_dir)
    }

    pub fn with_dirs(output_dir: &Path, markdown_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            markdown_dir: markdown_dir.to_path_buf(),
            used_names: Mutex::new(HashSet::new()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn markdown_dir(&self) -> &Path {
        &self.markdown_dir
    }

    pub fn setup_directories(&self) -> CrawlResult<()> {
        fs::create_dir_all(&self.output_dir)?;
        fs::create_dir_all(&self.markdown_dir)?;
        Ok(())
    }

    /// Pick a file stem not yet used in this run
    fn reserve_name(&self, url: &str) -> String {
        let base = url_to_filename(url);
        let mut used = self.used_names.lock().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = base.clone();
        let mut n = 1;
        while !used.insert(candidate.clone()) {
            let suffix = format!("_{}", n);
            let stem = truncate_bytes(&base, MAX_FILENAME_LEN - suffix.len());
            candidate = format!("{}{}", stem, suffix);
            n += 1;
        }
        candidate
    }

    /// Write a page as `<markdown_dir>/<name>.md` with a small front matter header
    pub fn write_markdown(&self, url: &str, page: &ProcessedPage) -> CrawlResult<PathBuf> {
        let path = self.markdown_dir.join(format!("{}.md", self.reserve_name(url)));

        let mut content = String::from("---\n");
        content.push_str(&format!("url: {}\n", serde_json::to_string(url)?));
        if let Some(title) = &page.title {
            content.push_str(&format!("title: {}\n", serde_json::to_string(title)?));
        }
        content.push_str(&format!("fetched_at: {}\n", Utc::now().to_rfc3339()));
        content.push_str("---\n\n");
        content.push_str(&page.markdown);
        content.push('\n');

        fs::write(&path, content)?;
        Ok(path)
    }

    /// Write the run report as `<output_dir>/crawl_report_<run_id>.json`
    pub fn write_report(&self, report: &CrawlReport) -> CrawlResult<PathBuf> {
        let path = self
            .output_dir
            .join(format!("crawl_report_{}.json", report.run_id));
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)?;

        info!(path = %path.display(), "Wrote crawl report");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(markdown: &str) -> ProcessedPage {
        ProcessedPage {
            title: Some("വാർത്ത: ഇന്ന്".to_string()),
            markdown: markdown.to_string(),
            malayalam_ratio: 1.0,
        }
    }

    #[test]
    fn test_url_to_filename_keeps_malayalam() {
        assert_eq!(
            url_to_filename("https://ml.wikipedia.org/wiki/കേരളം"),
            "https___ml_wikipedia_org_wiki_കേരളം"
        );
        assert_eq!(url_to_filename("http://a.b/c?d=1&e-f"), "http___a_b_c_d_1_e-f");
    }

    #[test]
    fn test_url_to_filename_length_limits() {
        let ascii = format!("https://example.com/{}", "a".repeat(500));
        assert_eq!(url_to_filename(&ascii).chars().count(), MAX_FILENAME_LEN);

        let malayalam = format!("https://example.com/{}", "മ".repeat(500));
        let name = url_to_filename(&malayalam);
        assert!(name.len() <= MAX_FILENAME_LEN);
        assert!(name.ends_with('മ'));
    }

    #[test]
    fn test_write_markdown_and_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::with_dirs(dir.path(), &dir.path().join("md"));
        writer.setup_directories().unwrap();

        let first = writer
            .write_markdown("https://ml.example/a", &page("# ഒന്ന്"))
            .unwrap();
        // Same sanitised name as the first URL
        let second = writer
            .write_markdown("https://ml.example:a", &page("# രണ്ട്"))
            .unwrap();

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("https___ml_example_a_1.md"));

        let content = fs::read_to_string(&first).unwrap();
        assert!(content.starts_with("---\nurl: \"https://ml.example/a\"\n"));
        assert!(content.contains("title: \"വാർത്ത: ഇന്ന്\""));
        assert!(content.ends_with("# ഒന്ന്\n"));
    }

    #[test]
    fn test_collision_suffix_stays_within_limit() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::with_dirs(dir.path(), &dir.path().join("md"));
        writer.setup_directories().unwrap();

        let long = format!("https://ml.example/{}", "മ".repeat(100));
        let first = writer.write_markdown(&format!("{}/1", long), &page("# ഒന്ന്")).unwrap();
        let second = writer.write_markdown(&format!("{}/2", long), &page("# രണ്ട്")).unwrap();

        let stem = second.file_stem().unwrap().to_str().unwrap();
        assert_ne!(first, second);
        assert!(stem.ends_with("_1"));
        assert!(stem.len() <= MAX_FILENAME_LEN);
        assert!(stem.chars().count() <= MAX_FILENAME_LEN);
    }

    #[test]
    fn test_truncate_bytes_respects_char_boundaries() {
        assert_eq!(truncate_bytes("abc", 10), "abc");
        assert_eq!(truncate_bytes("മല", 4), "മ");
        assert_eq!(truncate_bytes("aമ", 2), "a");
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::with_dirs(dir.path(), dir.path());
        let report = CrawlReport::new(0);

        let path = writer.write_report(&report).unwrap();
        let loaded: CrawlReport =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
    }
}
