//! Page processing: HTML to cleaned markdown, then duplicate suppression

use crate::content::markdown::{extract_title, html_to_markdown};
use crate::content::normalize::{is_word_char, malayalam_ratio, nfc, ZWJ, ZWNJ};
use crate::content::tfidf::{SimilarityMatch, TfIdfIndex};
use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[a-zA-Z][^<>]*>").expect("Invalid tag regex"));

static HORIZONTAL_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\S\n]+").expect("Invalid space regex"));

static BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("Invalid blank line regex"));

/// Punctuation kept by [`ContentProcessor::clean_markdown`]
const KEPT_PUNCTUATION: &str = "-_*#>[](){}.,;:!?/|`'\"=&%+\\";

/// A fetched page after extraction and cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPage {
    pub title: Option<String>,
    pub markdown: String,
    pub malayalam_ratio: f64,
}

impl ProcessedPage {
    pub fn is_empty(&self) -> bool {
        self.markdown.trim().is_empty()
    }
}

/// Result of checking a page against everything accepted so far
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// New content; it has been added to the index
    Unique { max_similarity: f64 },
    /// Too close to an earlier page
    Duplicate { similarity: f64, of: String },
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Verdict::Duplicate { .. })
    }
}

/// Cleans pages and remembers accepted ones for near-duplicate detection
#[derive(Debug)]
pub struct ContentProcessor {
    similarity_threshold: f64,
    index: TfIdfIndex,
}

impl ContentProcessor {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
            index: TfIdfIndex::new(),
        }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Number of pages accepted so far
    pub fn accepted(&self) -> usize {
        self.index.len()
    }

    /// Normalise, convert and clean a raw HTML page
    pub fn process_html(html: &str) -> ProcessedPage {
        let html = nfc(html);
        let title = extract_title(&html);
        let markdown = Self::clean_markdown(&html_to_markdown(&html));
        let malayalam_ratio = malayalam_ratio(&markdown);

        ProcessedPage {
            title,
            markdown,
            malayalam_ratio,
        }
    }

    /// Strip leftover tags and stray symbols, then collapse whitespace
    pub fn clean_markdown(content: &str) -> String {
        let without_tags = TAG.replace_all(content, "");
        let filtered: String = without_tags
            .chars()
            .filter(|&c| {
                is_word_char(c)
                    || c.is_whitespace()
                    || c == ZWJ
                    || c == ZWNJ
                    || KEPT_PUNCTUATION.contains(c)
            })
            .collect();

        let lines: Vec<String> = filtered
            .lines()
            .map(|line| HORIZONTAL_SPACE.replace_all(line.trim(), " ").into_owned())
            .collect();

        BLANK_LINES
            .replace_all(&lines.join("\n"), "\n\n")
            .trim()
            .to_string()
    }

    /// Closest earlier page when it is strictly above the threshold
    pub fn is_duplicate_content(&self, content: &str) -> Option<SimilarityMatch> {
        self.index
            .best_match(content)
            .filter(|m| m.similarity > self.similarity_threshold)
    }

    pub fn add_content(&mut self, id: &str, content: &str) {
        self.index.add(id, content);
    }

    /// Judge `content` against the accepted pages without accepting it
    pub fn verdict(&self, content: &str) -> Verdict {
        match self.index.best_match(content) {
            Some(m) if m.similarity > self.similarity_threshold => Verdict::Duplicate {
                similarity: m.similarity,
                of: m.id,
            },
            other => Verdict::Unique {
                max_similarity: other.map_or(0.0, |m| m.similarity),
            },
        }
    }

    /// Check for a duplicate and, if the page is new, accept it in the same step
    pub fn check_and_add(&mut self, id: &str, content: &str) -> Verdict {
        let verdict = self.verdict(content);
        if !verdict.is_duplicate() {
            self.index.add(id, content);
        }
        verdict
    }
}
