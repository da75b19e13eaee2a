//! Content processing
//!
//! Turns fetched HTML into cleaned, NFC-normalised markdown and filters out
//! pages whose TF-IDF vector is too close to one already saved.

pub mod markdown;
pub mod normalize;
pub mod processor;
pub mod tfidf;

pub use markdown::{extract_title, html_to_markdown};
pub use normalize::{malayalam_ratio, nfc};
pub use processor::{ContentProcessor, ProcessedPage, Verdict};
pub use tfidf::{similarity, SimilarityMatch, TfIdfIndex};
