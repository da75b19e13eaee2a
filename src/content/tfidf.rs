//! TF-IDF vectors and cosine similarity for near-duplicate detection
//!
//! Weights follow the smoothed scheme `idf = ln((1 + n) / (1 + df)) + 1`
//! with raw term counts and L2-normalised vectors. The candidate document
//! takes part in the document frequencies, as if the index had been fitted
//! on the corpus plus the candidate.

use crate::content::normalize::is_word_char;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "almost", "also", "am",
        "among", "an", "and", "any", "are", "as", "at", "be", "because", "been", "before",
        "being", "below", "between", "both", "but", "by", "can", "cannot", "could", "did",
        "do", "does", "doing", "down", "during", "each", "either", "else", "enough", "etc",
        "even", "ever", "every", "few", "for", "from", "further", "had", "has", "have",
        "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
        "however", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "least",
        "less", "many", "may", "me", "might", "more", "most", "much", "must", "my", "myself",
        "neither", "no", "nor", "not", "now", "of", "off", "often", "on", "once", "only",
        "or", "other", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per",
        "perhaps", "rather", "same", "she", "should", "since", "so", "some", "such", "than",
        "that", "the", "their", "theirs", "them", "themselves", "then", "there", "therefore",
        "these", "they", "this", "those", "though", "through", "thus", "to", "too", "under",
        "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were", "what",
        "whatever", "when", "where", "whether", "which", "while", "who", "whom", "whose",
        "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
        "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Split text into lowercase terms of at least two word characters, minus stop words
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !is_word_char(c))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(token.as_str()))
        .collect()
}

fn term_counts(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    id: String,
    counts: HashMap<String, u32>,
}

/// Best match of a candidate against the index
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    /// Id of the closest indexed document
    pub id: String,
    /// Cosine similarity in `[0, 1]`
    pub similarity: f64,
}

/// Incremental TF-IDF index over previously accepted documents
#[derive(Debug, Default, Clone)]
pub struct TfIdfIndex {
    documents: Vec<IndexedDocument>,
    doc_freq: HashMap<String, usize>,
}

impl TfIdfIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn add(&mut self, id: impl Into<String>, text: &str) {
        let counts = term_counts(text);
        for term in counts.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.documents.push(IndexedDocument {
            id: id.into(),
            counts,
        });
    }

    /// Closest indexed document, or `None` for an empty index or a token-less candidate
    pub fn best_match(&self, text: &str) -> Option<SimilarityMatch> {
        if self.documents.is_empty() {
            return None;
        }

        let candidate = term_counts(text);
        if candidate.is_empty() {
            return None;
        }

        let n = self.documents.len() + 1;
        let idf = |term: &str| -> f64 {
            let df = self.doc_freq.get(term).copied().unwrap_or(0)
                + usize::from(candidate.contains_key(term));
            ((1.0 + n as f64) / (1.0 + df as f64)).ln() + 1.0
        };

        let query: HashMap<&str, f64> = candidate
            .iter()
            .map(|(term, &count)| (term.as_str(), count as f64 * idf(term)))
            .collect();
        let query_norm = query.values().map(|w| w * w).sum::<f64>().sqrt();

        self.documents
            .iter()
            .map(|doc| {
                let mut dot = 0.0;
                let mut norm = 0.0;
                for (term, &count) in &doc.counts {
                    let weight = count as f64 * idf(term);
                    norm += weight * weight;
                    if let Some(q) = query.get(term.as_str()) {
                        dot += weight * q;
                    }
                }
                let similarity = if norm == 0.0 || query_norm == 0.0 {
                    0.0
                } else {
                    (dot / (norm.sqrt() * query_norm)).clamp(0.0, 1.0)
                };
                SimilarityMatch {
                    id: doc.id.clone(),
                    similarity,
                }
            })
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
    }
}

/// TF-IDF cosine similarity of two texts, fitted on just the pair
pub fn similarity(a: &str, b: &str) -> f64 {
    let mut index = TfIdfIndex::new();
    index.add("a", a);
    index.best_match(b).map_or(0.0, |m| m.similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KERALA: &str = "കേരളം ഇന്ത്യയുടെ തെക്കുപടിഞ്ഞാറൻ തീരത്തുള്ള സംസ്ഥാനമാണ്. \
                          തിരുവനന്തപുരമാണ് തലസ്ഥാനം. മലയാളമാണ് പ്രധാന ഭാഷ.";
    const CRICKET: &str = "ഇന്നലെ നടന്ന ക്രിക്കറ്റ് മത്സരത്തിൽ ടീം വിജയിച്ചു. \
                           ക്യാപ്റ്റൻ സെഞ്ച്വറി നേടി.";

    #[test]
    fn test_tokenize_keeps_malayalam_words_whole() {
        let tokens = tokenize("മലയാളം ഭാഷ, the Kerala state!");
        assert_eq!(tokens, vec!["മലയാളം", "ഭാഷ", "kerala", "state"]);
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        assert!(tokenize("a b c 1 ?").is_empty());
    }

    #[test]
    fn test_identical_texts_are_fully_similar() {
        let score = similarity(KERALA, KERALA);
        assert!((score - 1.0).abs() < 1e-9, "score was {}", score);
    }

    #[test]
    fn test_unrelated_texts_are_dissimilar() {
        assert_eq!(similarity(KERALA, CRICKET), 0.0);
    }

    #[test]
    fn test_small_edit_stays_similar() {
        let edited = format!("{} പുതിയ", KERALA);
        let score = similarity(KERALA, &edited);
        assert!(score > 0.85 && score < 1.0, "score was {}", score);
    }

    #[test]
    fn test_best_match_picks_closest_document() {
        let mut index = TfIdfIndex::new();
        index.add("cricket", CRICKET);
        index.add("kerala", KERALA);

        let found = index.best_match(KERALA).unwrap();
        assert_eq!(found.id, "kerala");
        assert!(found.similarity > 0.99);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        let index = TfIdfIndex::new();
        assert!(index.best_match(KERALA).is_none());

        let mut index = TfIdfIndex::new();
        index.add("kerala", KERALA);
        assert!(index.best_match("... !!").is_none());
    }
}
