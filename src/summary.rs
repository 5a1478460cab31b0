//! Placeholder summary and keyword frequency analysis

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const ELLIPSIS: &str = "...";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub word: String,
    pub count: usize,
}

/// First `budget` characters of `text`, plus [`ELLIPSIS`] when truncated.
pub fn summarize(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+").expect("valid word pattern"))
}

/// Most frequent words of at least `min_len` characters, at most `top_n`.
///
/// Sorted by descending count; equal counts keep first-occurrence order.
pub fn extract_keywords(text: &str, top_n: usize, min_len: usize) -> Vec<KeywordEntry> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for token in word_pattern().find_iter(text) {
        let word = token.as_str().to_lowercase();
        if word.chars().count() < min_len {
            continue;
        }
        let count = counts.entry(word.clone()).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    let mut entries: Vec<KeywordEntry> = order
        .into_iter()
        .map(|word| {
            let count = counts[&word];
            KeywordEntry { word, count }
        })
        .collect();
    // sort_by is stable, so ties stay in first-seen order
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries.truncate(top_n);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(summarize("hello", 5), "hello");
        assert_eq!(summarize("hello", 900), "hello");
        assert_eq!(summarize("", 10), "");
    }

    #[test]
    fn long_text_is_truncated_with_marker() {
        let text = "a".repeat(1200);
        let summary = summarize(&text, 1000);
        assert_eq!(summary.len(), 1000 + ELLIPSIS.len());
        assert!(summary.ends_with(ELLIPSIS));
        assert_eq!(&summary[..1000], &text[..1000]);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let summary = summarize("ééééé", 3);
        assert_eq!(summary, "ééé...");
        assert_eq!(summary.chars().count(), 3 + ELLIPSIS.len());
    }

    #[test]
    fn empty_text_has_no_keywords() {
        assert!(extract_keywords("", 5, 5).is_empty());
    }

    #[test]
    fn keywords_sorted_by_count_then_first_seen() {
        let text = "Neural networks learn. Networks generalize; neural NEURAL models. \
                    Models matter. Tiny word list here";
        let keywords = extract_keywords(text, 5, 5);
        assert_eq!(
            keywords,
            vec![
                KeywordEntry { word: "neural".into(), count: 3 },
                KeywordEntry { word: "networks".into(), count: 2 },
                KeywordEntry { word: "models".into(), count: 2 },
                KeywordEntry { word: "learn".into(), count: 1 },
                KeywordEntry { word: "generalize".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn short_tokens_are_discarded() {
        let keywords = extract_keywords("the cat sat on a mat with data", 5, 5);
        assert!(keywords.is_empty());
    }

    #[test]
    fn at_most_top_n() {
        let text = "alpha1 alpha2 alpha3 alpha4 alpha5 alpha6 alpha7";
        let keywords = extract_keywords(text, 5, 5);
        assert_eq!(keywords.len(), 5);
        assert!(keywords.windows(2).all(|w| w[0].count >= w[1].count));
    }
}
