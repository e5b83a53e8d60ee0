//! Slug word-frequency analysis.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Number of words returned by [`analyze_slugs`].
pub const TOP_WORDS: usize = 100;

pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "are", "as", "at", "be", "best", "blog", "by", "can",
    "category", "com", "easy", "for", "from", "get", "how", "html", "in", "into", "is", "it",
    "make", "my", "of", "on", "or", "our", "page", "php", "post", "recipe", "recipes", "tag",
    "that", "the", "this", "to", "what", "why", "with", "www", "you", "your",
];

/// Stored stop-word configuration: an optional replacement for the default list
/// plus custom additions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopWordSettings {
    #[serde(default)]
    pub stop_words: Option<Vec<String>>,
    #[serde(default)]
    pub custom_words: Vec<String>,
}

impl StopWordSettings {
    /// Effective set: stored list (or [`DEFAULT_STOP_WORDS`]) unioned with custom words.
    pub fn effective_set(&self) -> HashSet<String> {
        let base: HashSet<String> = match &self.stop_words {
            Some(words) => words.iter().map(|w| w.trim().to_lowercase()).collect(),
            None => DEFAULT_STOP_WORDS.iter().map(|w| (*w).to_string()).collect(),
        };
        base.into_iter()
            .chain(self.custom_words.iter().map(|w| w.trim().to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugWordCount {
    pub word: String,
    pub count: usize,
    pub urls: Vec<String>,
}

/// Lower-cases, turns hyphens into spaces, drops anything that is not a word
/// character or whitespace, and splits on whitespace.
pub fn tokenize_slug(slug: &str) -> Vec<String> {
    slug.to_lowercase()
        .replace('-', " ")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

/// ASCII digits with at most one decimal point, e.g. `2024` or `1.5`.
fn is_numeric_token(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_digit() || c == '.')
        && token.matches('.').count() <= 1
}

fn is_countable(token: &str, stop_words: &HashSet<String>) -> bool {
    token.chars().count() >= 2 && !is_numeric_token(token) && !stop_words.contains(token)
}

/// Counts surviving slug tokens across `(slug, url)` pairs and returns the top
/// [`TOP_WORDS`] by count, ties in first-seen order.
pub fn analyze_slugs<'a, I>(entries: I, stop_words: &HashSet<String>) -> Vec<SlugWordCount>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut words: Vec<SlugWordCount> = Vec::new();

    for (slug, url) in entries {
        if slug.is_empty() {
            continue;
        }
        for token in tokenize_slug(slug) {
            if !is_countable(&token, stop_words) {
                continue;
            }
            let slot = match index.get(&token) {
                Some(&slot) => slot,
                None => {
                    index.insert(token.clone(), words.len());
                    words.push(SlugWordCount {
                        word: token,
                        count: 0,
                        urls: Vec::new(),
                    });
                    words.len() - 1
                }
            };
            let entry = &mut words[slot];
            entry.count += 1;
            if !entry.urls.iter().any(|u| u == url) {
                entry.urls.push(url.to_string());
            }
        }
    }

    words.sort_by(|a, b| b.count.cmp(&a.count));
    words.truncate(TOP_WORDS);
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn tokenizer_drops_stop_words_and_keeps_the_rest() {
        let out = analyze_slugs(
            [("easy-chocolate-chip-cookies", "https://x.com/easy-chocolate-chip-cookies/")],
            &stop(&["easy"]),
        );
        let words: Vec<_> = out.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["chocolate", "chip", "cookies"]);
        assert!(out.iter().all(|w| w.count == 1));
        assert!(out
            .iter()
            .all(|w| w.urls == vec!["https://x.com/easy-chocolate-chip-cookies/".to_string()]));
    }

    #[test]
    fn counts_accumulate_and_urls_are_deduplicated() {
        let out = analyze_slugs(
            [
                ("banana-bread", "https://x.com/banana-bread"),
                ("banana-banana-muffins", "https://x.com/banana-banana-muffins"),
                ("bread-pudding", "https://x.com/bread-pudding"),
            ],
            &HashSet::new(),
        );
        assert_eq!(out[0].word, "banana");
        assert_eq!(out[0].count, 3);
        assert_eq!(out[0].urls.len(), 2);
        assert_eq!(out[1].word, "bread");
        assert_eq!(out[1].count, 2);
    }

    #[test]
    fn short_numeric_and_punctuation_tokens_are_filtered() {
        let tokens = tokenize_slug("2024/10-Best_Pies!-a-x");
        assert_eq!(tokens, vec!["202410", "best_pies", "a", "x"]);
        let out = analyze_slugs([("15-minute-meals-2", "u"), ("nan-bread", "v")], &HashSet::new());
        let words: Vec<_> = out.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["minute", "meals", "nan", "bread"]);
    }

    #[test]
    fn only_plain_decimal_tokens_count_as_numbers() {
        for token in ["2024", "1.5", "007", "3."] {
            assert!(is_numeric_token(token), "{token}");
        }
        for token in ["inf", "nan", "infinity", "1e5", "0x1f", "1.2.3", "v2", "."] {
            assert!(!is_numeric_token(token), "{token}");
        }
        let out = analyze_slugs([("inf-1e5-cake-2024", "u")], &HashSet::new());
        let words: Vec<_> = out.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["inf", "1e5", "cake"]);
    }

    #[test]
    fn output_is_capped_at_top_words() {
        let slugs: Vec<String> = (0..150).map(|i| format!("word{}x", i)).collect();
        let out = analyze_slugs(slugs.iter().map(|s| (s.as_str(), "u")), &HashSet::new());
        assert_eq!(out.len(), TOP_WORDS);
    }

    #[test]
    fn stored_settings_replace_defaults_and_add_custom_words() {
        let defaults = StopWordSettings::default().effective_set();
        assert!(defaults.contains("recipe"));

        let stored = StopWordSettings {
            stop_words: Some(vec!["Only".into()]),
            custom_words: vec!["extra ".into(), "".into()],
        };
        let set = stored.effective_set();
        assert_eq!(set, stop(&["only", "extra"]));
    }
}
