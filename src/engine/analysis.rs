//! Text analysis used by the in-process engine.
//!
//! Text fields are split on Unicode word boundaries (UAX #29) and lowercased,
//! which is what the `standard` analyzer does. Edge n-gram fields additionally
//! expand each token into its prefixes, bounded by the `edgengram` token
//! filter found in the index settings.

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

const DEFAULT_MIN_GRAM: usize = 1;
const DEFAULT_MAX_GRAM: usize = 15;

/// Lowercased word tokens, punctuation and whitespace dropped.
pub fn standard_tokens(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Edge n-gram bounds of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeNgramConfig {
    pub min_gram: usize,
    pub max_gram: usize,
}

impl Default for EdgeNgramConfig {
    fn default() -> Self {
        EdgeNgramConfig {
            min_gram: DEFAULT_MIN_GRAM,
            max_gram: DEFAULT_MAX_GRAM,
        }
    }
}

impl EdgeNgramConfig {
    /// Read `analysis.filter.edgengram` from index settings, falling back to defaults.
    pub fn from_settings(settings: &Value) -> Self {
        let filter = &settings["analysis"]["filter"]["edgengram"];
        let read = |key: &str, default: usize| {
            filter[key]
                .as_u64()
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(default)
        };
        let min_gram = read("min_gram", DEFAULT_MIN_GRAM).max(1);
        EdgeNgramConfig {
            min_gram,
            max_gram: read("max_gram", DEFAULT_MAX_GRAM).max(min_gram),
        }
    }

    /// Prefixes of every token of `text`, from `min_gram` to `max_gram` characters.
    pub fn ngrams(&self, text: &str) -> Vec<String> {
        let mut grams = Vec::new();
        for token in standard_tokens(text) {
            let chars: Vec<char> = token.chars().collect();
            let upper = chars.len().min(self.max_gram);
            for len in self.min_gram..=upper {
                grams.push(chars[..len].iter().collect());
            }
        }
        grams
    }
}

/// Whether `needle` occurs as a contiguous run inside `haystack`.
pub fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_tokens() {
        assert_eq!(
            standard_tokens("The Hobbit, or There and Back Again"),
            vec!["the", "hobbit", "or", "there", "and", "back", "again"]
        );
        assert_eq!(standard_tokens("31337"), vec!["31337"]);
    }

    #[test]
    fn test_edge_ngrams() {
        let config = EdgeNgramConfig {
            min_gram: 1,
            max_gram: 4,
        };
        assert_eq!(config.ngrams("Java Bean"), vec!["j", "ja", "jav", "java", "b", "be", "bea", "bean"]);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = json!({"analysis": {"filter": {"edgengram": {"min_gram": 2, "max_gram": 3}}}});
        assert_eq!(
            EdgeNgramConfig::from_settings(&settings),
            EdgeNgramConfig { min_gram: 2, max_gram: 3 }
        );
        assert_eq!(EdgeNgramConfig::from_settings(&json!({})), EdgeNgramConfig::default());
    }

    #[test]
    fn test_contains_sequence() {
        let tokens = standard_tokens("a song of ice and fire");
        assert!(contains_sequence(&tokens, &standard_tokens("Ice and Fire")));
        assert!(!contains_sequence(&tokens, &standard_tokens("fire and ice")));
    }
}
