use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Stop words removed from full-text tokens by default.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from",
    "has", "he", "if", "in", "into", "is", "it", "its", "no", "not", "of",
    "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Splits strings into case-folded word tokens, dropping punctuation and
/// stop words.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: HashSet<String>,
}

impl Tokenizer {
    pub fn new<S: AsRef<str>>(stop_words: &[S]) -> Self {
        Self {
            stop_words: stop_words
                .iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Tokens of `text` in order of appearance, duplicates included.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .unicode_words()
            .filter(|word| !self.stop_words.contains(*word))
            .map(str::to_string)
            .collect()
    }

    /// Index terms for a string leaf. A string with no surviving token is
    /// kept whole so it can still be matched exactly.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            vec![text.to_string()]
        } else {
            tokens
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_WORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_strips_punctuation() {
        let tokens = Tokenizer::default().tokenize("Hello, World! John-Jones");
        assert_eq!(tokens, vec!["hello", "world", "john", "jones"]);
    }

    #[test]
    fn removes_stop_words() {
        let tokens = Tokenizer::default().tokenize("The cat and the hat");
        assert_eq!(tokens, vec!["cat", "hat"]);
    }

    #[test]
    fn keeps_duplicates() {
        let tokens = Tokenizer::default().tokenize("go go go");
        assert_eq!(tokens, vec!["go", "go", "go"]);
    }

    #[test]
    fn stop_word_only_string_kept_whole() {
        let tokenizer = Tokenizer::default();
        assert_eq!(tokenizer.terms("The"), vec!["The"]);
        assert_eq!(tokenizer.terms(""), vec![""]);
    }

    #[test]
    fn custom_stop_words() {
        let tokenizer = Tokenizer::new(&["Joe"]);
        assert_eq!(tokenizer.tokenize("joe smith"), vec!["smith"]);
    }
}
