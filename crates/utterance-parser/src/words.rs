use crate::{ParseError, Result};
use regex::Regex;
use std::collections::BTreeSet;

/// A word: alphanumerics with an optional inner apostrophe and one optional
/// trailing `!`, `?`, `,` or `.`.
const WORD_PATTERN: &str = r"\w+'?\w*[!?,.]?";

const CLAUSE_BREAKS: [char; 4] = [',', '.', '?', '!'];

/// Word counting and clause splitting over spoken sentences.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    word: Regex,
}

impl Tokenizer {
    pub fn new() -> Result<Self> {
        let word = Regex::new(WORD_PATTERN).map_err(|e| ParseError::Pattern(e.to_string()))?;
        Ok(Self { word })
    }

    pub fn words<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.word.find_iter(text).map(|m| m.as_str()).collect()
    }

    pub fn num_words(&self, text: &str) -> usize {
        self.word.find_iter(text).count()
    }

    /// Words of `text` that end at or before byte `at`.
    pub fn words_ending_by(&self, text: &str, at: usize) -> usize {
        self.word.find_iter(text).take_while(|m| m.end() <= at).count()
    }

    /// Words of `text` that begin before byte `at`, including one `at` splits.
    pub fn words_starting_before(&self, text: &str, at: usize) -> usize {
        self.word.find_iter(text).take_while(|m| m.start() < at).count()
    }

    /// 1-based word indices at which a new clause begins.
    ///
    /// Positions past the last word are dropped since speech never reaches them.
    pub fn gaze_triggers(&self, sentence: &str) -> BTreeSet<usize> {
        let total = self.num_words(sentence);
        let mut triggers = BTreeSet::new();
        let mut seen = 0;
        for clause in sentence.split(CLAUSE_BREAKS) {
            seen += self.num_words(clause);
            if seen < total {
                triggers.insert(seen + 1);
            }
        }
        triggers
    }
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_with_apostrophes_and_punctuation() {
        let tok = Tokenizer::new().unwrap();
        assert_eq!(
            tok.words("Don't panic, it's fine!"),
            vec!["Don't", "panic,", "it's", "fine!"]
        );
        assert_eq!(tok.num_words("  "), 0);
        assert_eq!(tok.num_words("Hello , there"), 2);
    }

    #[test]
    fn triggers_fall_on_clause_starts() {
        let tok = Tokenizer::new().unwrap();
        let triggers = tok.gaze_triggers("Hello there, how are you? I am fine.");
        assert_eq!(triggers.into_iter().collect::<Vec<_>>(), vec![3, 6]);
    }

    #[test]
    fn single_clause_has_no_triggers() {
        let tok = Tokenizer::new().unwrap();
        assert!(tok.gaze_triggers("Hello there").is_empty());
        assert!(tok.gaze_triggers("Hello there.").is_empty());
        assert!(tok.gaze_triggers("").is_empty());
    }

    #[test]
    fn span_counts_treat_split_words_as_one() {
        let tok = Tokenizer::new().unwrap();
        let text = "Say hello there";
        // Byte 7 falls inside "hello".
        assert_eq!(tok.words_ending_by(text, 7), 1);
        assert_eq!(tok.words_starting_before(text, 7), 2);
        assert_eq!(tok.words_ending_by(text, 9), 2);
        assert_eq!(tok.words_starting_before(text, 0), 0);
    }

    #[test]
    fn normalizing_is_idempotent() {
        let once = normalize_whitespace("  Hi \n  there\t ");
        assert_eq!(once, "Hi there");
        assert_eq!(normalize_whitespace(&once), once);
    }
}
