//! Trigram extraction and similarity scoring.
//!
//! Mirrors the Postgres `pg_trgm` rules so scores agree with what a
//! trigram-indexed relational store would report: each alphanumeric word is
//! padded with two leading and one trailing space before 3-grams are taken,
//! and similarity is the Jaccard ratio of the two trigram sets.

use std::collections::HashSet;

/// Match cutoff for the trigram probe, matching the `pg_trgm` default for
/// its `%` operator.
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

/// The padded trigram set of `s`, case-folded.
pub fn trigrams(s: &str) -> HashSet<String> {
    let lower = s.to_lowercase();
    let mut grams = HashSet::new();
    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = " "
            .chars()
            .chain(" ".chars())
            .chain(word.chars())
            .chain(" ".chars())
            .collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

/// Set similarity of the two strings' trigrams, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    let shared = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("word", "word"), 1.0);
        assert_eq!(similarity("SMITH ADA", "smith ada"), 1.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [("office name", "office name 1"), ("smith", "smith ada")];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn near_matches_score_between_zero_and_one() {
        // "abc" and "abd" share "  a" and " ab" out of six distinct grams.
        let sim = similarity("abc", "abd");
        assert!((sim - 1.0 / 3.0).abs() < 1e-9, "got {sim}");
    }

    #[test]
    fn substring_queries_clear_the_match_threshold() {
        let sim = similarity("ice name 1", "OFFICE NAME 1");
        assert!(sim >= SIMILARITY_THRESHOLD, "got {sim}");
        assert!(sim < 1.0);
    }

    #[test]
    fn padding_is_word_wise() {
        // Word split means punctuation and ordering do not change the set.
        assert_eq!(
            trigrams("smith, ada"),
            trigrams("ada smith"),
        );
    }
}
