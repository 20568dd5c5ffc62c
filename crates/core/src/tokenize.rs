use std::collections::HashSet;
use std::hash::Hash;

use once_cell::sync::Lazy;
use regex::Regex;

static CLEANER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_\s]").expect("valid tokenizer regex"));

/// Lower-cases `input`, blanks out everything that is not an ASCII letter,
/// digit, underscore or whitespace, and splits on whitespace. Accented and
/// non-Latin letters are dropped.
pub fn tokenize(input: &str) -> Vec<String> {
    let lowered = input.to_lowercase();

    CLEANER
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

/// Jaccard index of the two token sets; duplicates collapse.
pub fn similarity<A, B>(left: &[A], right: &[B]) -> f64
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let left = left.iter().map(AsRef::as_ref).collect::<HashSet<&str>>();
    let right = right.iter().map(AsRef::as_ref).collect::<HashSet<&str>>();
    set_similarity(&left, &right)
}

pub(crate) fn set_similarity<T: Eq + Hash>(left: &HashSet<T>, right: &HashSet<T>) -> f64 {
    let intersection = left.intersection(right).count();
    let union = left.len() + right.len() - intersection;

    // two empty sets
    if union == 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_case() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ?! ").is_empty());
    }

    #[test]
    fn keeps_digits_and_underscores() {
        assert_eq!(tokenize("Bus 12A, t.nagar_2"), vec!["bus", "12a", "t", "nagar_2"]);
    }

    #[test]
    fn word_alphabet_is_ascii() {
        assert_eq!(tokenize("café crowded"), vec!["caf", "crowded"]);
        assert_eq!(tokenize("hi நன்றி"), vec!["hi"]);
    }

    #[test]
    fn retokenizing_is_stable() {
        let first = tokenize("Which bus is LEAST crowded -- going to T.Nagar?");
        let second = tokenize(&first.join(" "));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_sets_score_zero() {
        let empty: Vec<String> = Vec::new();
        let score = similarity(empty.as_slice(), empty.as_slice());
        assert_eq!(score, 0.0);
        assert!(!score.is_nan());
    }

    #[test]
    fn identical_and_disjoint_sets() {
        assert_eq!(similarity(&["a", "b"], &["a", "b"]), 1.0);
        assert_eq!(similarity(&["a", "b", "b"], &["b", "a"]), 1.0);
        assert_eq!(similarity(&["a"], &["b"]), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let left = ["which", "bus", "to", "airport"];
        let right = ["bus", "to"];
        assert_eq!(similarity(&left, &right), similarity(&right, &left));
        assert_eq!(similarity(&left, &right), 0.5);
    }
}
