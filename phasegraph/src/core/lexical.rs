//! Lexical matching shared by the research cache and the dead-end ledger.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("token regex should be valid"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "the", "to", "use", "using", "via", "with",
];

/// Lowercased word tokens in order of appearance, stop words included.
pub fn tokens(text: &str) -> Vec<String> {
    TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Distinct content tokens (stop words removed).
pub fn keywords(text: &str) -> BTreeSet<String> {
    tokens(text)
        .into_iter()
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Shared keywords divided by the size of the smaller keyword set, in percent.
///
/// Returns 0 when either side has no keywords.
pub fn overlap_percent(left: &BTreeSet<String>, right: &BTreeSet<String>) -> u8 {
    let smaller = left.len().min(right.len());
    if smaller == 0 {
        return 0;
    }
    let shared = left.intersection(right).count();
    ((shared * 100) / smaller) as u8
}
