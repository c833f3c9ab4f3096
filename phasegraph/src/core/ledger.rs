//! Ranking for the research cache and matching for the dead-end ledger.
//!
//! Both are lexical and deterministic for a fixed store: the same entries and
//! query always produce the same order.

use serde::Serialize;

use crate::core::lexical::{keywords, overlap_percent, tokens};
use crate::core::types::{CacheEntry, DeadEnd};

const QUERY_TOKEN_WEIGHT: u32 = 3;
const FINDINGS_TOKEN_WEIGHT: u32 = 1;
const PARTIAL_TOKEN_WEIGHT: u32 = 1;
const PHRASE_WEIGHT: u32 = 5;
const MIN_PARTIAL_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub score: u32,
    pub entry: CacheEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadEndMatch {
    pub overlap_percent: u8,
    pub entry: DeadEnd,
}

/// Lexical relevance of `entry` for `query`; 0 means unrelated.
pub fn score_entry(entry: &CacheEntry, query: &str) -> u32 {
    let wanted = keywords(query);
    if wanted.is_empty() {
        return 0;
    }
    let query_tokens = keywords(&entry.query);
    let findings_tokens = keywords(&entry.findings);

    let mut score = 0;
    for word in &wanted {
        if query_tokens.contains(word) {
            score += QUERY_TOKEN_WEIGHT;
        } else if word.len() >= MIN_PARTIAL_LEN
            && query_tokens.iter().any(|token| token.contains(word.as_str()))
        {
            score += PARTIAL_TOKEN_WEIGHT;
        }
        if findings_tokens.contains(word) {
            score += FINDINGS_TOKEN_WEIGHT;
        }
    }

    let phrase = tokens(query).join(" ");
    if !phrase.is_empty() && tokens(&entry.query).join(" ").contains(&phrase) {
        score += PHRASE_WEIGHT;
    }
    score
}

/// Rank entries for `query`, best first, most recent first on ties.
///
/// `entries` must be in insertion order (oldest first).
pub fn search(entries: &[CacheEntry], query: &str, limit: usize) -> Vec<RankedEntry> {
    let mut ranked: Vec<(usize, u32)> = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| (idx, score_entry(entry, query)))
        .filter(|(_, score)| *score > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(idx, score)| RankedEntry {
            score,
            entry: entries[idx].clone(),
        })
        .collect()
}

/// Ledger entries similar to `approach`, best match first, newest first on ties.
pub fn similar_dead_ends(
    ledger: &[DeadEnd],
    approach: &str,
    min_overlap_percent: u8,
) -> Vec<DeadEndMatch> {
    let wanted = keywords(approach);
    let mut matches: Vec<(usize, u8)> = ledger
        .iter()
        .enumerate()
        .map(|(idx, entry)| (idx, overlap_percent(&wanted, &keywords(&entry.approach))))
        .filter(|(_, overlap)| *overlap > 0 && *overlap >= min_overlap_percent)
        .collect();
    matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    matches
        .into_iter()
        .map(|(idx, overlap)| DeadEndMatch {
            overlap_percent: overlap,
            entry: ledger[idx].clone(),
        })
        .collect()
}
