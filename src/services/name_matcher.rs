//! Filename → catalog identity matching.
//!
//! Two passes over the reference catalog:
//! 1. exact: the first catalog name (in catalog order) whose normalized form
//!    is a substring of the normalized filename stem;
//! 2. fuzzy: best Levenshtein similarity between filename tokens and the
//!    compact catalog names, accepted only above a threshold.
//!
//! The exact pass is substring-only, so short names can match inside longer
//! words (`muk` in `mukluk`). The fuzzy pass is token-aware and ignores
//! fragments shorter than [`MIN_FUZZY_TOKEN_CHARS`].

use crate::models::{
    catalog::{Catalog, normalize},
    match_result::MatchResult,
};
use std::sync::Arc;

/// Similarity (0–100) a fuzzy candidate must reach to be accepted.
///
/// At 80 a single typo is accepted in names of five letters or more, while
/// shorter names need an exact token.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 80.0;

/// Tokens shorter than this never take part in fuzzy matching on their own.
pub const MIN_FUZZY_TOKEN_CHARS: usize = 3;

/// Longest suffix (after the last `.`) still treated as a file extension.
const MAX_EXTENSION_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyPolicy {
    pub threshold: f64,
}

impl Default for FuzzyPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

/// Pure matcher over a shared catalog. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    catalog: Arc<Catalog>,
    fuzzy: Option<FuzzyPolicy>,
}

impl NameMatcher {
    /// `fuzzy: None` disables the fuzzy pass entirely.
    pub fn new(catalog: Arc<Catalog>, fuzzy: Option<FuzzyPolicy>) -> Self {
        Self { catalog, fuzzy }
    }

    pub fn match_filename(&self, filename: &str) -> MatchResult {
        let normalized = normalize(strip_extension(filename));
        if normalized.is_empty() {
            return MatchResult::Unknown;
        }

        if let Some(entry) = self
            .catalog
            .entries()
            .iter()
            .find(|entry| normalized.contains(entry.normalized.as_str()))
        {
            return MatchResult::MatchedName(entry.name.clone());
        }

        match self.fuzzy {
            Some(policy) => self.fuzzy_match(&normalized, policy),
            None => MatchResult::Unknown,
        }
    }

    fn fuzzy_match(&self, normalized: &str, policy: FuzzyPolicy) -> MatchResult {
        let candidates = fuzzy_candidates(normalized);
        if candidates.is_empty() {
            return MatchResult::Unknown;
        }

        let mut best: Option<(&str, f64)> = None;
        for entry in self.catalog.entries() {
            let score = candidates
                .iter()
                .map(|candidate| similarity(candidate, &entry.compact))
                .fold(0.0_f64, f64::max);
            // Strictly greater: equal scores keep the earlier catalog entry.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((entry.name.as_str(), score));
            }
        }

        match best {
            Some((name, score)) if score >= policy.threshold => {
                MatchResult::MatchedName(name.to_string())
            }
            _ => MatchResult::Unknown,
        }
    }
}

/// Drop a trailing `.ext` when it looks like a real extension.
fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_CHARS
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => filename,
    }
}

/// Tokens long enough to compare, plus each adjacent pair glued together so
/// that names split by a separator (`mr mine`) can still be scored.
fn fuzzy_candidates(normalized: &str) -> Vec<String> {
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    let mut candidates: Vec<String> = tokens
        .iter()
        .filter(|t| t.chars().count() >= MIN_FUZZY_TOKEN_CHARS)
        .map(|t| t.to_string())
        .collect();
    for pair in tokens.windows(2) {
        let joined = format!("{}{}", pair[0], pair[1]);
        if joined.chars().count() >= MIN_FUZZY_TOKEN_CHARS {
            candidates.push(joined);
        }
    }
    candidates
}

/// Normalized edit similarity on a 0–100 scale.
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let distance = levenshtein(a, b);
    100.0 * (1.0 - distance as f64 / max_len as f64)
}

/// Two-row Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
