//! Text normalization shared by the local tiers.
//!
//! Normalization is where learned vocabulary pays off: colloquial
//! aliases fold back to their technical term and filler words drop
//! out, so a trigger authored once keeps matching new phrasings.

use std::collections::{BTreeMap, BTreeSet};

/// Lowercase and replace punctuation with spaces, collapsing runs.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Replace learned colloquial alias phrases with their technical term.
///
/// Matching is whole-word: " stomach check " folds to " gastroscopy "
/// but "stomachache" is left alone. Input must already be normalized.
pub fn fold_synonyms(normalized: &str, synonyms: &BTreeMap<String, BTreeSet<String>>) -> String {
    let mut padded = format!(" {normalized} ");
    for (technical, aliases) in synonyms {
        for alias in aliases {
            let needle = format!(" {alias} ");
            if padded.contains(&needle) {
                padded = padded.replace(&needle, &format!(" {technical} "));
            }
        }
    }
    padded.trim().to_string()
}

/// Split into tokens, dropping template filler words.
pub fn tokenize(normalized: &str, fillers: &BTreeSet<String>) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|t| !fillers.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

/// Full pipeline: normalize, fold synonyms, strip fillers.
pub fn prepare(
    text: &str,
    synonyms: &BTreeMap<String, BTreeSet<String>>,
    fillers: &BTreeSet<String>,
) -> Vec<String> {
    tokenize(&fold_synonyms(&normalize(text), synonyms), fillers)
}

/// Whether the token sequence `needle` occurs contiguously in `haystack`.
pub fn contains_phrase(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Jaccard similarity of two token multisets, computed on unique tokens.
pub fn jaccard(a: &[String], b: &[String]) -> f32 {
    let set_a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f32 / union as f32
}
