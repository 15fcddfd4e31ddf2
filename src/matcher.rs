//! Title similarity gate.
//!
//! The portal's multi-result disambiguation can land on the wrong work, so
//! every fetched record is compared against the requested title before its
//! fields are accepted.
//!
//! Similarity is the Ratcliff/Obershelp "gestalt" ratio: repeatedly take the
//! longest common contiguous block, recurse on both sides, and score
//! `2 * matched / (len_a + len_b)`. No junk heuristic is applied: difflib's
//! autojunk would start ignoring frequent characters (spaces, vowels) once a
//! title reaches 200 chars, which skews the ratio for long titles.

use std::collections::HashMap;
use tracing::debug;

/// Default acceptance threshold
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

/// Accepts a scraped title when it is similar enough to the requested one.
#[derive(Debug, Clone, Copy)]
pub struct TitleMatcher {
    threshold: f64,
}

impl TitleMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_match(&self, original: &str, scraped: &str) -> bool {
        is_match(original, scraped, self.threshold)
    }
}

impl Default for TitleMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

/// Lowercase and trim both titles, then compare `similarity` to `threshold`.
pub fn is_match(original: &str, scraped: &str, threshold: f64) -> bool {
    let original = normalize(original);
    let scraped = normalize(scraped);
    let ratio = similarity(&original, &scraped);
    debug!(ratio, threshold, "Title similarity");
    ratio >= threshold
}

fn normalize(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Gestalt similarity ratio in `[0, 1]`. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Total size of all matching blocks between `a` and `b`.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut positions: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        positions.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, &positions, (alo, ahi), (blo, bhi));
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block inside `a[alo..ahi]` / `b[blo..bhi]`.
///
/// Ties resolve to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    positions: &HashMap<char, Vec<usize>>,
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    // run length of the match ending at b[j], for the previous row of a
    let mut run_ending: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_run = HashMap::new();
        if let Some(js) = positions.get(c) {
            for &j in js {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let prev = match j.checked_sub(1) {
                    Some(p) => run_ending.get(&p).copied().unwrap_or(0),
                    None => 0,
                };
                let k = prev + 1;
                next_run.insert(j, k);
                if k > best_k {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_k = k;
                }
            }
        }
        run_ending = next_run;
    }

    (best_i, best_j, best_k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert!(is_match(
            "Quantum Control of Qubits",
            "quantum control of qubits ",
            0.8
        ));
    }

    #[test]
    fn test_unrelated_title_rejected() {
        assert!(!is_match(
            "Quantum Control of Qubits",
            "Unrelated Paper Title",
            0.8
        ));
    }

    #[test]
    fn test_similarity_known_values() {
        assert!((similarity("abcd", "bcde") - 0.75).abs() < 1e-9);
        assert!((similarity("abcd", "abcd abcd") - 8.0 / 13.0).abs() < 1e-9);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_minor_punctuation_difference_accepted() {
        let matcher = TitleMatcher::default();
        assert!(matcher.is_match(
            "Hybrid quantum circuits: Superconducting circuits interacting with other quantum systems",
            "Hybrid quantum circuits - superconducting circuits interacting with other quantum systems"
        ));
    }

    #[test]
    fn test_long_titles_count_every_character() {
        let long = "quantum ".repeat(30);
        let mut variant: Vec<char> = long.chars().collect();
        variant[120] = 'x';
        let variant: String = variant.into_iter().collect();

        assert!(long.len() > 200);
        assert!((similarity(&long, &variant) - 478.0 / 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // ratio("abcd", "bcde") == 0.75
        assert!(is_match("abcd", "bcde", 0.75));
        assert!(!is_match("abcd", "bcde", 0.76));
    }
}
