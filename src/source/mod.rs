//! Detail source boundary.
//!
//! The pipeline only needs two operations from the portal: find and enter a
//! record for a title, then read the entered record's fields. Anything that
//! can do that (the HTTP portal client in [`wos`], or an in-memory fake in
//! tests) plugs in through [`DetailSource`].

pub mod address;
pub mod wos;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use address::AuthorAddress;

/// Placeholder for list and address fields that could not be read
pub const NONE_SENTINEL: &str = "None";

/// Placeholder DOI when the field could not be read
pub const MISSING_DOI: &str = "DOI not retrieved";

/// Placeholder abstract when the field could not be read
pub const MISSING_ABSTRACT: &str = "Abstract not retrieved";

/// Title substrings that mark commentary, errata and supplements.
pub const CANDIDATE_MARKERS: &[&str] = &["arXiv", "Comment", "Information", "Supplementary"];

/// Result of a title search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// Nothing found; the row cannot be enriched
    NoResults,
    /// Exactly one hit, entered directly
    SingleResult,
    /// Several hits; the first candidate surviving the marker filter was entered
    MultipleResults { candidates: usize },
}

impl MatchState {
    pub fn entered(&self) -> bool {
        !matches!(self, MatchState::NoResults)
    }
}

/// Fields read from an entered record page.
///
/// Each field falls back to its sentinel independently; a record with some
/// sentinels is still a usable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetailRecord {
    /// Title shown on the record page (empty when unreadable)
    pub title: String,
    /// Journal impact factor as displayed
    pub impact_factor: Option<String>,
    pub author_keywords: Vec<String>,
    pub keywords_plus: Vec<String>,
    pub doi: String,
    pub address: AuthorAddress,
    pub abstract_text: String,
}

impl Default for RawDetailRecord {
    fn default() -> Self {
        Self {
            title: String::new(),
            impact_factor: None,
            author_keywords: vec![NONE_SENTINEL.to_string()],
            keywords_plus: vec![NONE_SENTINEL.to_string()],
            doi: MISSING_DOI.to_string(),
            address: AuthorAddress::unresolved(),
            abstract_text: MISSING_ABSTRACT.to_string(),
        }
    }
}

/// A search result link on the summary page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub href: String,
}

/// First candidate whose title carries none of the [`CANDIDATE_MARKERS`].
///
/// Ties are not disambiguated further: the first survivor wins.
pub fn select_candidate(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .find(|c| !CANDIDATE_MARKERS.iter().any(|m| c.title.contains(m)))
}

/// The two portal capabilities the pipeline relies on.
///
/// `search` enters the best record for `title`; `fetch_details` reads the
/// currently entered record. Both may fail transiently.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn search(&self, title: &str) -> Result<MatchState>;

    async fn fetch_details(&self, last_name: &str) -> Result<RawDetailRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            href: format!("/record/{}", title.len()),
        }
    }

    #[test]
    fn test_select_candidate_skips_markers() {
        let candidates = vec![
            candidate("Comment on Quantum Control of Qubits"),
            candidate("Supporting Information: Quantum Control"),
            candidate("Quantum Control of Qubits"),
            candidate("Quantum Control of Qubits (extended)"),
        ];
        let chosen = select_candidate(&candidates).expect("a survivor");
        assert_eq!(chosen.title, "Quantum Control of Qubits");
    }

    #[test]
    fn test_select_candidate_none_left() {
        let candidates = vec![candidate("arXiv preprint"), candidate("Supplementary Material")];
        assert!(select_candidate(&candidates).is_none());
        assert!(select_candidate(&[]).is_none());
    }

    #[test]
    fn test_default_record_uses_sentinels() {
        let record = RawDetailRecord::default();
        assert_eq!(record.author_keywords, vec!["None"]);
        assert_eq!(record.doi, MISSING_DOI);
        assert_eq!(record.address.country, NONE_SENTINEL);
        assert!(!MatchState::NoResults.entered());
        assert!(MatchState::MultipleResults { candidates: 3 }.entered());
    }
}
