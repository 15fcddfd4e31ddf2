//! Author address resolution on a record page.
//!
//! Author entries look like `Nori, Franco [1] [3] ;` and point into a
//! numbered address list (`1 RIKEN, Theoret Quantum Phys Lab, Wako, Japan`).
//! Policy: the first bracketed reference of the first entry containing the
//! last name wins; without any bracket the first address is used.

use super::NONE_SENTINEL;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Reference used when an author entry carries no bracketed index
pub const DEFAULT_ADDRESS_REF: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorAddress {
    pub institution: String,
    pub country: String,
}

impl AuthorAddress {
    pub fn unresolved() -> Self {
        Self {
            institution: NONE_SENTINEL.to_string(),
            country: NONE_SENTINEL.to_string(),
        }
    }
}

/// Address reference number from an author entry's text.
pub fn extract_address_number(author_text: &str) -> String {
    let mut parts: Vec<&str> = author_text.split_whitespace().collect();
    if parts.last().is_some_and(|p| p.ends_with(';')) {
        parts.pop();
    }
    parts
        .into_iter()
        .find(|p| p.contains('[') && p.contains(']'))
        .map(|p| p.trim_matches(|c| c == '[' || c == ']').to_string())
        .unwrap_or_else(|| DEFAULT_ADDRESS_REF.to_string())
}

/// Split an address block into institution and country.
///
/// Institution: the first comma segment minus its leading token (the list
/// index). Country: the last segment, when there are at least two.
pub fn parse_address(address_text: &str) -> AuthorAddress {
    let segments: Vec<&str> = address_text.split(',').collect();

    let first = segments.first().map(|s| s.trim()).unwrap_or_default();
    let institution = match first.split_once(char::is_whitespace) {
        Some((_, rest)) => rest.trim_start().replace('\n', ""),
        None if !first.is_empty() => first.to_string(),
        None => return AuthorAddress::unresolved(),
    };

    let country = if segments.len() >= 2 {
        segments
            .last()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| NONE_SENTINEL.to_string())
    } else {
        NONE_SENTINEL.to_string()
    };

    AuthorAddress {
        institution,
        country,
    }
}

/// Find the entry naming `last_name` and resolve its address.
///
/// `addresses` maps reference numbers to address text. Unknown authors or
/// dangling references resolve to the `None` sentinel.
pub fn resolve_address(
    author_entries: &[String],
    addresses: &HashMap<String, String>,
    last_name: &str,
) -> AuthorAddress {
    let Some(entry) = author_entries.iter().find(|e| e.contains(last_name)) else {
        debug!(last_name, "No author entry matches last name");
        return AuthorAddress::unresolved();
    };

    let reference = extract_address_number(entry);
    match addresses.get(&reference) {
        Some(text) => parse_address(text),
        None => {
            debug!(reference = %reference, "Address reference not found");
            AuthorAddress::unresolved()
        }
    }
}
