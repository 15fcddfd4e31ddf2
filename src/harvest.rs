//! Baseline harvest: an author's publication list from Google Scholar.
//!
//! Pages of `author:"<name>"` results are fetched over plain HTTP with the
//! shared cookie jar, filtered, and written as the `*_original.csv` table the
//! enrichment run starts from.

use crate::checkpoint::{write_table_atomic, CheckpointTable, PublicationRow, TargetFields};
use crate::config::HarvestConfig;
use crate::cookies::{cookie_header, Cookie};
use crate::error::{EnrichError, Result};
use crate::http::{build_http_client, fetch_page_with_cookies, looks_like_captcha, parse_base_url};
use crate::pacing::{Sleeper, TokioSleeper};
use crate::paths::OutputPaths;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Pass-through columns of the harvested table, after `Title`.
pub const HARVEST_COLUMNS: [&str; 4] = ["Publication Year", "Authors", "Journal", "Citations"];

/// Results per Scholar page
const PAGE_SIZE: u32 = 10;

/// Log harvest progress every this many entries
const PROGRESS_INTERVAL: usize = 10;

/// One publication from a Scholar result page.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ScholarEntry {
    pub title: String,
    pub authors: String,
    /// Publication year; empty when the listing shows none
    pub year: String,
    pub journal: String,
    pub citations: String,
}

/// Scholar client for author publication lists.
pub struct Harvester<Z: Sleeper = TokioSleeper> {
    client: reqwest::Client,
    base_url: Url,
    cookie_header: String,
    config: HarvestConfig,
    sleeper: Z,
}

impl Harvester<TokioSleeper> {
    pub fn new(config: &HarvestConfig, cookies: &[Cookie]) -> Result<Self> {
        Self::with_sleeper(config, cookies, TokioSleeper)
    }
}

impl<Z: Sleeper> Harvester<Z> {
    pub fn with_sleeper(config: &HarvestConfig, cookies: &[Cookie], sleeper: Z) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = build_http_client(config.proxy.as_deref(), Duration::from_secs(30))?;
        let host = base_url.host_str().unwrap_or_default();
        let cookie_header = cookie_header(cookies, host);

        if cookie_header.is_empty() {
            warn!("No cookies loaded for {}. Import them with 'rustwos cookies import'.", host);
        } else {
            info!("Using stored cookies for {}", host);
        }

        Ok(Self {
            client,
            base_url,
            cookie_header,
            config: config.clone(),
            sleeper,
        })
    }

    /// Fetch every configured result page for `author`, unfiltered.
    ///
    /// A failing page is logged and skipped; a CAPTCHA aborts the harvest.
    pub async fn fetch_publications(&self, author: &str) -> Result<Vec<ScholarEntry>> {
        info!(
            author,
            url = %self.base_url,
            pages = ?self.config.pages,
            "Starting publication harvest"
        );

        let mut entries = Vec::new();
        for &page in &self.config.pages {
            let start = page.saturating_sub(1) * PAGE_SIZE;
            let url = build_search_url(&self.base_url, author, start)?;
            debug!(page, url = %url, "Fetching page");

            // Random delay to avoid detection
            let delay = rand::random::<u64>() % 1500 + 500;
            self.sleeper.sleep(Duration::from_millis(delay)).await;

            match fetch_page_with_cookies(&self.client, &url, &self.cookie_header).await {
                Ok(html) => {
                    if looks_like_captcha(&html) {
                        warn!(page, "CAPTCHA detected");
                        return Err(EnrichError::Captcha);
                    }

                    let page_entries = parse_result_items(&html)?;
                    info!(page, count = page_entries.len(), "Parsed results");
                    if page_entries.is_empty() {
                        break;
                    }
                    entries.extend(page_entries);
                }
                Err(e) => {
                    error!(page, error = %e, "Failed to fetch page");
                }
            }
        }

        info!(total = entries.len(), "Harvest fetch complete");
        Ok(entries)
    }

    /// Fetch, filter and write `paths.original`.
    pub async fn harvest(&self, author: &str, paths: &OutputPaths) -> Result<CheckpointTable> {
        let entries = self.fetch_publications(author).await?;
        let kept = filter_entries(entries, &self.config.marker_keywords);
        if kept.is_empty() {
            warn!(author, "No publications survived filtering");
        }

        let table = entries_to_table(kept);
        paths.ensure_dir()?;
        write_table_atomic(&table, &paths.original)?;
        info!(path = %paths.original.display(), rows = table.len(), "Baseline table written");
        Ok(table)
    }
}

/// Scholar search URL for one result page of `author`.
fn build_search_url(base_url: &Url, author: &str, start: u32) -> Result<Url> {
    let mut url = base_url
        .join("/scholar")
        .map_err(|e| EnrichError::Config(format!("Invalid base URL: {}", e)))?;

    {
        let mut params = url.query_pairs_mut();
        params.append_pair("q", &format!("author:\"{}\"", author));
        params.append_pair("hl", "en-US"); // Force English locale for consistent parsing
        params.append_pair("start", &start.to_string());
        params.append_pair("as_sdt", "0,5");
    }

    Ok(url)
}

/// Parse a Scholar result page into entries; items without a title are skipped.
pub fn parse_result_items(html: &str) -> Result<Vec<ScholarEntry>> {
    let document = Html::parse_document(html);

    let item_selector =
        Selector::parse("div.gs_r.gs_or.gs_scl").map_err(|e| EnrichError::Parse(e.to_string()))?;
    let title_selector =
        Selector::parse("h3.gs_rt").map_err(|e| EnrichError::Parse(e.to_string()))?;
    let link_selector =
        Selector::parse("h3.gs_rt a").map_err(|e| EnrichError::Parse(e.to_string()))?;
    let meta_selector =
        Selector::parse("div.gs_a").map_err(|e| EnrichError::Parse(e.to_string()))?;
    let cite_selector =
        Selector::parse("div.gs_fl a").map_err(|e| EnrichError::Parse(e.to_string()))?;

    let year_regex =
        Regex::new(r"\b(19|20)\d{2}\b").map_err(|e| EnrichError::Parse(e.to_string()))?;
    let cite_regex =
        Regex::new(r"Cited by\s*(\d+)").map_err(|e| EnrichError::Parse(e.to_string()))?;

    let mut entries = Vec::new();

    for item in document.select(&item_selector) {
        let mut entry = ScholarEntry::default();

        if let Some(link) = item.select(&link_selector).next() {
            entry.title = link.text().collect::<String>().trim().to_string();
        } else if let Some(title_elem) = item.select(&title_selector).next() {
            entry.title = title_elem.text().collect::<String>().trim().to_string();
        }

        // "A Author, B Author - Journal, 2013 - publisher"
        if let Some(meta_elem) = item.select(&meta_selector).next() {
            let meta_text = meta_elem.text().collect::<String>();
            let parts: Vec<&str> = meta_text.split(" - ").collect();

            if let Some(authors) = parts.first() {
                entry.authors = authors.trim().to_string();
            }

            if let Some(venue_year) = parts.get(1) {
                if let Some(year_match) = year_regex.find(venue_year) {
                    entry.year = year_match.as_str().to_string();
                    entry.journal = venue_year[..year_match.start()]
                        .trim()
                        .trim_end_matches(',')
                        .to_string();
                } else {
                    entry.journal = venue_year.trim().to_string();
                }
            }
        }

        entry.citations = item
            .select(&cite_selector)
            .filter(|link| link.value().attr("href").unwrap_or("").contains("cites="))
            .find_map(|link| {
                let text = link.text().collect::<String>();
                cite_regex
                    .captures(&text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .unwrap_or_else(|| "0".to_string());

        if !entry.title.is_empty() {
            entries.push(entry);
        }
    }

    Ok(entries)
}

/// Drops entries without a year, titles containing a marker keyword
/// (case-insensitive) and repeated titles. Order is preserved.
pub fn filter_entries(entries: Vec<ScholarEntry>, marker_keywords: &[String]) -> Vec<ScholarEntry> {
    let markers: Vec<String> = marker_keywords.iter().map(|k| k.to_lowercase()).collect();
    let total = entries.len();
    let mut seen = HashSet::new();
    let mut kept = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let lowered = entry.title.to_lowercase();
        let rejected = entry.year.trim().is_empty()
            || markers.iter().any(|m| lowered.contains(m.as_str()))
            || seen.contains(&entry.title);

        if rejected {
            debug!(title = %entry.title, "Dropped harvested entry");
        } else {
            seen.insert(entry.title.clone());
            kept.push(entry);
        }

        let done = index + 1;
        if done % PROGRESS_INTERVAL == 0 || done == total {
            info!(
                "[progress] checked {}/{} | kept {} | {:.1}% done",
                done,
                total,
                kept.len(),
                done as f64 / total as f64 * 100.0
            );
        }
    }

    kept
}

/// Baseline table: sequence `1..=N`, title, harvest columns, empty targets.
pub fn entries_to_table(entries: Vec<ScholarEntry>) -> CheckpointTable {
    let rows = entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| PublicationRow {
            sequence_number: i as u64 + 1,
            title: entry.title,
            extra: vec![entry.year, entry.authors, entry.journal, entry.citations],
            fields: TargetFields::default(),
        })
        .collect();
    CheckpointTable::new(HARVEST_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}
