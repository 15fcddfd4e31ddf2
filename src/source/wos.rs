//! Web of Science portal client.
//!
//! The portal renders with JavaScript, so `base_url` is expected to point at a
//! front-end that serves rendered HTML (the portal itself behind a rendering
//! proxy, or a mirror). Search results and record pages are then parsed with
//! `scraper` using the portal's `data-ta` hooks.

use super::address::resolve_address;
use super::{select_candidate, Candidate, DetailSource, MatchState, RawDetailRecord};
use crate::config::PortalConfig;
use crate::cookies::{cookie_header, Cookie};
use crate::error::{EnrichError, OptionExt, Result};
use crate::http::{build_http_client, fetch_page_with_cookies, looks_like_captcha, parse_base_url};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Basic search across all databases
const SEARCH_PATH: &str = "/wos/alldb/basic-search";

/// Parsed search summary page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryPage {
    pub result_count: usize,
    pub candidates: Vec<Candidate>,
}

/// Portal-backed [`DetailSource`].
pub struct WosSource {
    client: reqwest::Client,
    base_url: Url,
    cookie_header: String,
    /// HTML of the record page entered by the last successful search
    entered: Mutex<Option<String>>,
}

impl WosSource {
    pub fn new(config: &PortalConfig, cookies: &[Cookie]) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = build_http_client(
            config.proxy.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )?;
        let host = base_url.host_str().unwrap_or_default();
        let cookie_header = cookie_header(cookies, host);
        if cookie_header.is_empty() {
            warn!(host, "No portal cookies loaded; anonymous sessions are throttled quickly");
        }

        Ok(Self {
            client,
            base_url,
            cookie_header,
            entered: Mutex::new(None),
        })
    }

    fn search_url(&self, title: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(SEARCH_PATH)
            .map_err(|e| EnrichError::Config(format!("Invalid search URL: {}", e)))?;
        url.query_pairs_mut().append_pair("q", title);
        Ok(url)
    }

    fn set_entered(&self, html: Option<String>) {
        if let Ok(mut entered) = self.entered.lock() {
            *entered = html;
        }
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let html = fetch_page_with_cookies(&self.client, url, &self.cookie_header).await?;
        if looks_like_captcha(&html) {
            warn!(url = %url, "CAPTCHA detected");
            return Err(EnrichError::Captcha);
        }
        Ok(html)
    }
}

#[async_trait]
impl DetailSource for WosSource {
    async fn search(&self, title: &str) -> Result<MatchState> {
        self.set_entered(None);

        let url = self.search_url(title)?;
        debug!(url = %url, "Searching portal");
        let html = self.fetch(&url).await?;
        let summary = parse_summary_page(&html)?;
        info!(count = summary.result_count, "Search results");

        let (state, chosen) = match summary.result_count {
            0 => return Ok(MatchState::NoResults),
            1 => (
                MatchState::SingleResult,
                Some(summary.candidates.first().ok_or_parse("result link missing")?),
            ),
            n => (
                MatchState::MultipleResults { candidates: n },
                select_candidate(&summary.candidates),
            ),
        };

        let Some(chosen) = chosen else {
            warn!("No usable candidate among search results");
            return Ok(MatchState::NoResults);
        };

        let record_url = self
            .base_url
            .join(&chosen.href)
            .map_err(|e| EnrichError::Parse(format!("Bad record link '{}': {}", chosen.href, e)))?;
        debug!(url = %record_url, title = %chosen.title, "Entering record");
        let record_html = self.fetch(&record_url).await?;
        self.set_entered(Some(record_html));
        Ok(state)
    }

    async fn fetch_details(&self, last_name: &str) -> Result<RawDetailRecord> {
        let html = self
            .entered
            .lock()
            .map_err(|_| EnrichError::Portal("record state lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| EnrichError::Portal("no record entered".to_string()))?;
        parse_record_page(&html, last_name)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| EnrichError::Parse(e.to_string()))
}

/// Text nodes concatenated as-is, trimmed.
fn joined_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text nodes trimmed and joined with single spaces.
fn spaced_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(joined_text)
        .filter(|t| !t.is_empty())
}

fn all_texts(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(joined_text)
        .filter(|t| !t.is_empty())
        .collect()
}

/// First letter upper-case, the rest lower-case.
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Parse the search summary: result count and title links.
///
/// A missing count element reads as zero results.
pub fn parse_summary_page(html: &str) -> Result<SummaryPage> {
    let document = Html::parse_document(html);
    let count_selector = selector("span.brand-blue")?;
    let link_selector = selector(r#"a[data-ta="summary-record-title-link"]"#)?;

    let result_count = first_text(&document, &count_selector)
        .and_then(|t| t.replace(',', "").parse::<usize>().ok())
        .unwrap_or(0);

    let candidates = document
        .select(&link_selector)
        .map(|link| Candidate {
            title: joined_text(link),
            href: link.value().attr("href").unwrap_or("").to_string(),
        })
        .filter(|c| !c.href.is_empty())
        .collect();

    Ok(SummaryPage {
        result_count,
        candidates,
    })
}

/// Parse an entered record page.
///
/// Missing fields keep the sentinels of [`RawDetailRecord::default`].
pub fn parse_record_page(html: &str, last_name: &str) -> Result<RawDetailRecord> {
    let document = Html::parse_document(html);
    let mut record = RawDetailRecord::default();

    match first_text(&document, &selector("h2.title")?) {
        Some(title) => record.title = title,
        None => warn!("Record title not found"),
    }

    let keywords = all_texts(&document, &selector(r#"[id*="FRkeywordsTa-authorKeywordLink"]"#)?);
    if !keywords.is_empty() {
        record.author_keywords = keywords;
    }

    let keywords_plus: Vec<String> =
        all_texts(&document, &selector(r#"[id*="FRkeywordsTa-keyWordsPlusLink"]"#)?)
            .iter()
            .map(|k| capitalize(k))
            .collect();
    if !keywords_plus.is_empty() {
        record.keywords_plus = keywords_plus;
    }

    if let Some(doi) = first_text(&document, &selector(r#"span[data-ta="FullRTa-DOI"]"#)?) {
        record.doi = doi;
    }

    record.impact_factor = first_text(&document, &selector("span.font-size-26")?);

    if let Some(text) = first_text(
        &document,
        &selector(r#"div[data-ta="FullRTa-abstract-basic"]"#)?,
    ) {
        record.abstract_text = text;
    }

    let author_entries: Vec<String> = document
        .select(&selector(r#"span.cdx-grid-data span.value[id^="author-"]"#)?)
        .map(spaced_text)
        .collect();
    let addresses: HashMap<String, String> = document
        .select(&selector(r#"[id^="address_"]"#)?)
        .filter_map(|el| {
            let id = el.value().id()?;
            let reference = id.strip_prefix("address_")?;
            Some((reference.to_string(), spaced_text(el)))
        })
        .collect();
    record.address = resolve_address(&author_entries, &addresses, last_name);

    debug!(
        title = %record.title,
        keywords = record.author_keywords.len(),
        addresses = addresses.len(),
        "Parsed record page"
    );
    Ok(record)
}
