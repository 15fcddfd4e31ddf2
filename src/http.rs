//! Shared HTTP plumbing for the Scholar and portal clients.

use crate::error::{EnrichError, Result};
use std::time::Duration;
use url::Url;

/// User agent string for requests
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Build HTTP client with optional proxy
pub fn build_http_client(proxy: Option<&str>, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            EnrichError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| EnrichError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Parse a configured base URL, dropping any trailing slash.
pub fn parse_base_url(base: &str) -> Result<Url> {
    Url::parse(base.trim_end_matches('/'))
        .map_err(|e| EnrichError::Config(format!("Invalid base URL '{}': {}", base, e)))
}

/// Fetch page content, sending `cookie_header` when non-empty.
pub async fn fetch_page_with_cookies(
    client: &reqwest::Client,
    url: &Url,
    cookie_header: &str,
) -> Result<String> {
    let mut request = client
        .get(url.as_str())
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8")
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Cache-Control", "no-cache")
        .header("Pragma", "no-cache")
        .header("Sec-Fetch-Dest", "document")
        .header("Sec-Fetch-Mode", "navigate")
        .header("Sec-Fetch-Site", "none")
        .header("Sec-Fetch-User", "?1")
        .header("Upgrade-Insecure-Requests", "1");

    if !cookie_header.is_empty() {
        request = request.header("Cookie", cookie_header);
    }

    let response = request.send().await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(EnrichError::RateLimited);
    }

    if !status.is_success() {
        return Err(EnrichError::Api {
            code: status.as_u16() as i32,
            message: format!("HTTP error: {}", status),
        });
    }

    response.text().await.map_err(EnrichError::Network)
}

/// Whether a page is an anti-automation challenge instead of content.
pub fn looks_like_captcha(html: &str) -> bool {
    html.contains("Solving the above CAPTCHA")
        || html.contains("unusual traffic")
        || html.contains("g-recaptcha")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url() {
        let url = parse_base_url("https://scholar.google.com/").expect("valid url");
        assert_eq!(url.host_str(), Some("scholar.google.com"));
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_captcha_detection() {
        assert!(looks_like_captcha("<p>Our systems have detected unusual traffic</p>"));
        assert!(!looks_like_captcha("<html><body>results</body></html>"));
    }
}
