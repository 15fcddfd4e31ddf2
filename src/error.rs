//! Custom error types for rustwos.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, EnrichError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for rustwos operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Portal navigation failed (no entered record, unexpected page)
    #[error("Portal error: {0}")]
    Portal(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external service (HTTP 429); retried with the normal backoff
    #[error("Rate limited by remote service")]
    RateLimited,

    /// External service returned an error status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// CAPTCHA detected
    #[error("CAPTCHA detected, please refresh cookies")]
    Captcha,

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Checkpoint could not be persisted; the previous file is left in place
    #[error("Checkpoint write to {path} failed: {source}")]
    Storage {
        /// Destination checkpoint path
        path: String,
        /// Underlying cause
        #[source]
        source: Box<EnrichError>,
    },
}

impl EnrichError {
    /// Whether this error came from the checkpoint storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, EnrichError::Storage { .. })
    }
}

/// Result type alias using `EnrichError`
pub type Result<T> = std::result::Result<T, EnrichError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| EnrichError::Parse(msg.to_string()))
    }
}
