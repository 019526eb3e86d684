//! The fetch envelope.
//!
//! Handlers and extractors never propagate errors across the component
//! boundary; every failure is folded into a [`FetchResult`] whose
//! `error_message` carries a [`FetchErrorType`] tag prefix.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of fetch failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorType {
    /// DNS, connect, TLS, non-retryable HTTP, robots denial.
    NetworkError,
    /// Corrupted HTML/PDF.
    ParseError,
    /// Encrypted PDF, protected resource.
    AuthenticationError,
    /// HTTP 404 or missing local file.
    NotFoundError,
    /// Any deadline exceeded at HTTP or source level.
    TimeoutError,
    UnknownError,
}

impl FetchErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::ParseError => "parse_error",
            Self::AuthenticationError => "authentication_error",
            Self::NotFoundError => "not_found_error",
            Self::TimeoutError => "timeout_error",
            Self::UnknownError => "unknown_error",
        }
    }

    const ALL: [Self; 6] = [
        Self::NetworkError,
        Self::ParseError,
        Self::AuthenticationError,
        Self::NotFoundError,
        Self::TimeoutError,
        Self::UnknownError,
    ];
}

impl fmt::Display for FetchErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FetchResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of one source fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    /// Extracted text content; empty on failure.
    #[serde(default)]
    pub raw_text: String,
    /// "html", "pdf" or "text".
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
    /// Page title, last-modified hints, enrichment tags, etc.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub success: bool,
    /// `<error_type>: <message>` when `success` is false.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl FetchResult {
    pub fn success(raw_text: String, content_type: &str) -> Self {
        Self {
            raw_text,
            content_type: content_type.to_owned(),
            fetched_at: Utc::now(),
            metadata: HashMap::new(),
            success: true,
            error_message: None,
        }
    }

    pub fn failure(content_type: &str, kind: FetchErrorType, message: impl fmt::Display) -> Self {
        Self {
            raw_text: String::new(),
            content_type: content_type.to_owned(),
            fetched_at: Utc::now(),
            metadata: HashMap::new(),
            success: false,
            error_message: Some(format!("{kind}: {message}")),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Insert a string metadata tag.
    pub fn tag(&mut self, key: &str, value: impl Into<String>) {
        self.metadata
            .insert(key.to_owned(), serde_json::Value::String(value.into()));
    }

    /// Recover the taxonomy class from the error message prefix.
    /// Untagged messages classify as `unknown_error`.
    pub fn error_kind(&self) -> Option<FetchErrorType> {
        let message = self.error_message.as_deref()?;
        Some(
            FetchErrorType::ALL
                .into_iter()
                .find(|kind| message.starts_with(kind.as_str()))
                .unwrap_or(FetchErrorType::UnknownError),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_prefixes_error_tag() {
        let result = FetchResult::failure("html", FetchErrorType::NotFoundError, "HTTP 404");
        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("not_found_error: HTTP 404")
        );
        assert_eq!(result.error_kind(), Some(FetchErrorType::NotFoundError));
    }

    #[test]
    fn success_has_no_error() {
        let result = FetchResult::success("text".into(), "html");
        assert!(result.success);
        assert!(result.error_message.is_none());
        assert!(result.error_kind().is_none());
    }

    #[test]
    fn untagged_error_classifies_as_unknown() {
        let mut result = FetchResult::failure("pdf", FetchErrorType::ParseError, "bad xref");
        result.error_message = Some("something odd".into());
        assert_eq!(result.error_kind(), Some(FetchErrorType::UnknownError));
    }

    #[test]
    fn tags_land_in_metadata() {
        let mut result = FetchResult::success("text".into(), "html");
        result.tag("agency", "UKVI");
        assert_eq!(result.metadata["agency"], serde_json::json!("UKVI"));
    }
}
