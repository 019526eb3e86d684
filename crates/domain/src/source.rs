//! Monitored sources.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How content is retrieved from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchType {
    Html,
    Pdf,
}

impl FetchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for FetchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cadence under which a source is checked.
///
/// `Custom` sources are never selected by the built-in daily/weekly
/// runs; they are executed only through an external trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFrequency {
    Daily,
    Weekly,
    Custom,
}

impl CheckFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for CheckFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A monitored URL with its route metadata and failure counters.
///
/// Timestamps, counters and error fields are mutated only by the core
/// pipeline; everything else is set at creation time by whoever seeds
/// the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    /// ISO-3166 alpha-2, uppercase.
    pub country: String,
    /// Free-form short label, e.g. "Student", "Work", "Both".
    pub visa_type: String,
    pub url: String,
    /// Human-readable name.
    pub name: String,
    pub fetch_type: FetchType,
    pub check_frequency: CheckFrequency,
    pub is_active: bool,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_change_detected_at: Option<DateTime<Utc>>,
    /// Free-form per-source configuration consumed by handlers.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub consecutive_fetch_failures: u32,
    #[serde(default)]
    pub consecutive_email_failures: u32,
    #[serde(default)]
    pub last_fetch_error: Option<String>,
    #[serde(default)]
    pub last_email_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Construct a validated source with a fresh id and zeroed counters.
    ///
    /// Country codes are normalized to uppercase.
    pub fn new(
        country: &str,
        visa_type: &str,
        url: &str,
        name: &str,
        fetch_type: FetchType,
        check_frequency: CheckFrequency,
    ) -> Result<Self> {
        let country = validate_country_code(country)?;
        validate_source_url(url)?;
        if visa_type.is_empty() || visa_type.len() > 50 {
            return Err(Error::Validation(format!(
                "visa_type must be 1..=50 characters, got {}",
                visa_type.len()
            )));
        }
        if name.is_empty() || name.len() > 255 {
            return Err(Error::Validation(format!(
                "name must be 1..=255 characters, got {}",
                name.len()
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            country,
            visa_type: visa_type.to_owned(),
            url: url.to_owned(),
            name: name.to_owned(),
            fetch_type,
            check_frequency,
            is_active: true,
            last_checked_at: None,
            last_change_detected_at: None,
            config: HashMap::new(),
            consecutive_fetch_failures: 0,
            consecutive_email_failures: 0,
            last_fetch_error: None,
            last_email_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Typed view over the free-form config map.
    pub fn overrides(&self) -> SourceOverrides {
        SourceOverrides::from_config(&self.config)
    }
}

/// Validate a 2-character alphabetic country code and normalize it to
/// uppercase.
pub fn validate_country_code(code: &str) -> Result<String> {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::Validation(format!(
            "country code must be exactly 2 letters, got {code:?}"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

fn validate_source_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "url must start with http:// or https://, got {url:?}"
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SourceOverrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The per-source options handlers recognize, pulled out of the
/// free-form config map. Unrecognized keys are preserved in `extra`.
#[derive(Debug, Clone, Default)]
pub struct SourceOverrides {
    /// Outbound User-Agent override.
    pub user_agent: Option<String>,
    /// Local PDF path used instead of downloading the URL.
    pub file_path: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl SourceOverrides {
    pub fn from_config(config: &HashMap<String, serde_json::Value>) -> Self {
        let mut overrides = Self::default();
        for (key, value) in config {
            match key.as_str() {
                "user_agent" => overrides.user_agent = value.as_str().map(str::to_owned),
                "file_path" => overrides.file_path = value.as_str().map(str::to_owned),
                _ => {
                    overrides.extra.insert(key.clone(), value.clone());
                }
            }
        }
        overrides
    }
}
