//! Fetcher registry.
//!
//! Maps a logical key like `de_bmi_student` to a handler implementing
//! [`SourceFetcher`]. The registry is a value built once at init and
//! passed by reference to the scheduler; handlers are registered from
//! a typed table rather than discovered by dynamic loading, but the
//! key naming convention of the plugin directory is kept so operator
//! tooling and logs stay stable.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pw_domain::{Error, FetchResult, FetchType, Result, Source, SourceOverrides};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Source type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Content kind a handler produces. Sources only ever declare `html`
/// or `pdf`; `api` exists for handlers that talk to structured
/// endpoints and therefore never match a plain source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Html,
    Pdf,
    Api,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Api => "api",
        }
    }

    pub fn matches(self, fetch_type: FetchType) -> bool {
        matches!(
            (self, fetch_type),
            (Self::Html, FetchType::Html) | (Self::Pdf, FetchType::Pdf)
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fetcher trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every source handler implements.
///
/// `fetch` must not fail: every failure is reported through the
/// returned envelope.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str, overrides: &SourceOverrides) -> FetchResult;

    fn source_type(&self) -> SourceType;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Key convention
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reserved names that are never handler keys.
const SKIPPED_NAMES: [&str; 2] = ["base", "example_template"];

/// Parsed `{country}_{agency}_{visa}` registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherKey {
    /// Lowercase 2-letter country segment.
    pub country: String,
    /// Middle segments joined back with `_`.
    pub agency: String,
    /// Lowercase trailing segment.
    pub visa: String,
}

impl FetcherKey {
    /// Parse a key following the naming convention. Names with fewer
    /// than three segments and the reserved names are rejected.
    pub fn parse(name: &str) -> Result<Self> {
        if SKIPPED_NAMES.contains(&name) {
            return Err(Error::Validation(format!(
                "reserved handler name: {name}"
            )));
        }
        let segments: Vec<&str> = name.split('_').collect();
        if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::Validation(format!(
                "handler name {name:?} does not follow country_agency_visa convention"
            )));
        }
        Ok(Self {
            country: segments[0].to_ascii_lowercase(),
            agency: segments[1..segments.len() - 1].join("_"),
            visa: segments[segments.len() - 1].to_ascii_lowercase(),
        })
    }

    /// Whether this key covers the given source route. The country is
    /// compared case-insensitively; a source labeled `Both` accepts
    /// any visa segment, and a `both` visa segment accepts any source.
    pub fn matches_route(&self, source: &Source) -> bool {
        if self.country != source.country.to_ascii_lowercase() {
            return false;
        }
        source.visa_type.eq_ignore_ascii_case("both")
            || self.visa == "both"
            || self.visa == source.visa_type.to_ascii_lowercase()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Registered {
    key: FetcherKey,
    fetcher: Arc<dyn SourceFetcher>,
}

/// Holds all registered handlers, ordered by key for deterministic
/// first-match selection.
pub struct FetcherRegistry {
    entries: BTreeMap<String, Registered>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a handler under a convention-following name.
    pub fn register(&mut self, name: &str, fetcher: Arc<dyn SourceFetcher>) -> Result<()> {
        let key = FetcherKey::parse(name)?;
        tracing::info!(
            name,
            source_type = fetcher.source_type().as_str(),
            "registered fetcher"
        );
        self.entries
            .insert(name.to_owned(), Registered { key, fetcher });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered handler names in deterministic order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Select the handler for a source: route match plus source-type
    /// match, first by key order when several qualify.
    pub fn fetcher_for(&self, source: &Source) -> Option<(&str, Arc<dyn SourceFetcher>)> {
        self.entries.iter().find_map(|(name, entry)| {
            (entry.key.matches_route(source)
                && entry.fetcher.source_type().matches(source.fetch_type))
            .then(|| (name.as_str(), Arc::clone(&entry.fetcher)))
        })
    }
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}
