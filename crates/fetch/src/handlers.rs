//! Built-in source handlers.
//!
//! Each handler is a small record over the shared HTML/PDF machinery
//! plus route enrichment applied only when the underlying fetch
//! succeeded. The table mirrors the government sources currently
//! monitored; adding a route is one new row.

use std::sync::Arc;

use async_trait::async_trait;
use pw_domain::config::FetchConfig;
use pw_domain::{FetchResult, Result, SourceOverrides};

use crate::html::HtmlFetcher;
use crate::http::HttpClient;
use crate::pdf::PdfFetcher;
use crate::registry::{FetcherRegistry, SourceFetcher, SourceType};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One row of the built-in handler table.
#[derive(Debug, Clone, Copy)]
pub struct HandlerEntry {
    /// Registry key following the `{country}_{agency}_{visa}` convention.
    pub key: &'static str,
    pub source_type: SourceType,
    /// Publisher name recorded under the `source` metadata tag.
    pub publisher: &'static str,
    pub agency: Option<&'static str>,
    pub route: &'static str,
    pub visa_category: &'static str,
    /// Specific visa product, e.g. "Skilled Worker" or "Study Permit".
    pub visa_subtype: Option<&'static str>,
    /// What the monitored page covers, for sources wider than one visa.
    pub content_scope: Option<&'static str>,
}

pub const BUILTIN_HANDLERS: &[HandlerEntry] = &[
    HandlerEntry {
        key: "uk_home_office_immigration_rules",
        source_type: SourceType::Html,
        publisher: "UK Home Office",
        agency: Some("UKVI"),
        route: "India → UK",
        visa_category: "Both",
        visa_subtype: None,
        content_scope: Some("Immigration Rules Guidance"),
    },
    HandlerEntry {
        key: "uk_home_office_student",
        source_type: SourceType::Html,
        publisher: "UK Home Office",
        agency: Some("UKVI"),
        route: "India → UK",
        visa_category: "Student",
        visa_subtype: None,
        content_scope: None,
    },
    HandlerEntry {
        key: "uk_home_office_work",
        source_type: SourceType::Html,
        publisher: "UK Home Office",
        agency: Some("UKVI"),
        route: "India → UK",
        visa_category: "Work",
        visa_subtype: Some("Skilled Worker"),
        content_scope: None,
    },
    HandlerEntry {
        key: "de_daad_student",
        source_type: SourceType::Html,
        publisher: "Germany DAAD",
        agency: None,
        route: "India → Germany",
        visa_category: "Student",
        visa_subtype: None,
        content_scope: None,
    },
    HandlerEntry {
        key: "de_bamf_work",
        source_type: SourceType::Html,
        publisher: "Germany BAMF",
        agency: None,
        route: "India → Germany",
        visa_category: "Work",
        visa_subtype: None,
        content_scope: None,
    },
    HandlerEntry {
        key: "de_arbeitsagentur_work",
        source_type: SourceType::Html,
        publisher: "Germany Bundesagentur für Arbeit",
        agency: None,
        route: "India → Germany",
        visa_category: "Work",
        visa_subtype: None,
        content_scope: None,
    },
    HandlerEntry {
        key: "de_bmi_work",
        source_type: SourceType::Html,
        publisher: "Germany BMI",
        agency: None,
        route: "India → Germany",
        visa_category: "Work",
        visa_subtype: None,
        content_scope: None,
    },
    HandlerEntry {
        key: "ca_ircc_student",
        source_type: SourceType::Html,
        publisher: "IRCC",
        agency: Some("Immigration, Refugees and Citizenship Canada"),
        route: "India → Canada",
        visa_category: "Student",
        visa_subtype: Some("Study Permit"),
        content_scope: None,
    },
    HandlerEntry {
        key: "ca_ircc_work",
        source_type: SourceType::Html,
        publisher: "IRCC",
        agency: Some("Immigration, Refugees and Citizenship Canada"),
        route: "India → Canada",
        visa_category: "Work",
        visa_subtype: Some("Work Permit"),
        content_scope: None,
    },
    HandlerEntry {
        key: "ca_ircc_operational_bulletins",
        source_type: SourceType::Pdf,
        publisher: "IRCC",
        agency: Some("Immigration, Refugees and Citizenship Canada"),
        route: "India → Canada",
        visa_category: "Both",
        visa_subtype: None,
        content_scope: Some("Operational Bulletins and Manuals"),
    },
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Machinery {
    Html(Arc<HtmlFetcher>),
    Pdf(Arc<PdfFetcher>),
}

/// A table-driven handler: shared fetch machinery plus enrichment.
pub struct TableHandler {
    entry: HandlerEntry,
    machinery: Machinery,
}

impl TableHandler {
    fn enrich(&self, result: &mut FetchResult) {
        result.tag("source", self.entry.publisher);
        if let Some(agency) = self.entry.agency {
            result.tag("agency", agency);
        }
        result.tag("route", self.entry.route);
        result.tag("visa_category", self.entry.visa_category);
        if let Some(subtype) = self.entry.visa_subtype {
            result.tag("visa_subtype", subtype);
        }
        if let Some(scope) = self.entry.content_scope {
            result.tag("content_scope", scope);
        }
    }
}

#[async_trait]
impl SourceFetcher for TableHandler {
    async fn fetch(&self, url: &str, overrides: &SourceOverrides) -> FetchResult {
        let mut result = match &self.machinery {
            Machinery::Html(fetcher) => fetcher.fetch(url, overrides).await,
            Machinery::Pdf(fetcher) => fetcher.fetch(url, overrides).await,
        };

        if result.success {
            self.enrich(&mut result);
            tracing::info!(
                key = self.entry.key,
                url,
                chars = result.raw_text.chars().count(),
                "fetched source content"
            );
        } else {
            tracing::error!(
                key = self.entry.key,
                url,
                error = result.error_message.as_deref().unwrap_or(""),
                "fetch failed"
            );
        }
        result
    }

    fn source_type(&self) -> SourceType {
        self.entry.source_type
    }
}

/// Build the registry with every built-in handler, sharing one HTTP
/// client across all of them.
pub fn builtin_registry(config: &FetchConfig) -> Result<FetcherRegistry> {
    let http = HttpClient::new(config)?;
    let html = Arc::new(HtmlFetcher::new(http.clone()));
    let pdf = Arc::new(PdfFetcher::new(http));

    let mut registry = FetcherRegistry::new();
    for entry in BUILTIN_HANDLERS {
        let machinery = match entry.source_type {
            SourceType::Pdf => Machinery::Pdf(Arc::clone(&pdf)),
            _ => Machinery::Html(Arc::clone(&html)),
        };
        registry.register(
            entry.key,
            Arc::new(TableHandler {
                entry: *entry,
                machinery,
            }),
        )?;
    }
    Ok(registry)
}
