//! PDF retrieval and text extraction.
//!
//! Documents are downloaded to a temporary file, extracted page by
//! page through pdfium, and the file is removed on every exit path
//! (the `NamedTempFile` guard deletes it on drop). A source config may
//! point at a local file instead via the `file_path` override.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use pdfium_render::prelude::*;
use pw_domain::{FetchErrorType, FetchResult, SourceOverrides};

use crate::http::HttpClient;
use crate::robots::{RobotsGate, RobotsVerdict};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Whitespace normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Collapse runs of spaces/tabs to one space and runs of three or
/// more newlines to exactly two, preserving paragraph breaks.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut space_run = false;
    let mut newline_run = 0usize;
    for ch in text.chars() {
        match ch {
            ' ' | '\t' => {
                if !space_run {
                    out.push(' ');
                    space_run = true;
                }
            }
            '\n' => {
                space_run = false;
                newline_run += 1;
                if newline_run <= 2 {
                    out.push('\n');
                }
                continue;
            }
            _ => {
                space_run = false;
                out.push(ch);
            }
        }
        if ch != '\n' {
            newline_run = 0;
        }
    }
    out.trim().to_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// pdfium extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PdfFailure {
    kind: FetchErrorType,
    message: String,
}

fn classify_pdfium(e: &PdfiumError) -> FetchErrorType {
    match e {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)
        | PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::SecurityError) => {
            FetchErrorType::AuthenticationError
        }
        PdfiumError::PdfiumLibraryInternalError(_) => FetchErrorType::ParseError,
        _ => FetchErrorType::UnknownError,
    }
}

/// Extract per-page text and document metadata from a PDF on disk.
fn extract_pdf(path: &Path) -> Result<(String, HashMap<String, serde_json::Value>), PdfFailure> {
    let bindings = Pdfium::bind_to_system_library().map_err(|e| PdfFailure {
        kind: FetchErrorType::UnknownError,
        message: format!("pdfium library unavailable: {e:?}"),
    })?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let kind = classify_pdfium(&e);
        let message = match kind {
            FetchErrorType::AuthenticationError => {
                "PDF is encrypted/protected and cannot be extracted".to_owned()
            }
            _ => format!("PDF is corrupted or invalid: {e:?}"),
        };
        PdfFailure { kind, message }
    })?;

    let mut pages: Vec<String> = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        match page.text() {
            Ok(text) => {
                let page_text = text.all();
                if !page_text.is_empty() {
                    pages.push(page_text);
                }
            }
            Err(e) => {
                tracing::warn!(page = index + 1, error = ?e, "failed to extract page text");
            }
        }
    }

    let combined = collapse_whitespace(&pages.join("\n\n"));

    let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();
    metadata.insert(
        "page_count".to_owned(),
        serde_json::json!(document.pages().len()),
    );
    let tags = [
        ("creation_date", PdfDocumentMetadataTagType::CreationDate),
        (
            "modification_date",
            PdfDocumentMetadataTagType::ModificationDate,
        ),
        ("author", PdfDocumentMetadataTagType::Author),
        ("title", PdfDocumentMetadataTagType::Title),
        ("subject", PdfDocumentMetadataTagType::Subject),
    ];
    let document_metadata = document.metadata();
    for (key, tag_type) in tags {
        if let Some(tag) = document_metadata.get(tag_type) {
            let value = tag.value();
            if !value.is_empty() {
                metadata.insert(key.to_owned(), serde_json::json!(value));
            }
        }
    }

    Ok((combined, metadata))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fetcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared PDF fetch machinery used by the PDF handlers.
pub struct PdfFetcher {
    http: HttpClient,
    robots: RobotsGate,
}

impl PdfFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            robots: RobotsGate::new(),
        }
    }

    /// Fetch a PDF and extract its text. Never returns an error; all
    /// failures are folded into the result envelope.
    pub async fn fetch(&self, url: &str, overrides: &SourceOverrides) -> FetchResult {
        // Local-file override, used for test fixtures and mirrored
        // bulletins that arrive out of band.
        if let Some(file_path) = &overrides.file_path {
            return self.fetch_from_file(Path::new(file_path));
        }

        let config = self.http.config().clone();
        let user_agent = overrides
            .user_agent
            .clone()
            .unwrap_or_else(|| config.user_agent.clone());

        if config.respect_robots {
            if let RobotsVerdict::Denied(agent) = self.robots.check(url, &user_agent).await {
                return FetchResult::failure(
                    "pdf",
                    FetchErrorType::NetworkError,
                    format!("URL blocked by robots.txt for user agent: {agent}"),
                );
            }
        }

        let response = match self.http.get(url, overrides.user_agent.as_deref(), &[]).await {
            Ok(response) => response,
            Err(failure) => {
                return FetchResult::failure("pdf", failure.kind, failure.message);
            }
        };

        let looks_like_pdf = response
            .content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("pdf"))
            .unwrap_or(false)
            || url.to_ascii_lowercase().ends_with(".pdf");
        if !looks_like_pdf {
            tracing::warn!(
                url,
                content_type = response.content_type.as_deref().unwrap_or(""),
                "response may not be a PDF"
            );
        }

        // The guard owns the temp file; dropping it on any return path
        // below removes the file.
        let mut temp = match tempfile::NamedTempFile::new() {
            Ok(temp) => temp,
            Err(e) => {
                return FetchResult::failure(
                    "pdf",
                    FetchErrorType::UnknownError,
                    format!("failed to create temporary file: {e}"),
                );
            }
        };
        if let Err(e) = temp.write_all(&response.body) {
            return FetchResult::failure(
                "pdf",
                FetchErrorType::UnknownError,
                format!("failed to write temporary file: {e}"),
            );
        }

        let mut result = match extract_pdf(temp.path()) {
            Ok((raw_text, metadata)) => {
                if raw_text.is_empty() {
                    tracing::warn!(url, "no text extracted from PDF");
                }
                FetchResult::success(raw_text, "pdf").with_metadata(metadata)
            }
            Err(failure) => FetchResult::failure("pdf", failure.kind, failure.message),
        };
        if result.success {
            result.tag("source_url", url);
            result.tag("downloaded_at", result.fetched_at.to_rfc3339());
        }
        result
    }

    /// Extract text from a PDF already on disk.
    pub fn fetch_from_file(&self, path: &Path) -> FetchResult {
        if !path.exists() {
            return FetchResult::failure(
                "pdf",
                FetchErrorType::NotFoundError,
                format!("PDF file not found: {}", path.display()),
            );
        }

        match extract_pdf(path) {
            Ok((raw_text, metadata)) => {
                if raw_text.is_empty() {
                    tracing::warn!(path = %path.display(), "no text extracted from PDF");
                }
                FetchResult::success(raw_text, "pdf").with_metadata(metadata)
            }
            Err(failure) => FetchResult::failure("pdf", failure.kind, failure.message),
        }
    }
}
