//! HTML retrieval and text extraction.
//!
//! Extraction strips non-content chrome, picks the most semantic
//! container available, and emits block text with paragraph boundaries
//! preserved.

use std::collections::HashMap;

use pw_domain::config::FetchConfig;
use pw_domain::{FetchErrorType, FetchResult, SourceOverrides};
use scraper::{ElementRef, Html, Node, Selector};

use crate::http::{HttpClient, HttpResponse};
use crate::robots::{RobotsGate, RobotsVerdict};

/// Elements removed wholesale before text extraction.
const STRIP_TAGS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// Class fragments that mark a `<div>` as a content container.
const CONTENT_CLASS_HINTS: [&str; 6] = ["content", "main", "article", "post", "entry", "body"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extract clean text content from an HTML document.
///
/// Container priority: `<main>`, `<article>`, a `<div>` with a
/// content-looking class, `<body>`, then the whole document. Text
/// nodes inside stripped elements are skipped; the remaining chunks
/// are trimmed and joined with `\n`, and runs of three or more
/// newlines are collapsed to two.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut chunks: Vec<String> = Vec::new();
    let container = select_container(&document).unwrap_or_else(|| document.root_element());
    collect_text(container, &mut chunks);

    collapse_blank_runs(chunks.join("\n").trim())
}

fn select_container<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
    for selector in ["main", "article"] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(element) = document.select(&sel).next() {
                return Some(element);
            }
        }
    }

    if let Ok(div_sel) = Selector::parse("div") {
        for div in document.select(&div_sel) {
            let class = div.value().attr("class").unwrap_or("").to_ascii_lowercase();
            if CONTENT_CLASS_HINTS.iter().any(|hint| class.contains(hint)) {
                return Some(div);
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = document.select(&body_sel).next() {
            return Some(body);
        }
    }

    None
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    if STRIP_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        } else if let Node::Text(text) = child.value() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_owned());
            }
        }
    }
}

/// Collapse runs of three or more newlines to exactly two, preserving
/// paragraph boundaries.
pub fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newline_run = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push('\n');
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metadata extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pull page metadata from the document and the HTTP response.
pub fn extract_metadata(
    html: &str,
    response: &HttpResponse,
) -> HashMap<String, serde_json::Value> {
    let document = Html::parse_document(html);
    let mut metadata = HashMap::new();

    if let Some(title) = select_first_text(&document, "title") {
        metadata.insert("page_title".to_owned(), title.into());
    }

    let mut last_modified = response.last_modified.clone();
    if let Some(header) = &response.last_modified {
        metadata.insert("last_modified_header".to_owned(), header.clone().into());
    }

    // First matching date-bearing meta tag wins; it overrides the
    // HTTP header for the combined last_modified value.
    let meta_selectors = [
        r#"meta[name="last-modified"]"#,
        r#"meta[property="article:modified_time"]"#,
        r#"meta[name="date"]"#,
    ];
    if let Some(value) = meta_selectors
        .iter()
        .find_map(|s| select_meta_content(&document, s))
    {
        metadata.insert("last_modified_meta".to_owned(), value.clone().into());
        last_modified = Some(value);
    }

    if let Some(value) = last_modified {
        metadata.insert("last_modified".to_owned(), value.into());
    }

    if let Some(description) = select_meta_content(&document, r#"meta[name="description"]"#) {
        metadata.insert("description".to_owned(), description.into());
    }

    if response.redirected {
        metadata.insert("final_url".to_owned(), response.final_url.clone().into());
        metadata.insert("redirected".to_owned(), true.into());
    }

    metadata.insert("status_code".to_owned(), response.status.into());
    metadata.insert("content_length".to_owned(), response.body.len().into());

    metadata
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let element = document.select(&sel).next()?;
    let text: String = element.text().collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn select_meta_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let element = document.select(&sel).next()?;
    element
        .value()
        .attr("content")
        .or_else(|| element.value().attr("value"))
        .map(str::to_owned)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fetcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared HTML fetch machinery used by the HTML handlers.
pub struct HtmlFetcher {
    http: HttpClient,
    robots: RobotsGate,
}

impl HtmlFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            robots: RobotsGate::new(),
        }
    }

    /// Fetch a page and extract its text. Never returns an error; all
    /// failures are folded into the result envelope.
    pub async fn fetch(&self, url: &str, overrides: &SourceOverrides) -> FetchResult {
        let config = self.http.config().clone();
        let user_agent = overrides
            .user_agent
            .clone()
            .unwrap_or_else(|| config.user_agent.clone());

        if config.respect_robots {
            if let RobotsVerdict::Denied(agent) = self.robots.check(url, &user_agent).await {
                return FetchResult::failure(
                    "html",
                    FetchErrorType::NetworkError,
                    format!("URL blocked by robots.txt for user agent: {agent}"),
                );
            }
        }

        let ua_override = overrides.user_agent.as_deref();
        let response = match self.http.get(url, ua_override, &[]).await {
            Ok(response) => response,
            Err(failure) => {
                let message = if failure.kind == FetchErrorType::TimeoutError {
                    format!(
                        "request timed out after {}s: {}",
                        config.fetch_timeout_s, failure.message
                    )
                } else {
                    failure.message
                };
                return FetchResult::failure("html", failure.kind, message);
            }
        };

        let body = response.body_text();
        let raw_text = extract_text(&body);
        if raw_text.is_empty() {
            tracing::warn!(url, "no text content extracted");
        }
        let metadata = extract_metadata(&body, &response);

        FetchResult::success(raw_text, "html").with_metadata(metadata)
    }
}
