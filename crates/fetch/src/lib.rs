//! Content retrieval for policywatch.
//!
//! HTTP retrieval with retry and robots compliance, the HTML and PDF
//! extractors, and the fetcher registry that maps a source to its
//! handler. Everything here honors the envelope protocol: extraction
//! failures come back as failed [`pw_domain::FetchResult`]s, never as
//! errors crossing the component boundary.

pub mod handlers;
pub mod html;
pub mod http;
pub mod pdf;
pub mod registry;
pub mod robots;

pub use handlers::builtin_registry;
pub use html::HtmlFetcher;
pub use http::{HttpClient, HttpFailure, HttpResponse};
pub use pdf::PdfFetcher;
pub use registry::{FetcherKey, FetcherRegistry, SourceFetcher, SourceType};
pub use robots::RobotsGate;
