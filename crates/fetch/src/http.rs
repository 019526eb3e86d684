//! HTTP retrieval with retry + exponential back-off on transient
//! failures.
//!
//! Retries on 500/502/503/504 and on connect/read timeouts. Other
//! client errors are permanent and fail immediately; 404 is split out
//! so callers can classify it as `not_found_error`.

use std::time::{Duration, Instant};

use pw_domain::config::FetchConfig;
use pw_domain::FetchErrorType;

/// Statuses worth another attempt.
const RETRY_STATUS_CODES: [u16; 4] = [500, 502, 503, 504];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response / failure types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A completed HTTP GET after redirects.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// `Last-Modified` response header, when present.
    pub last_modified: Option<String>,
    /// `Content-Type` response header, when present.
    pub content_type: Option<String>,
    /// URL after following redirects.
    pub final_url: String,
    /// Whether `final_url` differs from the requested URL.
    pub redirected: bool,
    /// Total wall time including retries and back-off sleeps.
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A fetch attempt that gave up, already classified for the envelope.
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub kind: FetchErrorType,
    pub message: String,
}

impl HttpFailure {
    fn new(kind: FetchErrorType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared HTTP client for all handlers.
///
/// Built once per process; the underlying `reqwest::Client` keeps its
/// connection pool across sources.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpClient {
    pub fn new(config: &FetchConfig) -> pw_domain::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| pw_domain::Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET with retry. `user_agent` overrides the client default for
    /// this request only; `headers` are added verbatim.
    pub async fn get(
        &self,
        url: &str,
        user_agent: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, HttpFailure> {
        let start = Instant::now();
        let mut last_failure: Option<HttpFailure> = None;

        for attempt in 1..=self.config.max_retries {
            if attempt > 1 {
                let backoff = self.config.retry_base() * 2u32.pow(attempt - 2);
                tracing::warn!(
                    url,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient fetch failure, retrying"
                );
                tokio::time::sleep(backoff).await;
            }

            let mut request = self.client.get(url);
            if let Some(ua) = user_agent {
                request = request.header(reqwest::header::USER_AGENT, ua);
            }
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if RETRY_STATUS_CODES.contains(&status) {
                        last_failure = Some(HttpFailure::new(
                            FetchErrorType::NetworkError,
                            format!("HTTP {status} for {url}"),
                        ));
                        continue;
                    }

                    if status == 404 {
                        return Err(HttpFailure::new(
                            FetchErrorType::NotFoundError,
                            format!("HTTP 404 - not found: {url}"),
                        ));
                    }

                    if !response.status().is_success() {
                        return Err(HttpFailure::new(
                            FetchErrorType::NetworkError,
                            format!("HTTP {status} for {url}"),
                        ));
                    }

                    let final_url = response.url().to_string();
                    let redirected = final_url != url;
                    let header = |name: reqwest::header::HeaderName| {
                        response
                            .headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned)
                    };
                    let last_modified = header(reqwest::header::LAST_MODIFIED);
                    let content_type = header(reqwest::header::CONTENT_TYPE);

                    let body = match response.bytes().await {
                        Ok(bytes) => bytes.to_vec(),
                        Err(e) => {
                            return Err(HttpFailure::new(
                                classify_reqwest(&e),
                                format!("failed to read response body: {e}"),
                            ));
                        }
                    };

                    return Ok(HttpResponse {
                        status,
                        body,
                        last_modified,
                        content_type,
                        final_url,
                        redirected,
                        elapsed: start.elapsed(),
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_failure = Some(HttpFailure::new(
                        classify_reqwest(&e),
                        format!("{e} (url: {url})"),
                    ));
                    continue;
                }
                Err(e) => {
                    return Err(HttpFailure::new(
                        classify_reqwest(&e),
                        format!("{e} (url: {url})"),
                    ));
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            HttpFailure::new(
                FetchErrorType::UnknownError,
                format!("no attempts made for {url}"),
            )
        }))
    }
}

/// Map a `reqwest::Error` into the fetch taxonomy.
fn classify_reqwest(e: &reqwest::Error) -> FetchErrorType {
    if e.is_timeout() {
        FetchErrorType::TimeoutError
    } else {
        FetchErrorType::NetworkError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_statuses_cover_transient_errors() {
        for status in [500, 502, 503, 504] {
            assert!(RETRY_STATUS_CODES.contains(&status));
        }
        assert!(!RETRY_STATUS_CODES.contains(&404));
        assert!(!RETRY_STATUS_CODES.contains(&403));
    }

    #[test]
    fn client_builds_from_default_config() {
        let config = FetchConfig::default();
        assert!(HttpClient::new(&config).is_ok());
    }
}
