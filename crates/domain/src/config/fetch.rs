use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default outbound User-Agent.
pub const DEFAULT_USER_AGENT: &str =
    "policywatch/0.1 (+https://github.com/policywatch/policywatch)";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP retrieval configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-HTTP-attempt deadline in seconds.
    #[serde(default = "d_fetch_timeout_s")]
    pub fetch_timeout_s: u64,
    /// Attempts per fetch, including the first.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Exponential-backoff base in seconds; the sleep before retry `n`
    /// (1-indexed) is `retry_base_s * 2^(n-1)`.
    #[serde(default = "d_retry_base_s")]
    pub retry_base_s: u64,
    /// Maximum redirect hops to follow.
    #[serde(default = "d_max_redirects")]
    pub max_redirects: usize,
    /// Default outbound User-Agent; overridable per source.
    #[serde(default = "d_user_agent")]
    pub user_agent: String,
    /// When false, robots.txt is not consulted at all. Kept on by
    /// default; the check itself fails open.
    #[serde(default = "d_respect_robots")]
    pub respect_robots: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_s: d_fetch_timeout_s(),
            max_retries: d_max_retries(),
            retry_base_s: d_retry_base_s(),
            max_redirects: d_max_redirects(),
            user_agent: d_user_agent(),
            respect_robots: d_respect_robots(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_s)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_s)
    }
}

fn d_fetch_timeout_s() -> u64 {
    30
}

fn d_max_retries() -> u32 {
    3
}

fn d_retry_base_s() -> u64 {
    1
}

fn d_max_redirects() -> usize {
    5
}

fn d_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

fn d_respect_robots() -> bool {
    true
}
