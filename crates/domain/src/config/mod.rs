mod alerts;
mod fetch;
mod scheduler;
mod store;

pub use alerts::*;
pub use fetch::*;
pub use scheduler::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.scheduler.worker_concurrency == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "scheduler.worker_concurrency".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.scheduler.source_deadline_s == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "scheduler.source_deadline_s".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.scheduler.source_deadline_s < self.fetch.fetch_timeout_s {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "scheduler.source_deadline_s".into(),
                message: format!(
                    "per-source deadline ({}s) is shorter than a single HTTP attempt ({}s)",
                    self.scheduler.source_deadline_s, self.fetch.fetch_timeout_s
                ),
            });
        }

        if self.fetch.max_retries == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "fetch.max_retries".into(),
                message: "must allow at least one attempt".into(),
            });
        }

        if self.fetch.user_agent.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "fetch.user_agent".into(),
                message: "user_agent must not be empty".into(),
            });
        }

        if self.alerts.enabled && self.alerts.smtp_host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "alerts.smtp_host".into(),
                message: "smtp_host is required when alerts are enabled".into(),
            });
        }

        if self.alerts.from_address.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "alerts.from_address".into(),
                message: "no from_address configured, using the built-in default".into(),
            });
        }

        issues
    }
}
