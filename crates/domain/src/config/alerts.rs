use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Alert configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// When false the engine uses the no-op sender, which records every
    /// send as failed without leaving the process.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "d_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username; empty means unauthenticated relay.
    #[serde(default)]
    pub smtp_username: String,
    /// Environment variable holding the SMTP password.
    /// The secret itself never lives in the config file.
    #[serde(default = "d_smtp_password_env")]
    pub smtp_password_env: String,
    #[serde(default = "d_from_address")]
    pub from_address: String,
    /// Diff excerpt budget for the email body, in characters.
    #[serde(default = "d_max_diff_chars")]
    pub max_diff_chars: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: d_smtp_host(),
            smtp_port: d_smtp_port(),
            smtp_username: String::new(),
            smtp_password_env: d_smtp_password_env(),
            from_address: d_from_address(),
            max_diff_chars: d_max_diff_chars(),
        }
    }
}

fn d_smtp_host() -> String {
    "localhost".into()
}

fn d_smtp_port() -> u16 {
    587
}

fn d_smtp_password_env() -> String {
    "POLICYWATCH_SMTP_PASSWORD".into()
}

fn d_from_address() -> String {
    "alerts@policywatch.local".into()
}

fn d_max_diff_chars() -> usize {
    4000
}
