//! The outbound email boundary.

use async_trait::async_trait;

/// Result of one send attempt. Errors are in-band; `send` itself never
/// fails.
#[derive(Debug, Clone)]
pub struct EmailOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl EmailOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// The only external boundary of the alert engine.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> EmailOutcome;
}

/// Sender used when alert delivery is disabled. Logs the would-be
/// email and reports failure so `alert_sent_at` is never stamped by a
/// message nobody received.
pub struct NoopSender;

#[async_trait]
impl EmailSender for NoopSender {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> EmailOutcome {
        tracing::info!(to, subject, "alert delivery disabled, dropping email");
        EmailOutcome::failed("email delivery disabled")
    }
}
