//! Alert fan-out with per-source accounting.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use pw_domain::config::AlertsConfig;
use pw_domain::{PolicyChange, Source};
use pw_store::{PolicyStore, SourceUpdate};

use crate::sender::EmailSender;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AlertResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accounting for one change's alert dispatch.
#[derive(Debug, Clone, Default)]
pub struct AlertResult {
    pub change_id: Option<Uuid>,
    pub routes_notified: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub errors: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AlertEngine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolves subscribers for a change and dispatches the alert emails.
///
/// Sends are sequential so the per-source email counters keep their
/// all-failed / any-succeeded semantics.
pub struct AlertEngine {
    store: Arc<dyn PolicyStore>,
    sender: Arc<dyn EmailSender>,
    max_diff_chars: usize,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        sender: Arc<dyn EmailSender>,
        config: &AlertsConfig,
    ) -> Self {
        Self {
            store,
            sender,
            max_diff_chars: config.max_diff_chars,
        }
    }

    /// Send alerts for a detected change.
    ///
    /// On at least one successful send the change is stamped with
    /// `alert_sent_at` and the source's email failure state is reset.
    /// When every send fails the failure counter advances and the last
    /// error is recorded. A change with no matching subscribers leaves
    /// both untouched.
    pub async fn dispatch(&self, source: &Source, change: &PolicyChange) -> AlertResult {
        let subscriptions = self
            .store
            .subscriptions_for(&source.country, &source.visa_type);

        let mut result = AlertResult {
            change_id: Some(change.id),
            routes_notified: subscriptions.len(),
            ..AlertResult::default()
        };

        let subject = format!(
            "Policy change: {} ({})",
            source.name,
            change.detected_at.format("%Y-%m-%d")
        );
        let body = render_body(source, change, self.max_diff_chars);

        for subscription in &subscriptions {
            let outcome = self.sender.send(&subscription.email, &subject, &body).await;
            if outcome.success {
                result.emails_sent += 1;
                tracing::info!(
                    change_id = %change.id,
                    to = %subscription.email,
                    message_id = outcome.message_id.as_deref().unwrap_or(""),
                    "alert email sent"
                );
            } else {
                result.emails_failed += 1;
                let error = outcome
                    .error
                    .unwrap_or_else(|| "unknown send failure".to_owned());
                tracing::warn!(
                    change_id = %change.id,
                    to = %subscription.email,
                    error = %error,
                    "alert email failed"
                );
                result.errors.push(format!("{}: {error}", subscription.email));
            }
        }

        if let Err(e) = self.record_outcome(source, change, &result) {
            tracing::error!(change_id = %change.id, error = %e, "failed to record alert outcome");
            result.errors.push(e.to_string());
        }

        result
    }

    fn record_outcome(
        &self,
        source: &Source,
        change: &PolicyChange,
        result: &AlertResult,
    ) -> pw_domain::Result<()> {
        if result.emails_sent >= 1 {
            self.store.mark_alert_sent(change.id, Utc::now())?;
            self.store.update_source(
                source.id,
                SourceUpdate {
                    consecutive_email_failures: Some(0),
                    last_email_error: Some(None),
                    ..SourceUpdate::default()
                },
            )?;
        } else if result.emails_failed > 0 {
            self.store.update_source(
                source.id,
                SourceUpdate {
                    consecutive_email_failures: Some(source.consecutive_email_failures + 1),
                    last_email_error: Some(result.errors.last().cloned()),
                    ..SourceUpdate::default()
                },
            )?;
        }
        Ok(())
    }
}

/// Plain-text alert body with a truncated diff excerpt.
fn render_body(source: &Source, change: &PolicyChange, max_diff_chars: usize) -> String {
    let mut diff: String = change.diff.chars().take(max_diff_chars).collect();
    if change.diff.chars().count() > max_diff_chars {
        diff.push_str("\n… [diff truncated]");
    }

    format!(
        "A policy change was detected for {name}.\n\
         \n\
         Country: {country}\n\
         Visa type: {visa}\n\
         Detected at: {detected}\n\
         Source: {url}\n\
         \n\
         What changed:\n\
         {diff}\n",
        name = source.name,
        country = source.country,
        visa = source.visa_type,
        detected = change.detected_at.to_rfc3339(),
        url = source.url,
    )
}
