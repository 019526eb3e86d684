//! The persistence seam between the engine and storage.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use pw_domain::{
    CheckFrequency, PolicyChange, PolicyVersion, Result, RouteSubscription, Source,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Source field updates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Partial update of the source fields the pipeline owns.
///
/// `None` leaves a field untouched. The error strings use a nested
/// option so `Some(None)` clears them.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdate {
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_change_detected_at: Option<DateTime<Utc>>,
    pub consecutive_fetch_failures: Option<u32>,
    pub consecutive_email_failures: Option<u32>,
    pub last_fetch_error: Option<Option<String>>,
    pub last_email_error: Option<Option<String>>,
}

impl SourceUpdate {
    /// Counter reset and error clear after a successful fetch.
    pub fn fetch_succeeded(now: DateTime<Utc>) -> Self {
        Self {
            last_checked_at: Some(now),
            consecutive_fetch_failures: Some(0),
            last_fetch_error: Some(None),
            ..Self::default()
        }
    }

    /// Counter advance and error record after a failed fetch.
    pub fn fetch_failed(now: DateTime<Utc>, failures: u32, error: String) -> Self {
        Self {
            last_checked_at: Some(now),
            consecutive_fetch_failures: Some(failures),
            last_fetch_error: Some(Some(error)),
            ..Self::default()
        }
    }

    pub fn with_change_detected(mut self, now: DateTime<Utc>) -> Self {
        self.last_change_detected_at = Some(now);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Operations the pipeline needs from persistence.
///
/// Implementations must serialize per-source writes: `record_cycle`
/// applies its version, change and source update as one unit that
/// either fully lands or not at all.
pub trait PolicyStore: Send + Sync {
    // ── sources ──────────────────────────────────────────────────────

    /// Insert a new source. Rejects a duplicate `(url, country,
    /// visa_type)` triple.
    fn insert_source(&self, source: Source) -> Result<Source>;

    fn get_source(&self, id: Uuid) -> Option<Source>;

    fn list_sources(&self) -> Vec<Source>;

    /// Active sources due under the given cadence.
    fn due_sources(&self, frequency: CheckFrequency) -> Vec<Source>;

    /// Atomically update pipeline-owned source fields. Bumps
    /// `updated_at`.
    fn update_source(&self, id: Uuid, update: SourceUpdate) -> Result<Source>;

    /// Delete a source and cascade to its versions and changes.
    fn delete_source(&self, id: Uuid) -> Result<()>;

    // ── versions & changes ───────────────────────────────────────────

    /// Latest stored version for a source, by insertion order.
    fn latest_version(&self, source_id: Uuid) -> Option<PolicyVersion>;

    /// Append a version. Rejects one whose hash equals the latest
    /// stored version's hash for the same source.
    fn append_version(&self, version: PolicyVersion) -> Result<PolicyVersion>;

    fn versions_for(&self, source_id: Uuid) -> Vec<PolicyVersion>;

    fn append_change(&self, change: PolicyChange) -> Result<PolicyChange>;

    fn changes_for(&self, source_id: Uuid) -> Vec<PolicyChange>;

    /// Stamp a change as alerted.
    fn mark_alert_sent(&self, change_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Apply one detection cycle — new version, optional change, and
    /// the source update — as a single serialized write.
    fn record_cycle(
        &self,
        source_id: Uuid,
        version: PolicyVersion,
        change: Option<PolicyChange>,
        update: SourceUpdate,
    ) -> Result<(PolicyVersion, Option<PolicyChange>)>;

    // ── subscriptions ────────────────────────────────────────────────

    /// Insert a subscription. Rejects a duplicate `(origin,
    /// destination, visa_type, email)` tuple.
    fn insert_subscription(&self, subscription: RouteSubscription) -> Result<RouteSubscription>;

    /// Active subscriptions whose route matches a source's country and
    /// visa label.
    fn subscriptions_for(&self, country: &str, visa_type: &str) -> Vec<RouteSubscription>;
}
