//! Append-only snapshots and detected transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// One observed snapshot of a source's normalized text.
///
/// Created only when a fetch succeeds and the content hash differs
/// from the latest stored version (or none exists yet). Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Lowercase hex SHA-256 of the normalized text, 64 characters.
    pub content_hash: String,
    /// Normalized text content.
    pub raw_text: String,
    pub fetched_at: DateTime<Utc>,
    pub normalized_at: DateTime<Utc>,
    /// Character count of `raw_text`.
    pub content_length: usize,
    /// Total fetch time in milliseconds, including retries.
    pub fetch_duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl PolicyVersion {
    pub fn new(
        source_id: Uuid,
        content_hash: String,
        raw_text: String,
        fetched_at: DateTime<Utc>,
        fetch_duration_ms: u64,
    ) -> Result<Self> {
        validate_content_hash(&content_hash)?;
        let now = Utc::now();
        let content_length = raw_text.chars().count();
        Ok(Self {
            id: Uuid::new_v4(),
            source_id,
            content_hash,
            raw_text,
            fetched_at,
            normalized_at: now,
            content_length,
            fetch_duration_ms,
            created_at: now,
        })
    }
}

/// A detected transition between two consecutive versions of a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyChange {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Prior version; nullable in the model, though the pipeline never
    /// records a change for a first observation.
    pub old_version_id: Option<Uuid>,
    pub new_version_id: Uuid,
    pub old_hash: String,
    pub new_hash: String,
    /// Unified diff with 3 lines of context.
    pub diff: String,
    /// Character count of `diff`.
    pub diff_length: usize,
    pub detected_at: DateTime<Utc>,
    /// Set once alert dispatch completes with at least one successful
    /// send; stays null otherwise.
    #[serde(default)]
    pub alert_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PolicyChange {
    pub fn new(
        source_id: Uuid,
        old_version_id: Option<Uuid>,
        new_version_id: Uuid,
        old_hash: String,
        new_hash: String,
        diff: String,
    ) -> Result<Self> {
        validate_content_hash(&old_hash)?;
        validate_content_hash(&new_hash)?;
        if old_hash == new_hash {
            return Err(Error::Validation(
                "old_hash and new_hash must differ".into(),
            ));
        }
        let now = Utc::now();
        let diff_length = diff.chars().count();
        Ok(Self {
            id: Uuid::new_v4(),
            source_id,
            old_version_id,
            new_version_id,
            old_hash,
            new_hash,
            diff,
            diff_length,
            detected_at: now,
            alert_sent_at: None,
            created_at: now,
        })
    }
}

/// Check that a hash is exactly 64 lowercase hex characters.
pub fn validate_content_hash(hash: &str) -> Result<()> {
    if hash.len() == 64
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "content hash must be 64 lowercase hex characters, got {hash:?}"
        )))
    }
}
