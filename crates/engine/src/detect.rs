//! Change detection against the latest stored version.

use pw_domain::PolicyVersion;

use crate::diff::unified_diff;
use crate::normalize::{normalize, sha256_hex};

/// Outcome of comparing freshly fetched text against the stored state
/// of a source.
#[derive(Debug, Clone)]
pub enum Detection {
    /// Same hash as the latest version: nothing to store.
    Unchanged,
    /// No prior version exists. Stores a version but is NOT a change.
    FirstObservation { hash: String, normalized: String },
    /// The content hash moved: stores a version and a change.
    Changed {
        hash: String,
        normalized: String,
        diff: String,
    },
}

/// Normalize, hash, and classify fetched text against the latest
/// stored version, producing the diff when the content moved.
pub fn detect(previous: Option<&PolicyVersion>, raw_text: &str) -> Detection {
    let normalized = normalize(raw_text);
    let hash = sha256_hex(&normalized);

    match previous {
        None => Detection::FirstObservation { hash, normalized },
        Some(prev) if prev.content_hash == hash => Detection::Unchanged,
        Some(prev) => {
            let diff = unified_diff(&prev.raw_text, &normalized);
            Detection::Changed {
                hash,
                normalized,
                diff,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn stored(text: &str) -> PolicyVersion {
        let normalized = normalize(text);
        let hash = sha256_hex(&normalized);
        PolicyVersion::new(Uuid::new_v4(), hash, normalized, Utc::now(), 10).unwrap()
    }

    #[test]
    fn first_observation_is_not_a_change() {
        match detect(None, "Student visa requires X.") {
            Detection::FirstObservation { hash, normalized } => {
                assert_eq!(normalized, "Student visa requires X.");
                assert_eq!(hash, sha256_hex("Student visa requires X."));
            }
            other => panic!("expected first observation, got {other:?}"),
        }
    }

    #[test]
    fn identical_content_is_unchanged() {
        let prev = stored("Student visa requires X.");
        assert!(matches!(
            detect(Some(&prev), "Student visa requires X."),
            Detection::Unchanged
        ));
    }

    #[test]
    fn whitespace_only_variation_is_unchanged() {
        let prev = stored("Student visa requires X.");
        assert!(matches!(
            detect(Some(&prev), "  Student visa requires X. \r\n"),
            Detection::Unchanged
        ));
    }

    #[test]
    fn content_movement_produces_a_diff() {
        let prev = stored("Student visa requires X.");
        match detect(Some(&prev), "Student visa requires X and Y.") {
            Detection::Changed { hash, diff, .. } => {
                assert_ne!(hash, prev.content_hash);
                assert!(diff.contains("+Student visa requires X and Y."));
            }
            other => panic!("expected change, got {other:?}"),
        }
    }
}
