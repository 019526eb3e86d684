//! Route subscriptions and alert matching.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::source::validate_country_code;

/// Label a source or subscription may carry to match any visa type.
pub const VISA_TYPE_ANY: &str = "Both";

fn email_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("email regex is valid")
    })
}

/// A subscriber's interest in policy changes for an
/// origin → destination + visa_type route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSubscription {
    pub id: Uuid,
    pub origin_country: String,
    pub destination_country: String,
    pub visa_type: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RouteSubscription {
    pub fn new(
        origin_country: &str,
        destination_country: &str,
        visa_type: &str,
        email: &str,
    ) -> Result<Self> {
        let origin_country = validate_country_code(origin_country)?;
        let destination_country = validate_country_code(destination_country)?;
        if visa_type.is_empty() || visa_type.len() > 50 {
            return Err(Error::Validation(format!(
                "visa_type must be 1..=50 characters, got {}",
                visa_type.len()
            )));
        }
        if !email_shape().is_match(email) {
            return Err(Error::Validation(format!(
                "email address has invalid shape: {email:?}"
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            origin_country,
            destination_country,
            visa_type: visa_type.to_owned(),
            email: email.to_owned(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether this subscription should be notified for a change on a
    /// source with the given country and visa label.
    pub fn matches_source(&self, source_country: &str, source_visa_type: &str) -> bool {
        self.is_active
            && self.destination_country == source_country
            && visa_types_match(source_visa_type, &self.visa_type)
    }
}

/// Visa label matching between a source and a subscription.
///
/// The literal `Both` on either side matches anything; otherwise the
/// labels are compared case-insensitively.
pub fn visa_types_match(source_label: &str, subscription_label: &str) -> bool {
    source_label.eq_ignore_ascii_case(VISA_TYPE_ANY)
        || subscription_label.eq_ignore_ascii_case(VISA_TYPE_ANY)
        || source_label.eq_ignore_ascii_case(subscription_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(visa: &str) -> RouteSubscription {
        RouteSubscription::new("IN", "UK", visa, "alerts@example.com").unwrap()
    }

    #[test]
    fn uppercases_both_country_codes() {
        let sub = RouteSubscription::new("in", "uk", "Student", "a@b.co").unwrap();
        assert_eq!(sub.origin_country, "IN");
        assert_eq!(sub.destination_country, "UK");
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(RouteSubscription::new("IN", "UK", "Student", "not-an-email").is_err());
        assert!(RouteSubscription::new("IN", "UK", "Student", "a@b").is_err());
        assert!(RouteSubscription::new("IN", "UK", "Student", "a b@c.com").is_err());
    }

    #[test]
    fn accepts_plus_addressing() {
        assert!(RouteSubscription::new("IN", "UK", "Student", "a+tag@b.co.uk").is_ok());
    }

    #[test]
    fn matches_exact_route() {
        let sub = subscription("Student");
        assert!(sub.matches_source("UK", "Student"));
        assert!(!sub.matches_source("DE", "Student"));
        assert!(!sub.matches_source("UK", "Work"));
    }

    #[test]
    fn visa_match_is_case_insensitive() {
        let sub = subscription("student");
        assert!(sub.matches_source("UK", "Student"));
    }

    #[test]
    fn both_on_source_matches_any_subscription() {
        let sub = subscription("Student");
        assert!(sub.matches_source("UK", "Both"));
    }

    #[test]
    fn both_on_subscription_matches_any_source() {
        let sub = subscription("Both");
        assert!(sub.matches_source("UK", "Work"));
    }

    #[test]
    fn inactive_subscription_never_matches() {
        let mut sub = subscription("Student");
        sub.is_active = false;
        assert!(!sub.matches_source("UK", "Student"));
    }
}
