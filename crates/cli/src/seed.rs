//! Seed-file loading.
//!
//! Operators describe sources and subscriptions in a TOML file; `seed`
//! inserts them into the store, skipping rows that already exist so
//! re-seeding is harmless.

use std::collections::HashMap;

use serde::Deserialize;

use pw_domain::{CheckFrequency, FetchType, Result, RouteSubscription, Source};
use pw_store::PolicyStore;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub sources: Vec<SeedSource>,
    #[serde(default)]
    pub subscriptions: Vec<SeedSubscription>,
}

#[derive(Debug, Deserialize)]
pub struct SeedSource {
    pub country: String,
    pub visa_type: String,
    pub url: String,
    pub name: String,
    pub fetch_type: FetchType,
    pub check_frequency: CheckFrequency,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SeedSubscription {
    pub origin_country: String,
    pub destination_country: String,
    pub visa_type: String,
    pub email: String,
}

/// Counts of rows actually inserted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub sources_added: usize,
    pub subscriptions_added: usize,
    pub skipped: usize,
}

/// Parse a seed file and insert its rows.
pub fn apply_seed(raw: &str, store: &dyn PolicyStore) -> Result<SeedOutcome> {
    let seed: SeedFile = toml::from_str(raw)
        .map_err(|e| pw_domain::Error::Config(format!("failed to parse seed file: {e}")))?;

    let mut outcome = SeedOutcome::default();

    for entry in seed.sources {
        let mut source = Source::new(
            &entry.country,
            &entry.visa_type,
            &entry.url,
            &entry.name,
            entry.fetch_type,
            entry.check_frequency,
        )?;
        source.config = entry.config;
        match store.insert_source(source) {
            Ok(inserted) => {
                tracing::info!(name = %inserted.name, url = %inserted.url, "seeded source");
                outcome.sources_added += 1;
            }
            Err(e) => {
                tracing::warn!(name = %entry.name, error = %e, "skipping source");
                outcome.skipped += 1;
            }
        }
    }

    for entry in seed.subscriptions {
        let subscription = RouteSubscription::new(
            &entry.origin_country,
            &entry.destination_country,
            &entry.visa_type,
            &entry.email,
        )?;
        match store.insert_subscription(subscription) {
            Ok(inserted) => {
                tracing::info!(email = %inserted.email, "seeded subscription");
                outcome.subscriptions_added += 1;
            }
            Err(e) => {
                tracing::warn!(email = %entry.email, error = %e, "skipping subscription");
                outcome.skipped += 1;
            }
        }
    }

    Ok(outcome)
}
