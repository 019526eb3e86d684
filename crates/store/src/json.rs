//! JSON-file-backed store.
//!
//! State lives in `policywatch.json` under the configured state path.
//! All tables are held in memory behind one `RwLock`; every mutating
//! operation rewrites the file via a temp-file rename while holding
//! the write lock, so a crash mid-cycle leaves the previous state on
//! disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pw_domain::{
    CheckFrequency, Error, PolicyChange, PolicyVersion, Result, RouteSubscription, Source,
};

use crate::store::{PolicyStore, SourceUpdate};

const STATE_FILE: &str = "policywatch.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default)]
    versions: Vec<PolicyVersion>,
    #[serde(default)]
    changes: Vec<PolicyChange>,
    #[serde(default)]
    subscriptions: Vec<RouteSubscription>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JsonStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct JsonStore {
    state_path: PathBuf,
    data: RwLock<StoreData>,
}

impl JsonStore {
    /// Load or create the store at `state_path/policywatch.json`.
    pub fn open(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;

        let file = state_path.join(STATE_FILE);
        let data = if file.exists() {
            let raw = std::fs::read_to_string(&file).map_err(Error::Io)?;
            serde_json::from_str(&raw)?
        } else {
            StoreData::default()
        };

        tracing::info!(
            sources = data.sources.len(),
            versions = data.versions.len(),
            changes = data.changes.len(),
            subscriptions = data.subscriptions.len(),
            path = %file.display(),
            "policy store loaded"
        );

        Ok(Self {
            state_path: file,
            data: RwLock::new(data),
        })
    }

    /// Write the current state to disk. Called with the write lock
    /// held so readers never observe a half-applied cycle.
    fn persist(&self, data: &StoreData) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, &self.state_path).map_err(Error::Io)?;
        Ok(())
    }

    fn apply_update(source: &mut Source, update: SourceUpdate) {
        if let Some(at) = update.last_checked_at {
            source.last_checked_at = Some(at);
        }
        if let Some(at) = update.last_change_detected_at {
            source.last_change_detected_at = Some(at);
        }
        if let Some(count) = update.consecutive_fetch_failures {
            source.consecutive_fetch_failures = count;
        }
        if let Some(count) = update.consecutive_email_failures {
            source.consecutive_email_failures = count;
        }
        if let Some(error) = update.last_fetch_error {
            source.last_fetch_error = error;
        }
        if let Some(error) = update.last_email_error {
            source.last_email_error = error;
        }
        source.updated_at = Utc::now();
    }

    fn append_version_locked(data: &mut StoreData, version: PolicyVersion) -> Result<PolicyVersion> {
        if !data.sources.iter().any(|s| s.id == version.source_id) {
            return Err(Error::Store(format!(
                "unknown source {}",
                version.source_id
            )));
        }
        let latest = data
            .versions
            .iter()
            .rev()
            .find(|v| v.source_id == version.source_id);
        if let Some(latest) = latest {
            if latest.content_hash == version.content_hash {
                return Err(Error::Store(format!(
                    "version hash {} duplicates the latest version for source {}",
                    version.content_hash, version.source_id
                )));
            }
        }
        data.versions.push(version.clone());
        Ok(version)
    }

    fn append_change_locked(data: &mut StoreData, change: PolicyChange) -> Result<PolicyChange> {
        if !data.versions.iter().any(|v| v.id == change.new_version_id) {
            return Err(Error::Store(format!(
                "change references unknown new version {}",
                change.new_version_id
            )));
        }
        if let Some(old_id) = change.old_version_id {
            if !data.versions.iter().any(|v| v.id == old_id) {
                return Err(Error::Store(format!(
                    "change references unknown old version {old_id}"
                )));
            }
        }
        data.changes.push(change.clone());
        Ok(change)
    }
}

impl PolicyStore for JsonStore {
    fn insert_source(&self, source: Source) -> Result<Source> {
        let mut data = self.data.write();
        let duplicate = data.sources.iter().any(|s| {
            s.url == source.url && s.country == source.country && s.visa_type == source.visa_type
        });
        if duplicate {
            return Err(Error::Store(format!(
                "source already exists for ({}, {}, {})",
                source.url, source.country, source.visa_type
            )));
        }
        data.sources.push(source.clone());
        self.persist(&data)?;
        Ok(source)
    }

    fn get_source(&self, id: Uuid) -> Option<Source> {
        self.data.read().sources.iter().find(|s| s.id == id).cloned()
    }

    fn list_sources(&self) -> Vec<Source> {
        self.data.read().sources.clone()
    }

    fn due_sources(&self, frequency: CheckFrequency) -> Vec<Source> {
        self.data
            .read()
            .sources
            .iter()
            .filter(|s| s.is_active && s.check_frequency == frequency)
            .cloned()
            .collect()
    }

    fn update_source(&self, id: Uuid, update: SourceUpdate) -> Result<Source> {
        let mut data = self.data.write();
        let source = data
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::Store(format!("unknown source {id}")))?;
        Self::apply_update(source, update);
        let updated = source.clone();
        self.persist(&data)?;
        Ok(updated)
    }

    fn delete_source(&self, id: Uuid) -> Result<()> {
        let mut data = self.data.write();
        let before = data.sources.len();
        data.sources.retain(|s| s.id != id);
        if data.sources.len() == before {
            return Err(Error::Store(format!("unknown source {id}")));
        }
        let version_ids: HashSet<Uuid> = data
            .versions
            .iter()
            .filter(|v| v.source_id == id)
            .map(|v| v.id)
            .collect();
        data.versions.retain(|v| v.source_id != id);
        data.changes.retain(|c| {
            c.source_id != id
                && !c
                    .old_version_id
                    .map_or(false, |old| version_ids.contains(&old))
                && !version_ids.contains(&c.new_version_id)
        });
        self.persist(&data)?;
        Ok(())
    }

    fn latest_version(&self, source_id: Uuid) -> Option<PolicyVersion> {
        self.data
            .read()
            .versions
            .iter()
            .rev()
            .find(|v| v.source_id == source_id)
            .cloned()
    }

    fn append_version(&self, version: PolicyVersion) -> Result<PolicyVersion> {
        let mut data = self.data.write();
        let stored = Self::append_version_locked(&mut data, version)?;
        self.persist(&data)?;
        Ok(stored)
    }

    fn versions_for(&self, source_id: Uuid) -> Vec<PolicyVersion> {
        self.data
            .read()
            .versions
            .iter()
            .filter(|v| v.source_id == source_id)
            .cloned()
            .collect()
    }

    fn append_change(&self, change: PolicyChange) -> Result<PolicyChange> {
        let mut data = self.data.write();
        let stored = Self::append_change_locked(&mut data, change)?;
        self.persist(&data)?;
        Ok(stored)
    }

    fn changes_for(&self, source_id: Uuid) -> Vec<PolicyChange> {
        self.data
            .read()
            .changes
            .iter()
            .filter(|c| c.source_id == source_id)
            .cloned()
            .collect()
    }

    fn mark_alert_sent(&self, change_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut data = self.data.write();
        let change = data
            .changes
            .iter_mut()
            .find(|c| c.id == change_id)
            .ok_or_else(|| Error::Store(format!("unknown change {change_id}")))?;
        change.alert_sent_at = Some(at);
        self.persist(&data)?;
        Ok(())
    }

    fn record_cycle(
        &self,
        source_id: Uuid,
        version: PolicyVersion,
        change: Option<PolicyChange>,
        update: SourceUpdate,
    ) -> Result<(PolicyVersion, Option<PolicyChange>)> {
        let mut data = self.data.write();

        let stored_version = Self::append_version_locked(&mut data, version)?;
        let stored_change = match change {
            Some(change) => Some(Self::append_change_locked(&mut data, change)?),
            None => None,
        };
        let source = data
            .sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| Error::Store(format!("unknown source {source_id}")))?;
        Self::apply_update(source, update);

        self.persist(&data)?;
        Ok((stored_version, stored_change))
    }

    fn insert_subscription(&self, subscription: RouteSubscription) -> Result<RouteSubscription> {
        let mut data = self.data.write();
        let duplicate = data.subscriptions.iter().any(|s| {
            s.origin_country == subscription.origin_country
                && s.destination_country == subscription.destination_country
                && s.visa_type == subscription.visa_type
                && s.email == subscription.email
        });
        if duplicate {
            return Err(Error::Store(format!(
                "subscription already exists for ({}, {}, {}, {})",
                subscription.origin_country,
                subscription.destination_country,
                subscription.visa_type,
                subscription.email
            )));
        }
        data.subscriptions.push(subscription.clone());
        self.persist(&data)?;
        Ok(subscription)
    }

    fn subscriptions_for(&self, country: &str, visa_type: &str) -> Vec<RouteSubscription> {
        self.data
            .read()
            .subscriptions
            .iter()
            .filter(|s| s.matches_source(country, visa_type))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pw_domain::FetchType;

    fn store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn sample_source() -> Source {
        Source::new(
            "UK",
            "Student",
            "https://example.com/student",
            "UK Student Visa",
            FetchType::Html,
            CheckFrequency::Daily,
        )
        .unwrap()
    }

    fn version(source_id: Uuid, hash_prefix: char) -> PolicyVersion {
        let hash: String = std::iter::once(hash_prefix)
            .chain(std::iter::repeat('0'))
            .take(64)
            .collect();
        PolicyVersion::new(source_id, hash, "text".into(), Utc::now(), 10).unwrap()
    }

    #[test]
    fn insert_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let source = {
            let store = JsonStore::open(dir.path()).unwrap();
            store.insert_source(sample_source()).unwrap()
        };

        let store = JsonStore::open(dir.path()).unwrap();
        let loaded = store.get_source(source.id).unwrap();
        assert_eq!(loaded.url, source.url);
        assert_eq!(loaded.country, "UK");
    }

    #[test]
    fn duplicate_source_triple_rejected() {
        let (_dir, store) = store();
        store.insert_source(sample_source()).unwrap();
        let err = store.insert_source(sample_source()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn due_sources_filters_by_cadence_and_activity() {
        let (_dir, store) = store();
        let daily = store.insert_source(sample_source()).unwrap();

        let mut weekly = Source::new(
            "UK",
            "Work",
            "https://example.com/work",
            "UK Work Visa",
            FetchType::Html,
            CheckFrequency::Weekly,
        )
        .unwrap();
        weekly.is_active = true;
        store.insert_source(weekly).unwrap();

        let mut inactive = sample_source();
        inactive.url = "https://example.com/other".into();
        inactive.is_active = false;
        store.insert_source(inactive).unwrap();

        let due = store.due_sources(CheckFrequency::Daily);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, daily.id);
        assert_eq!(store.due_sources(CheckFrequency::Weekly).len(), 1);
    }

    #[test]
    fn latest_version_is_last_appended() {
        let (_dir, store) = store();
        let source = store.insert_source(sample_source()).unwrap();
        store.append_version(version(source.id, 'a')).unwrap();
        let second = store.append_version(version(source.id, 'b')).unwrap();

        let latest = store.latest_version(source.id).unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(store.versions_for(source.id).len(), 2);
    }

    #[test]
    fn append_version_rejects_duplicate_of_latest() {
        let (_dir, store) = store();
        let source = store.insert_source(sample_source()).unwrap();
        store.append_version(version(source.id, 'a')).unwrap();
        let err = store.append_version(version(source.id, 'a')).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
    }

    #[test]
    fn append_version_rejects_unknown_source() {
        let (_dir, store) = store();
        assert!(store.append_version(version(Uuid::new_v4(), 'a')).is_err());
    }

    #[test]
    fn record_cycle_applies_all_parts() {
        let (_dir, store) = store();
        let source = store.insert_source(sample_source()).unwrap();
        let old = store.append_version(version(source.id, 'a')).unwrap();

        let new = version(source.id, 'b');
        let change = PolicyChange::new(
            source.id,
            Some(old.id),
            new.id,
            old.content_hash.clone(),
            new.content_hash.clone(),
            "+ new line".into(),
        )
        .unwrap();
        let now = Utc::now();
        let update = SourceUpdate::fetch_succeeded(now).with_change_detected(now);

        let (_, stored_change) = store
            .record_cycle(source.id, new, Some(change), update)
            .unwrap();
        assert!(stored_change.is_some());

        let reloaded = store.get_source(source.id).unwrap();
        assert_eq!(reloaded.last_checked_at, Some(now));
        assert_eq!(reloaded.last_change_detected_at, Some(now));
        assert_eq!(store.changes_for(source.id).len(), 1);
    }

    #[test]
    fn record_cycle_rejects_duplicate_version_without_side_effects() {
        let (_dir, store) = store();
        let source = store.insert_source(sample_source()).unwrap();
        store.append_version(version(source.id, 'a')).unwrap();

        let result = store.record_cycle(
            source.id,
            version(source.id, 'a'),
            None,
            SourceUpdate::fetch_succeeded(Utc::now()),
        );
        assert!(result.is_err());
        // The source update must not have been applied.
        assert!(store.get_source(source.id).unwrap().last_checked_at.is_none());
    }

    #[test]
    fn mark_alert_sent_stamps_change() {
        let (_dir, store) = store();
        let source = store.insert_source(sample_source()).unwrap();
        let old = store.append_version(version(source.id, 'a')).unwrap();
        let new = store.append_version(version(source.id, 'b')).unwrap();
        let change = store
            .append_change(
                PolicyChange::new(
                    source.id,
                    Some(old.id),
                    new.id,
                    old.content_hash.clone(),
                    new.content_hash.clone(),
                    "diff".into(),
                )
                .unwrap(),
            )
            .unwrap();

        let at = Utc::now();
        store.mark_alert_sent(change.id, at).unwrap();
        let stored = &store.changes_for(source.id)[0];
        assert_eq!(stored.alert_sent_at, Some(at));
    }

    #[test]
    fn delete_source_cascades() {
        let (_dir, store) = store();
        let source = store.insert_source(sample_source()).unwrap();
        let old = store.append_version(version(source.id, 'a')).unwrap();
        let new = store.append_version(version(source.id, 'b')).unwrap();
        store
            .append_change(
                PolicyChange::new(
                    source.id,
                    Some(old.id),
                    new.id,
                    old.content_hash.clone(),
                    new.content_hash.clone(),
                    "diff".into(),
                )
                .unwrap(),
            )
            .unwrap();

        store.delete_source(source.id).unwrap();
        assert!(store.get_source(source.id).is_none());
        assert!(store.versions_for(source.id).is_empty());
        assert!(store.changes_for(source.id).is_empty());
    }

    #[test]
    fn subscription_uniqueness_enforced() {
        let (_dir, store) = store();
        let sub = RouteSubscription::new("IN", "UK", "Student", "a@b.com").unwrap();
        store.insert_subscription(sub).unwrap();
        let dup = RouteSubscription::new("IN", "UK", "Student", "a@b.com").unwrap();
        assert!(store.insert_subscription(dup).is_err());
    }

    #[test]
    fn subscriptions_for_applies_route_matching() {
        let (_dir, store) = store();
        store
            .insert_subscription(RouteSubscription::new("IN", "UK", "Student", "a@b.com").unwrap())
            .unwrap();
        store
            .insert_subscription(RouteSubscription::new("IN", "UK", "Work", "c@d.com").unwrap())
            .unwrap();
        store
            .insert_subscription(RouteSubscription::new("IN", "DE", "Student", "e@f.com").unwrap())
            .unwrap();

        assert_eq!(store.subscriptions_for("UK", "Student").len(), 1);
        // A source labeled Both notifies every UK subscription.
        assert_eq!(store.subscriptions_for("UK", "Both").len(), 2);
        assert_eq!(store.subscriptions_for("FR", "Student").len(), 0);
    }
}
