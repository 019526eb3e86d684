//! End-to-end pipeline scenarios over a scripted fetcher, a recording
//! email sender, and a temp-dir JSON store.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use pw_alerts::{AlertEngine, EmailOutcome, EmailSender};
use pw_domain::config::{AlertsConfig, SchedulerConfig};
use pw_domain::{
    CheckFrequency, FetchErrorType, FetchResult, FetchType, RouteSubscription, Source,
    SourceOverrides,
};
use pw_engine::{sha256_hex, JobRunner};
use pw_fetch::{FetcherRegistry, SourceFetcher, SourceType};
use pw_store::{JsonStore, PolicyStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Returns queued results in order, repeating the last one forever.
struct ScriptedFetcher {
    results: Mutex<VecDeque<FetchResult>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    fn returning(results: Vec<FetchResult>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            delay: None,
        })
    }

    fn slow(result: FetchResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(vec![result].into()),
            delay: Some(delay),
        })
    }
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str, _overrides: &SourceOverrides) -> FetchResult {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut results = self.results.lock();
        if results.len() > 1 {
            results.pop_front().expect("non-empty")
        } else {
            results.front().expect("scripted fetcher is empty").clone()
        }
    }

    fn source_type(&self) -> SourceType {
        SourceType::Html
    }
}

struct RecordingSender {
    fail_all: bool,
    fail_for: Vec<String>,
    sent: Mutex<Vec<String>>,
}

impl RecordingSender {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail_all: false,
            fail_for: Vec::new(),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn failing_all() -> Arc<Self> {
        Arc::new(Self {
            fail_all: true,
            fail_for: Vec::new(),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn failing_for(recipients: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_all: false,
            fail_for: recipients.iter().map(|s| s.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> EmailOutcome {
        self.sent.lock().push(to.to_owned());
        if self.fail_all || self.fail_for.iter().any(|f| f == to) {
            EmailOutcome::failed("relay rejected message")
        } else {
            EmailOutcome::sent(format!("msg-{to}"))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<JsonStore>,
    runner: JobRunner,
}

fn harness(fetcher: Arc<dyn SourceFetcher>, sender: Arc<dyn EmailSender>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStore::open(dir.path()).unwrap());

    let mut registry = FetcherRegistry::new();
    registry.register("uk_test_student", fetcher).unwrap();

    let alerts = Arc::new(AlertEngine::new(
        store.clone(),
        sender,
        &AlertsConfig::default(),
    ));
    let runner = JobRunner::new(
        store.clone(),
        Arc::new(registry),
        alerts,
        SchedulerConfig::default(),
    );

    Harness {
        _dir: dir,
        store,
        runner,
    }
}

fn uk_student_source(store: &JsonStore) -> Source {
    store
        .insert_source(
            Source::new(
                "UK",
                "Student",
                "https://example.com/student-visa",
                "UK Student Visa Guidance",
                FetchType::Html,
                CheckFrequency::Daily,
            )
            .unwrap(),
        )
        .unwrap()
}

fn html_result(text: &str) -> FetchResult {
    FetchResult::success(text.into(), "html")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn first_observation_creates_version_but_no_change() {
    let h = harness(
        ScriptedFetcher::returning(vec![html_result("Student visa requires X.")]),
        RecordingSender::succeeding(),
    );
    let source = uk_student_source(&h.store);

    let result = h.runner.run_daily().await;
    assert_eq!(result.sources_processed, 1);
    assert_eq!(result.sources_succeeded, 1);
    assert_eq!(result.changes_detected, 0);

    let versions = h.store.versions_for(source.id);
    assert_eq!(versions.len(), 1);
    assert_eq!(
        versions[0].content_hash,
        sha256_hex("Student visa requires X.")
    );
    assert_eq!(versions[0].content_length, "Student visa requires X.".len());
    assert!(h.store.changes_for(source.id).is_empty());

    let stored = h.store.get_source(source.id).unwrap();
    assert!(stored.last_checked_at.is_some());
    assert_eq!(stored.consecutive_fetch_failures, 0);
}

#[tokio::test]
async fn unchanged_second_run_stores_nothing_new() {
    let h = harness(
        ScriptedFetcher::returning(vec![html_result("Student visa requires X.")]),
        RecordingSender::succeeding(),
    );
    let source = uk_student_source(&h.store);

    h.runner.run_daily().await;
    let first_checked = h.store.get_source(source.id).unwrap().last_checked_at;
    let result = h.runner.run_daily().await;

    assert_eq!(result.sources_succeeded, 1);
    assert_eq!(result.changes_detected, 0);
    // Exactly one version since inception.
    assert_eq!(h.store.versions_for(source.id).len(), 1);
    assert!(h.store.changes_for(source.id).is_empty());

    let stored = h.store.get_source(source.id).unwrap();
    assert!(stored.last_checked_at >= first_checked);
}

#[tokio::test]
async fn content_change_records_versions_change_and_diff() {
    let h = harness(
        ScriptedFetcher::returning(vec![
            html_result("Student visa requires X."),
            html_result("Student visa requires X and Y."),
        ]),
        RecordingSender::succeeding(),
    );
    let source = uk_student_source(&h.store);

    h.runner.run_daily().await;
    let result = h.runner.run_daily().await;
    assert_eq!(result.changes_detected, 1);

    let versions = h.store.versions_for(source.id);
    assert_eq!(versions.len(), 2);

    let changes = h.store.changes_for(source.id);
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_ne!(change.old_hash, change.new_hash);
    assert!(change.diff.contains("+Student visa requires X and Y."));
    assert_eq!(change.old_version_id, Some(versions[0].id));
    assert_eq!(change.new_version_id, versions[1].id);

    let stored = h.store.get_source(source.id).unwrap();
    assert!(stored.last_change_detected_at.is_some());
}

#[tokio::test]
async fn alert_fan_out_with_partial_failure() {
    let h = harness(
        ScriptedFetcher::returning(vec![
            html_result("Student visa requires X."),
            html_result("Student visa requires X and Y."),
        ]),
        RecordingSender::failing_for(&["second@example.com"]),
    );
    let source = uk_student_source(&h.store);
    h.store
        .insert_subscription(
            RouteSubscription::new("IN", "UK", "Student", "first@example.com").unwrap(),
        )
        .unwrap();
    h.store
        .insert_subscription(
            RouteSubscription::new("IN", "UK", "Student", "second@example.com").unwrap(),
        )
        .unwrap();

    h.runner.run_daily().await;
    let result = h.runner.run_daily().await;

    assert_eq!(result.changes_detected, 1);
    assert_eq!(result.alerts_sent, 1);

    let change = &h.store.changes_for(source.id)[0];
    assert!(change.alert_sent_at.is_some());
    let stored = h.store.get_source(source.id).unwrap();
    assert_eq!(stored.consecutive_email_failures, 0);
}

#[tokio::test]
async fn fully_failed_alert_batch_advances_email_counter() {
    let h = harness(
        ScriptedFetcher::returning(vec![
            html_result("Student visa requires X."),
            html_result("Student visa requires X and Y."),
        ]),
        RecordingSender::failing_all(),
    );
    let source = uk_student_source(&h.store);
    h.store
        .insert_subscription(
            RouteSubscription::new("IN", "UK", "Student", "a@example.com").unwrap(),
        )
        .unwrap();
    h.store
        .insert_subscription(
            RouteSubscription::new("IN", "UK", "Student", "b@example.com").unwrap(),
        )
        .unwrap();

    h.runner.run_daily().await;
    let result = h.runner.run_daily().await;
    assert_eq!(result.alerts_sent, 0);

    let change = &h.store.changes_for(source.id)[0];
    assert!(change.alert_sent_at.is_none());
    let stored = h.store.get_source(source.id).unwrap();
    assert_eq!(stored.consecutive_email_failures, 1);
    assert!(stored.last_email_error.is_some());
}

#[tokio::test]
async fn fetch_failure_advances_counter_and_stores_no_version() {
    let h = harness(
        ScriptedFetcher::returning(vec![FetchResult::failure(
            "html",
            FetchErrorType::NotFoundError,
            "HTTP 404 - not found",
        )]),
        RecordingSender::succeeding(),
    );
    let source = uk_student_source(&h.store);

    let result = h.runner.run_daily().await;
    assert_eq!(result.sources_failed, 1);
    assert_eq!(result.errors.len(), 1);

    assert!(h.store.versions_for(source.id).is_empty());
    let stored = h.store.get_source(source.id).unwrap();
    assert_eq!(stored.consecutive_fetch_failures, 1);
    assert!(stored
        .last_fetch_error
        .as_deref()
        .unwrap_or("")
        .starts_with("not_found_error:"));
    assert!(stored.last_checked_at.is_some());
}

#[tokio::test]
async fn success_after_failures_resets_counter() {
    let h = harness(
        ScriptedFetcher::returning(vec![
            FetchResult::failure("html", FetchErrorType::NetworkError, "connection refused"),
            html_result("Student visa requires X."),
        ]),
        RecordingSender::succeeding(),
    );
    let source = uk_student_source(&h.store);

    h.runner.run_daily().await;
    assert_eq!(
        h.store.get_source(source.id).unwrap().consecutive_fetch_failures,
        1
    );

    h.runner.run_daily().await;
    let stored = h.store.get_source(source.id).unwrap();
    assert_eq!(stored.consecutive_fetch_failures, 0);
    assert!(stored.last_fetch_error.is_none());
}

#[tokio::test]
async fn weekly_source_is_not_processed_by_daily_run() {
    let h = harness(
        ScriptedFetcher::returning(vec![html_result("content")]),
        RecordingSender::succeeding(),
    );
    let weekly = h
        .store
        .insert_source(
            Source::new(
                "UK",
                "Student",
                "https://example.com/weekly",
                "Weekly Source",
                FetchType::Html,
                CheckFrequency::Weekly,
            )
            .unwrap(),
        )
        .unwrap();

    let result = h.runner.run_daily().await;
    assert_eq!(result.sources_processed, 0);
    assert!(h.store.versions_for(weekly.id).is_empty());

    let result = h.runner.run_weekly().await;
    assert_eq!(result.sources_processed, 1);
    assert_eq!(h.store.versions_for(weekly.id).len(), 1);
}

#[tokio::test]
async fn custom_sources_run_only_through_explicit_trigger() {
    let h = harness(
        ScriptedFetcher::returning(vec![html_result("content")]),
        RecordingSender::succeeding(),
    );
    let custom = h
        .store
        .insert_source(
            Source::new(
                "UK",
                "Student",
                "https://example.com/custom",
                "Custom Source",
                FetchType::Html,
                CheckFrequency::Custom,
            )
            .unwrap(),
        )
        .unwrap();

    assert_eq!(h.runner.run_daily().await.sources_processed, 0);
    assert_eq!(h.runner.run_weekly().await.sources_processed, 0);

    let result = h.runner.run_sources(vec![custom.clone()]).await;
    assert_eq!(result.sources_processed, 1);
    assert_eq!(h.store.versions_for(custom.id).len(), 1);
}

#[tokio::test]
async fn source_without_handler_lands_in_errors() {
    let h = harness(
        ScriptedFetcher::returning(vec![html_result("content")]),
        RecordingSender::succeeding(),
    );
    // DE does not match the registered uk_test_student handler.
    let orphan = h
        .store
        .insert_source(
            Source::new(
                "DE",
                "Student",
                "https://example.com/de",
                "Orphan Source",
                FetchType::Html,
                CheckFrequency::Daily,
            )
            .unwrap(),
        )
        .unwrap();

    let result = h.runner.run_daily().await;
    assert_eq!(result.sources_processed, 1);
    assert_eq!(result.sources_failed, 1);
    assert!(result.errors[0].contains("no fetcher registered"));
    assert!(h.store.versions_for(orphan.id).is_empty());
}

#[tokio::test]
async fn source_deadline_is_recorded_as_timeout_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStore::open(dir.path()).unwrap());
    let mut registry = FetcherRegistry::new();
    registry
        .register(
            "uk_test_student",
            ScriptedFetcher::slow(html_result("late"), Duration::from_secs(3)),
        )
        .unwrap();
    let alerts = Arc::new(AlertEngine::new(
        store.clone(),
        RecordingSender::succeeding(),
        &AlertsConfig::default(),
    ));
    let config = SchedulerConfig {
        source_deadline_s: 1,
        ..SchedulerConfig::default()
    };
    let runner = JobRunner::new(store.clone(), Arc::new(registry), alerts, config);

    let source = uk_student_source(&store);
    let result = runner.run_daily().await;

    assert_eq!(result.sources_failed, 1);
    let stored = store.get_source(source.id).unwrap();
    assert_eq!(stored.consecutive_fetch_failures, 1);
    assert!(stored
        .last_fetch_error
        .as_deref()
        .unwrap_or("")
        .starts_with("timeout_error:"));
    assert!(store.versions_for(source.id).is_empty());
}

#[tokio::test]
async fn fetch_duration_covers_the_whole_fetch() {
    let h = harness(
        ScriptedFetcher::slow(
            html_result("Student visa requires X."),
            Duration::from_millis(200),
        ),
        RecordingSender::succeeding(),
    );
    let source = uk_student_source(&h.store);

    h.runner.run_daily().await;
    let versions = h.store.versions_for(source.id);
    assert_eq!(versions.len(), 1);
    assert!(versions[0].fetch_duration_ms >= 200);
}

#[tokio::test]
async fn many_sources_all_complete_under_bounded_pool() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStore::open(dir.path()).unwrap());
    let mut registry = FetcherRegistry::new();
    registry
        .register(
            "uk_test_student",
            ScriptedFetcher::returning(vec![html_result("shared content")]),
        )
        .unwrap();
    let alerts = Arc::new(AlertEngine::new(
        store.clone(),
        RecordingSender::succeeding(),
        &AlertsConfig::default(),
    ));
    let config = SchedulerConfig {
        worker_concurrency: 2,
        ..SchedulerConfig::default()
    };
    let runner = JobRunner::new(store.clone(), Arc::new(registry), alerts, config);

    for i in 0..10 {
        store
            .insert_source(
                Source::new(
                    "UK",
                    "Student",
                    &format!("https://example.com/page-{i}"),
                    &format!("Source {i}"),
                    FetchType::Html,
                    CheckFrequency::Daily,
                )
                .unwrap(),
            )
            .unwrap();
    }

    let result = runner.run_daily().await;
    assert_eq!(result.sources_processed, 10);
    assert_eq!(result.sources_succeeded, 10);
    assert_eq!(result.sources_failed, 0);
}
