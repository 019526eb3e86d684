//! Job runner — selects due sources, drives each through the
//! fetch → normalize → diff → alert pipeline on a bounded worker
//! pool, and aggregates the run outcome.
//!
//! Per-source work is strictly sequential on one worker; across
//! sources there is no ordering guarantee. One scheduler process runs
//! each cadence — redundant deployments need an external lease.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use pw_alerts::AlertEngine;
use pw_domain::config::SchedulerConfig;
use pw_domain::{CheckFrequency, FetchErrorType, PolicyChange, PolicyVersion, Source};
use pw_fetch::FetcherRegistry;
use pw_store::{PolicyStore, SourceUpdate};

use crate::detect::{detect, Detection};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JobResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Aggregated outcome of one scheduler run.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub sources_processed: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub changes_detected: usize,
    pub alerts_sent: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            sources_processed: 0,
            sources_succeeded: 0,
            sources_failed: 0,
            changes_detected: 0,
            alerts_sent: 0,
            errors: Vec::new(),
            started_at,
            completed_at: started_at,
        }
    }
}

/// Outcome of one per-source processing unit.
enum SourceOutcome {
    Succeeded {
        change_detected: bool,
        alerts_sent: usize,
    },
    Failed {
        error: String,
    },
    /// Whole-run deadline hit before this source acquired a worker.
    NotStarted,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JobRunner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drives one cadence of the monitoring pipeline.
pub struct JobRunner {
    store: Arc<dyn PolicyStore>,
    registry: Arc<FetcherRegistry>,
    alerts: Arc<AlertEngine>,
    config: SchedulerConfig,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        registry: Arc<FetcherRegistry>,
        alerts: Arc<AlertEngine>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            alerts,
            config,
        }
    }

    pub async fn run_daily(&self) -> JobResult {
        self.run(CheckFrequency::Daily).await
    }

    pub async fn run_weekly(&self) -> JobResult {
        self.run(CheckFrequency::Weekly).await
    }

    /// Run one cadence over its due sources.
    pub async fn run(&self, frequency: CheckFrequency) -> JobResult {
        let due = self.store.due_sources(frequency);
        tracing::info!(
            cadence = frequency.as_str(),
            due = due.len(),
            concurrency = self.config.worker_concurrency,
            "starting scheduled run"
        );
        self.run_sources(due).await
    }

    /// External-trigger path: run an explicit source list through the
    /// same pool. Used for `custom`-cadence sources.
    pub async fn run_sources(&self, sources: Vec<Source>) -> JobResult {
        let started_at = Utc::now();
        let mut result = JobResult::new(started_at);
        result.sources_processed = sources.len();

        let semaphore = Arc::new(Semaphore::new(self.config.worker_concurrency));
        let run_cutoff = self.config.run_deadline().map(|d| Instant::now() + d);

        let mut workers: JoinSet<(String, SourceOutcome)> = JoinSet::new();
        for source in sources {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let registry = Arc::clone(&self.registry);
            let alerts = Arc::clone(&self.alerts);
            let config = self.config.clone();

            workers.spawn(async move {
                let name = source.name.clone();
                // Closed only on runner drop, which cannot happen while
                // the JoinSet is still being awaited.
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (name, SourceOutcome::NotStarted),
                };
                if run_cutoff.is_some_and(|cutoff| Instant::now() >= cutoff) {
                    return (name, SourceOutcome::NotStarted);
                }

                // The deadline covers the whole unit: fetch, extract,
                // normalize, persist and alert dispatch. Cancellation
                // drops any temp files owned by the fetch.
                let outcome = match tokio::time::timeout(
                    config.source_deadline(),
                    process_source(&source, store.as_ref(), &registry, &alerts),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let error = format!(
                            "{}: source deadline of {}s exceeded",
                            FetchErrorType::TimeoutError,
                            config.source_deadline_s
                        );
                        let failures = source.consecutive_fetch_failures + 1;
                        if let Err(e) = store.update_source(
                            source.id,
                            SourceUpdate::fetch_failed(Utc::now(), failures, error.clone()),
                        ) {
                            tracing::error!(
                                source = %source.name,
                                error = %e,
                                "failed to record deadline timeout"
                            );
                        }
                        SourceOutcome::Failed { error }
                    }
                };
                (name, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((name, SourceOutcome::Succeeded { change_detected, alerts_sent })) => {
                    result.sources_succeeded += 1;
                    if change_detected {
                        result.changes_detected += 1;
                    }
                    result.alerts_sent += alerts_sent;
                    tracing::debug!(source = %name, change_detected, "source processed");
                }
                Ok((name, SourceOutcome::Failed { error })) => {
                    result.sources_failed += 1;
                    result.errors.push(format!("{name}: {error}"));
                }
                Ok((name, SourceOutcome::NotStarted)) => {
                    result.sources_failed += 1;
                    result
                        .errors
                        .push(format!("{name}: run deadline reached before processing"));
                }
                Err(join_error) => {
                    result.sources_failed += 1;
                    result
                        .errors
                        .push(format!("worker crashed: {join_error}"));
                }
            }
        }

        result.completed_at = Utc::now();
        tracing::info!(
            processed = result.sources_processed,
            succeeded = result.sources_succeeded,
            failed = result.sources_failed,
            changes = result.changes_detected,
            alerts = result.alerts_sent,
            "run complete"
        );
        result
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-source processing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One processing unit: fetch → version write → change write → alert
/// dispatch, strictly in that order.
async fn process_source(
    source: &Source,
    store: &dyn PolicyStore,
    registry: &FetcherRegistry,
    alerts: &AlertEngine,
) -> SourceOutcome {
    let Some((handler_name, handler)) = registry.fetcher_for(source) else {
        tracing::warn!(
            source = %source.name,
            country = %source.country,
            visa_type = %source.visa_type,
            "no fetcher registered"
        );
        return SourceOutcome::Failed {
            error: format!(
                "no fetcher registered for ({}, {}, {})",
                source.country, source.visa_type, source.fetch_type
            ),
        };
    };

    let overrides = source.overrides();
    let started = Instant::now();
    let fetch_result = handler.fetch(&source.url, &overrides).await;
    let fetch_duration_ms = started.elapsed().as_millis() as u64;
    let now = Utc::now();

    if !fetch_result.success {
        let error = fetch_result
            .error_message
            .clone()
            .unwrap_or_else(|| "unknown_error: fetch failed without a message".to_owned());
        let failures = source.consecutive_fetch_failures + 1;
        if let Err(e) = store.update_source(
            source.id,
            SourceUpdate::fetch_failed(now, failures, error.clone()),
        ) {
            tracing::error!(source = %source.name, error = %e, "failed to record fetch failure");
        }
        return SourceOutcome::Failed { error };
    }

    let previous = store.latest_version(source.id);
    match detect(previous.as_ref(), &fetch_result.raw_text) {
        Detection::Unchanged => {
            match store.update_source(source.id, SourceUpdate::fetch_succeeded(now)) {
                Ok(_) => SourceOutcome::Succeeded {
                    change_detected: false,
                    alerts_sent: 0,
                },
                Err(e) => SourceOutcome::Failed {
                    error: format!("store: {e}"),
                },
            }
        }
        Detection::FirstObservation { hash, normalized } => {
            let version = match PolicyVersion::new(
                source.id,
                hash,
                normalized,
                fetch_result.fetched_at,
                fetch_duration_ms,
            ) {
                Ok(version) => version,
                Err(e) => {
                    return SourceOutcome::Failed {
                        error: format!("version: {e}"),
                    }
                }
            };
            let update = SourceUpdate::fetch_succeeded(now).with_change_detected(now);
            match store.record_cycle(source.id, version, None, update) {
                Ok(_) => {
                    tracing::info!(
                        source = %source.name,
                        handler = handler_name,
                        "first observation recorded"
                    );
                    SourceOutcome::Succeeded {
                        change_detected: false,
                        alerts_sent: 0,
                    }
                }
                Err(e) => SourceOutcome::Failed {
                    error: format!("store: {e}"),
                },
            }
        }
        Detection::Changed {
            hash,
            normalized,
            diff,
        } => {
            let Some(previous) = previous else {
                return SourceOutcome::Failed {
                    error: "store: prior version vanished mid-cycle".to_owned(),
                };
            };
            let version = match PolicyVersion::new(
                source.id,
                hash.clone(),
                normalized,
                fetch_result.fetched_at,
                fetch_duration_ms,
            ) {
                Ok(version) => version,
                Err(e) => {
                    return SourceOutcome::Failed {
                        error: format!("version: {e}"),
                    }
                }
            };
            let change = match PolicyChange::new(
                source.id,
                Some(previous.id),
                version.id,
                previous.content_hash.clone(),
                hash,
                diff,
            ) {
                Ok(change) => change,
                Err(e) => {
                    return SourceOutcome::Failed {
                        error: format!("change: {e}"),
                    }
                }
            };

            let update = SourceUpdate::fetch_succeeded(now).with_change_detected(now);
            let stored_change = match store.record_cycle(source.id, version, Some(change), update)
            {
                Ok((_, Some(change))) => change,
                Ok((_, None)) => {
                    return SourceOutcome::Failed {
                        error: "store: change row was not recorded".to_owned(),
                    }
                }
                Err(e) => {
                    return SourceOutcome::Failed {
                        error: format!("store: {e}"),
                    }
                }
            };

            tracing::info!(
                source = %source.name,
                handler = handler_name,
                diff_length = stored_change.diff_length,
                "policy change detected"
            );

            let alert_result = alerts.dispatch(source, &stored_change).await;
            SourceOutcome::Succeeded {
                change_detected: true,
                alerts_sent: alert_result.emails_sent,
            }
        }
    }
}
