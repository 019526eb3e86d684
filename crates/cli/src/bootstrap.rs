//! Subsystem construction shared by the run subcommands.

use std::sync::Arc;

use anyhow::Context;

use pw_alerts::{AlertEngine, EmailSender, NoopSender, SmtpSender};
use pw_domain::config::{Config, ConfigSeverity};
use pw_engine::JobRunner;
use pw_fetch::builtin_registry;
use pw_store::JsonStore;

/// Validate config, initialize every subsystem and return a wired
/// [`JobRunner`] plus the store it runs against.
pub fn build_runner(config: &Config) -> anyhow::Result<(Arc<JsonStore>, JobRunner)> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Store ────────────────────────────────────────────────────────
    let store =
        Arc::new(JsonStore::open(&config.store.state_path).context("opening policy store")?);

    // ── Fetcher registry ─────────────────────────────────────────────
    let registry = Arc::new(builtin_registry(&config.fetch).context("building fetcher registry")?);
    tracing::info!(fetchers = registry.len(), "fetcher registry ready");

    // ── Alerts ───────────────────────────────────────────────────────
    let sender: Arc<dyn EmailSender> = if config.alerts.enabled {
        Arc::new(SmtpSender::from_config(&config.alerts).context("initializing SMTP sender")?)
    } else {
        tracing::info!("alert delivery disabled, emails will not be sent");
        Arc::new(NoopSender)
    };
    let alerts = Arc::new(AlertEngine::new(store.clone(), sender, &config.alerts));

    let runner = JobRunner::new(
        store.clone(),
        registry,
        alerts,
        config.scheduler.clone(),
    );

    Ok((store, runner))
}
