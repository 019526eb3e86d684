use clap::Parser;
use tracing_subscriber::EnvFilter;

use pw_cli::bootstrap::build_runner;
use pw_cli::cli::{load_config, Cli, Command, ConfigCommand};
use pw_cli::seed::apply_seed;
use pw_domain::config::ConfigSeverity;
use pw_domain::CheckFrequency;
use pw_store::{JsonStore, PolicyStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::RunDaily => run_once(&config, CheckFrequency::Daily).await,
        Command::RunWeekly => run_once(&config, CheckFrequency::Weekly).await,
        Command::Seed { path } => {
            let raw = std::fs::read_to_string(&path)?;
            let store = JsonStore::open(&config.store.state_path)?;
            let outcome = apply_seed(&raw, &store)?;
            println!(
                "seeded {} source(s), {} subscription(s), {} skipped",
                outcome.sources_added, outcome.subscriptions_added, outcome.skipped
            );
            Ok(())
        }
        Command::Sources => {
            let store = JsonStore::open(&config.store.state_path)?;
            list_sources(&store);
            Ok(())
        }
        Command::Config(ConfigCommand::Validate) => {
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("configuration OK");
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pw_engine=debug")),
        )
        .init();
}

async fn run_once(
    config: &pw_domain::config::Config,
    frequency: CheckFrequency,
) -> anyhow::Result<()> {
    let (_store, runner) = build_runner(config)?;
    let result = runner.run(frequency).await;

    println!(
        "{} run: {} processed, {} succeeded, {} failed, {} change(s), {} alert(s)",
        frequency,
        result.sources_processed,
        result.sources_succeeded,
        result.sources_failed,
        result.changes_detected,
        result.alerts_sent
    );
    for error in &result.errors {
        eprintln!("error: {error}");
    }

    if result.sources_failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn list_sources(store: &JsonStore) {
    let sources = store.list_sources();
    if sources.is_empty() {
        println!("no sources configured — run `policywatch seed <file>` first");
        return;
    }
    for source in sources {
        let status = if source.is_active { "active" } else { "inactive" };
        println!(
            "{} [{}/{}] {} ({}, {}) fetch_failures={} email_failures={}",
            source.name,
            source.country,
            source.visa_type,
            status,
            source.fetch_type,
            source.check_frequency,
            source.consecutive_fetch_failures,
            source.consecutive_email_failures
        );
        if let Some(error) = &source.last_fetch_error {
            println!("    last fetch error: {error}");
        }
        if let Some(error) = &source.last_email_error {
            println!("    last email error: {error}");
        }
    }
}
