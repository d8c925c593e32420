//! apiwatch - endpoint health monitoring with deduplicated alerting.
//!
//! Main entry point for the apiwatch CLI and scheduler.

mod cli;
mod cmd_endpoints;
mod signal;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use apiwatch_config::{Config, ConfigError, ConfigLoader, ConfigValidator, LoggingConfig};
use apiwatch_engine::{
    EndpointRepository, MonitorService, RecoveryWatcherPool, Scheduler, SqliteEndpointRepository,
    SweepReport,
};
use apiwatch_notify::{AlertManager, Notifier};

use crate::cli::{Cli, Commands};
use crate::cmd_endpoints::handle_endpoint_command;

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&logging.dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("apiwatch")
        .filename_suffix("log")
        .max_log_files(logging.max_files)
        .build(&logging.dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes the file writer on drop; keep it for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> Result<(Config, bool), ConfigError> {
    match ConfigLoader::load(path) {
        Ok(config) => Ok((config, true)),
        Err(ConfigError::NotFound(_)) => Ok((Config::default(), false)),
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config)?;

    if let Some(Commands::CheckConfig) = cli.command {
        return check_config(&cli.config, &config, found);
    }

    init_tracing(&config.logging)?;
    if !found {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }
    for warning in ConfigValidator::validate(&config).into_result()? {
        warn!(path = %warning.path, "{}", warning.message);
    }

    let repository: Arc<dyn EndpointRepository> =
        Arc::new(SqliteEndpointRepository::open(&config.storage.path).await?);

    match cli.command {
        None | Some(Commands::Run) => run(config, repository).await,
        Some(Commands::Sweep) => {
            let service = build_service(&config, repository)?;
            report("sweep", service.evaluate_all().await?);
            service.shutdown();
            Ok(())
        }
        Some(Commands::Tokens) => {
            let service = build_service(&config, repository)?;
            report("token-balance", service.check_token_balances().await?);
            Ok(())
        }
        Some(Commands::Report) => {
            let service = build_service(&config, repository)?;
            report("daily-report", service.send_daily_report().await?);
            Ok(())
        }
        Some(Commands::Endpoints { action }) => {
            handle_endpoint_command(action, repository.as_ref()).await
        }
        Some(Commands::CheckConfig) => Ok(()),
    }
}

fn build_service(
    config: &Config,
    repository: Arc<dyn EndpointRepository>,
) -> Result<Arc<MonitorService>, Box<dyn std::error::Error>> {
    let notifier: Arc<dyn Notifier> = Arc::new(AlertManager::from_config(config));
    let watchers = Arc::new(RecoveryWatcherPool::new(config.watcher.interval()));
    Ok(Arc::new(MonitorService::new(config, repository, notifier, watchers)?))
}

/// Run the scheduler until SIGINT or SIGTERM.
async fn run(
    config: Config,
    repository: Arc<dyn EndpointRepository>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting apiwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Endpoint store: {}", config.storage.path.display());

    let service = build_service(&config, repository)?;
    let scheduler = Scheduler::from_config(&config, service)?;
    for job in scheduler.jobs() {
        info!(job = job.name(), expr = job.expr(), "Registered cron job");
    }

    signal::install(scheduler.shutdown_token())?;
    scheduler.run().await;

    info!("apiwatch stopped");
    Ok(())
}

fn report(pass: &str, report: SweepReport) {
    println!(
        "{}: evaluated {}, alerts {}, failed {}",
        pass, report.evaluated, report.alerts, report.failed
    );
}

fn check_config(path: &Path, config: &Config, found: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !found {
        println!("{} not found; checking defaults", path.display());
    }

    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    result.into_result()?;
    println!("Configuration OK");
    Ok(())
}
