//! cadence - trigger evaluation and flow scheduling engine
//!
//! Main entry point for the cadence CLI and scheduler service.

mod cli;
mod cmd_schedule;
mod cmd_triggers;
mod register;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cadence_config::{Config, ConfigLoader, LoggingConfig};

use cli::{Cli, Commands, ConfigAction};
use register::{build_engine, Engine};

/// Initialize tracing with console output and, for the service, a daily log file.
fn init_tracing(logging: &LoggingConfig, to_file: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_writer = if to_file {
        let log_dir = logging.resolved_dir();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("cadence")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&log_dir)
            .context("failed to create log file appender")?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Dropping the guard stops the writer thread.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);
        Some(non_blocking)
    } else {
        None
    };

    let json = logging.json;
    tracing_subscriber::registry()
        .with(env_filter)
        .with((!json).then(|| fmt::layer().with_target(true).with_writer(std::io::stderr)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with(file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false)))
        .init();

    Ok(())
}

/// Load the config file if present, defaults otherwise.
fn load_config(path: &Path) -> Result<(Config, Vec<String>)> {
    let source = path.exists().then_some(path);
    let (config, mut warnings) = ConfigLoader::load_validated(source)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    if source.is_none() {
        warnings.push(format!("{} not found, using defaults", path.display()));
    }
    Ok((config, warnings))
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

async fn run(engine: Engine) -> Result<()> {
    engine.triggers.start()?;
    let stats = engine.triggers.stats();
    info!(
        triggers = stats.trigger_count,
        sources = ?stats.sources,
        "Scheduler running, press Ctrl-C to stop"
    );

    shutdown_signal().await;

    engine.triggers.shutdown().await?;
    let counters = engine.triggers.stats().counters;
    info!(
        scans = counters.scans,
        fires = counters.fires,
        action_failures = counters.action_failures,
        "Scheduler stopped"
    );
    Ok(())
}

fn config_check(config: &Config, warnings: &[String]) -> Result<()> {
    for warning in warnings {
        println!("warning: {warning}");
    }
    println!("{}", toml::to_string_pretty(config).context("failed to render config")?);
    println!("Configuration is valid.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, warnings) = load_config(&cli.config)?;

    let command = cli.command.unwrap_or(Commands::Run { in_memory: false });
    let service = matches!(command, Commands::Run { .. });
    init_tracing(&config.logging, service)?;
    if service {
        for warning in &warnings {
            warn!("{}", warning);
        }
    }

    match command {
        Commands::Run { in_memory } => {
            info!("Starting cadence v{}", env!("CARGO_PKG_VERSION"));
            let engine = build_engine(&config, in_memory).await?;
            run(engine).await
        }
        Commands::Triggers { action } => {
            let engine = build_engine(&config, false).await?;
            cmd_triggers::handle_triggers_command(&engine, action).await
        }
        Commands::Schedule { action } => {
            let engine = build_engine(&config, false).await?;
            cmd_schedule::handle_schedule_command(&engine, &config, action).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Check => config_check(&config, &warnings),
        },
    }
}
