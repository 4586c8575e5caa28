use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use lethe::{
    config::{FileSettingsSource, LetheConfig},
    db::DbPool,
    observability,
    retention::{EstimateScope, FileDeleter, RetentionEngine, SystemClock, start_retention_worker},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// CLI arguments for Lethe
#[derive(Parser, Debug)]
#[command(version, about = "Lethe retention engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./lethe.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run retention now, repeating until no overdue work is left
    Run,
    /// Count what a run would touch without changing anything
    Estimate {
        /// What to count: "records" or "files"
        #[arg(long, default_value = "records")]
        scope: EstimateScope,
    },
    /// Run the daily scheduler until interrupted
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Show recent runs and audit log entries
    History {
        /// Number of runs to show
        #[arg(long, default_value = "10")]
        runs: u32,
        /// Number of log entries to show
        #[arg(long, default_value = "20")]
        logs: u32,
    },
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./lethe.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

const DEFAULT_CONFIG_FILE: &str = "lethe.toml";

/// Default configuration written by `lethe init`.
/// Both dispositions are `keep`, so the generated file changes nothing until
/// edited.
fn default_config_toml() -> &'static str {
    r#"# Lethe retention engine configuration

[database]
type = "sqlite"
path = "./lethe.db"

[storage]
# Files are only ever deleted inside this directory.
upload_root = "./uploads"
# Public URL prefix of upload_root, for records that store URLs.
# base_url = "https://example.com/uploads"

[retention]
# keep | soft_delete | hard_delete
record_disposition = "keep"
# keep | delete
file_disposition = "keep"
global_retention_days = 365
log_limit = 256

# Per-category overrides. mode is one of global | never | custom.
# [retention.categories.invoices]
# mode = "custom"
# days = 30

[retention.schedule]
enabled = false
hour = 3
utc_offset = "+00:00"
continuation_delay_secs = 60

[observability.logging]
level = "info"
format = "compact"

[observability.metrics]
enabled = false
listen = "127.0.0.1:9464"
"#
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Init { output, force } => run_init(output, force),
        Command::Migrate => run_migrate(args.config.as_deref()).await,
        Command::Run => run_retention(args.config.as_deref()).await,
        Command::Estimate { scope } => run_estimate(args.config.as_deref(), scope).await,
        Command::History { runs, logs } => run_history(args.config.as_deref(), runs, logs).await,
        Command::Serve => run_serve(args.config.as_deref()).await,
    }
}

fn resolve_config_path(explicit_path: Option<&str>) -> Result<PathBuf, String> {
    let path = PathBuf::from(explicit_path.unwrap_or(DEFAULT_CONFIG_FILE));
    if !path.exists() {
        return Err(format!(
            "Config file not found: {}\nCreate one with: lethe init",
            path.display()
        ));
    }
    Ok(path)
}

/// Resolve and load the configuration, then install the log subscriber.
fn load_config(explicit_path: Option<&str>) -> (PathBuf, LetheConfig) {
    let config_path = match resolve_config_path(explicit_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match LetheConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    tracing::debug!(config_file = %config_path.display(), "Configuration loaded");
    (config_path, config)
}

async fn connect(config: &LetheConfig) -> DbPool {
    if config.database.is_none() {
        eprintln!("Error: Database is not configured.");
        std::process::exit(1);
    }

    match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_engine(config: &LetheConfig, db: &DbPool) -> RetentionEngine {
    let files = match FileDeleter::from_config(&config.storage) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    RetentionEngine::new(
        db.records(),
        db.run_logs(),
        files,
        Arc::new(SystemClock),
    )
}

/// Initialize a new configuration file
fn run_init(output: Option<String>, force: bool) {
    let output_path = PathBuf::from(output.as_deref().unwrap_or(DEFAULT_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Nothing is deleted until record_disposition or file_disposition is changed.");
    println!("Preview the effect of your rules with:");
    println!("  lethe estimate");
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let (_, config) = load_config(explicit_config_path);
    tracing::info!("Running database migrations");

    let db = connect(&config).await;
    match db.run_migrations().await {
        Ok(()) => {
            tracing::info!("Database migrations completed successfully");
        }
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed");
            eprintln!("Error: Database migrations failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_retention(explicit_config_path: Option<&str>) {
    let (_, config) = load_config(explicit_config_path);
    let db = connect(&config).await;
    let engine = build_engine(&config, &db);

    loop {
        let summary = match engine.run_manual(&config.retention).await {
            Ok(summary) => summary,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        };

        println!(
            "Run {}: {} ({} processed, {} warnings, {} errors)",
            summary.run_id, summary.status, summary.processed, summary.warnings, summary.errors
        );

        if !summary.has_more {
            break;
        }
    }
}

async fn run_estimate(explicit_config_path: Option<&str>, scope: EstimateScope) {
    let (_, config) = load_config(explicit_config_path);
    let db = connect(&config).await;
    let engine = build_engine(&config, &db);

    match engine.estimate(&config.retention, scope).await {
        Ok(estimate) => println!("{} {} would be affected", estimate.count, estimate.scope),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_history(explicit_config_path: Option<&str>, runs: u32, logs: u32) {
    let (_, config) = load_config(explicit_config_path);
    let db = connect(&config).await;
    let repo = db.run_logs();

    let (run_rows, log_rows, total_logs) =
        match tokio::try_join!(repo.list_runs(runs), repo.list_logs(logs), repo.count_logs()) {
            Ok(rows) => rows,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        };

    println!("Runs:");
    for run in &run_rows {
        println!(
            "  #{:<5} {}  {:<8} {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.status,
            run.message
        );
    }

    println!();
    println!("Log ({} of {} entries):", log_rows.len(), total_logs);
    for entry in &log_rows {
        let tags = entry
            .actions
            .iter()
            .map(|a| a.tag())
            .collect::<Vec<_>>()
            .join("");
        println!(
            "  {}  {:<8} {} #{} {} {}",
            entry.time.format("%Y-%m-%d %H:%M:%S"),
            entry.status,
            entry.category_label,
            entry.record_id,
            tags,
            entry.message
        );
    }
}

async fn run_serve(explicit_config_path: Option<&str>) {
    let (config_path, config) = load_config(explicit_config_path);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let db = connect(&config).await;
    if let Err(e) = db.health_check().await {
        tracing::error!(error = %e, "Database health check failed");
        eprintln!("Error: Database health check failed: {}", e);
        std::process::exit(1);
    }

    let engine = Arc::new(build_engine(&config, &db));
    let source = Arc::new(FileSettingsSource::new(config_path));

    let task_tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    task_tracker.spawn(start_retention_worker(engine, source, shutdown.clone()));

    shutdown_signal(task_tracker, shutdown).await;
}

/// Wait for SIGINT/SIGTERM, then let the worker finish its current run.
async fn shutdown_signal(task_tracker: TaskTracker, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, waiting for the active retention run to finish");

    shutdown.cancel();
    task_tracker.close();
    task_tracker.wait().await;
}

#[cfg(test)]
mod tests {
    use lethe::config::{FileDisposition, RecordDisposition};

    use super::*;

    #[test]
    fn test_default_config_parses_and_changes_nothing() {
        let config = LetheConfig::from_str(default_config_toml()).unwrap();
        assert_eq!(config.retention.record_disposition, RecordDisposition::Keep);
        assert_eq!(config.retention.file_disposition, FileDisposition::Keep);
        assert!(!config.retention.has_any_action());
        assert!(!config.retention.schedule.enabled);
        assert!(!config.database.is_none());
    }

    #[test]
    fn test_cli_parses_estimate_scope() {
        let args = Args::try_parse_from(["lethe", "estimate", "--scope", "files"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Estimate {
                scope: EstimateScope::Files
            }
        ));
    }
}
