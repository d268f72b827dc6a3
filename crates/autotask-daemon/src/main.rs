use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use autotask_core::config::AutotaskConfig;
use autotask_engine::{SchedulerController, SchedulerEngine, TaskExecutor};
use autotask_store::TaskStore;

/// Background task scheduler and script execution daemon.
#[derive(Parser, Debug)]
#[command(name = "autotaskd", version, about)]
struct Args {
    /// Path to autotask.toml (default: AUTOTASK_CONFIG env, then ~/.autotask/autotask.toml)
    #[arg(long)]
    config: Option<String>,

    /// SQLite database path, overriding the configured one
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autotask=info,autotaskd=info".into()),
        )
        .init();

    let config = AutotaskConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        AutotaskConfig::default()
    });
    let db_path = args.db.unwrap_or(config.database.path);

    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening database");
    // A daemon without its store is useless; this failure is fatal.
    let store = Arc::new(TaskStore::open(&db_path)?);

    let executor = Arc::new(TaskExecutor::new(Arc::clone(&store)));
    let engine = SchedulerEngine::new(
        Arc::clone(&store),
        executor,
        Duration::from_secs(config.scheduler.check_interval_secs),
    );
    let mut controller = SchedulerController::new(engine);
    controller.start();

    store.log_system_event("info", "daemon", "autotaskd started", None, None)?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    controller.stop().await;
    store.log_system_event("info", "daemon", "autotaskd stopped", None, None)?;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
