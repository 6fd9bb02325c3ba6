use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

mod app;

/// Ingest orchestration service: schedules jobs, dispatches them to the
/// remote Job Processor, triggers archive deposits and sweeps artifacts.
#[derive(Parser)]
#[command(name = "curator", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CURATOR_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config =
        curator_core::CuratorConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let tz = config.scheduler.resolve_timezone()?;

    // initialize SQLite database, single file for all subsystems
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(&db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // run all schema migrations (idempotent)
    curator_jobs::db::init_db(&db)?;
    curator_sweeper::db::init_db(&db)?;
    info!("database migrations complete");
    drop(db);

    // stores; in-memory reference backends until a persistent adapter lands
    let configs: Arc<dyn curator_core::ConfigStore> =
        Arc::new(curator_core::MemoryConfigStore::new());
    let reports: Arc<dyn curator_core::ReportStore> =
        Arc::new(curator_core::MemoryReportStore::new());

    // build subsystems, each gets its own connection for thread safety
    let archive = match &config.archive {
        Some(archive_config) => Some(curator_archive::from_config(archive_config)?),
        None => {
            info!("no archive backend configured, ingest actions will fail");
            None
        }
    };
    let sweeper = if config.sweeper.enabled {
        Some(Arc::new(curator_sweeper::Sweeper::new(
            &config.sweeper,
            rusqlite::Connection::open(&db_path)?,
        )?))
    } else {
        info!("artifact sweeper disabled");
        None
    };
    let processor: Arc<dyn curator_jobs::JobProcessor> =
        Arc::new(curator_jobs::HttpProcessor::new(&config.processor)?);
    let runs = curator_jobs::RunStore::new(rusqlite::Connection::open(&db_path)?)?;

    let controller = Arc::new(curator_jobs::JobController::new(
        &config.processor,
        processor,
        runs,
        Arc::clone(&configs),
        Arc::clone(&reports),
        archive,
        sweeper,
    ));

    // fired-job channel: SchedulerEngine -> WorkerPool
    let (fired_tx, fired_rx) =
        tokio::sync::mpsc::channel(curator_scheduler::FIRED_CHANNEL_CAPACITY);
    let engine = Arc::new(curator_scheduler::SchedulerEngine::new(
        Duration::from_millis(config.scheduler.tick_ms),
        tz,
        fired_tx,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let pool = curator_jobs::WorkerPool::new(Arc::clone(&controller), config.processor.workers);
    let pool_shutdown = shutdown_rx.clone();
    let pool_task = tokio::spawn(async move { pool.run(fired_rx, pool_shutdown).await });

    // close out interrupted local runs and resume polling live remote ones
    let resumed = controller.reattach(&shutdown_rx).await?;
    if resumed > 0 {
        info!(resumed, "re-attached to in-flight runs");
    }

    let orchestrator = app::Orchestrator::new(engine, Arc::clone(&controller), Arc::clone(&configs));

    if config.sweeper.enabled {
        orchestrator.schedule(sweep_job(&config.sweeper))?;
    }
    if config.scheduler.startup {
        orchestrator.seed()?;
        orchestrator.start();
    } else {
        info!("scheduling at startup disabled, loop idle until started");
    }

    info!("curator started");
    shutdown_signal().await;
    info!("shutdown signal received");

    orchestrator.stop().await;
    let _ = shutdown_tx.send(true);
    let _ = pool_task.await;
    info!("curator stopped");
    Ok(())
}

/// Built-in recurring job running the artifact sweeper. Stored under a fixed
/// id so a restart replaces the entry instead of accumulating copies.
fn sweep_job(config: &curator_core::config::SweeperConfig) -> curator_core::JobConfiguration {
    let interval = u32::try_from(config.interval_secs).unwrap_or(u32::MAX).max(1);
    curator_core::JobConfiguration {
        id: curator_core::JobId::from("artifact-sweep"),
        name: "artifact sweep".to_string(),
        action: curator_core::JobAction::Sweep,
        schedule: curator_core::Schedule::every(curator_core::TimeUnit::Second, interval),
        last_modified: chrono::Utc::now(),
        latest_run: None,
    }
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("SIGINT handler installation failed");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation failed")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
