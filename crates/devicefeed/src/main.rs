use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devicefeed_api::ApiState;
use devicefeed_core::config::LogConfig;
use devicefeed_core::{cleanup, reports, AppConfig, DirectoryWatcher, FileProcessor, WorkerPool};
use devicefeed_store::Store;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "TSV device-event ingestion service", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion service: watcher, workers, read API, cleanup
    Run,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load config")?;
    init_tracing(&config.log)?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Migrate => migrate(config).await,
    }
}

fn init_tracing(log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .context("invalid log.level")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format.as_str() {
        "pretty" => builder.init(),
        _ => builder.json().init(),
    }
    Ok(())
}

async fn migrate(config: AppConfig) -> Result<()> {
    let store = Store::connect(&config.store.settings())
        .await
        .context("failed to connect to database")?;
    store
        .run_migrations()
        .await
        .context("failed to run migrations")?;
    info!("migrations applied");
    store.close().await;
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    config
        .ensure_directories()
        .context("failed to create directories")?;

    let store = Store::connect(&config.store.settings())
        .await
        .context("failed to connect to database")?;
    store
        .health_check()
        .await
        .context("database ping failed")?;
    store
        .ensure_tables()
        .await
        .context("required tables missing, run `devicefeed migrate` first")?;
    info!("database connection established");

    let watcher = Arc::new(DirectoryWatcher::new(&config.watch));
    let queue = watcher.take_queue().expect("fresh watcher owns its queue");

    let renderer = reports::build_renderer(&config.report);
    let processor = Arc::new(FileProcessor::new(
        store.clone(),
        renderer,
        &config.report,
        config.processor.clone(),
    ));

    let (shutdown_tx, _) = watch::channel(false);

    let watcher_handle = watcher.start();
    let pool = WorkerPool::spawn(
        config.worker.count,
        queue,
        processor,
        config.worker.file_timeout(),
    );
    let cleanup_handle = cleanup::spawn(
        store.clone(),
        config.cleanup.clone(),
        shutdown_tx.subscribe(),
    );

    let api_state = ApiState {
        store: store.clone(),
        watcher: Arc::clone(&watcher),
        watch_dir: config.watch.path.clone(),
    };
    let api_addr: SocketAddr = config
        .api
        .addr
        .parse()
        .context("invalid api.addr")?;
    let api_handle = tokio::spawn(devicefeed_api::serve(
        api_addr,
        api_state,
        shutdown_tx.subscribe(),
    ));

    wait_for_signal().await;
    info!("shutdown signal received");

    // Shutdown order: stop admitting work (watcher closes the queue),
    // let workers drain within the grace period, then close the store.
    let _ = shutdown_tx.send(true);
    watcher.stop();
    if let Err(err) = watcher_handle.await {
        warn!(error = %err, "watcher task ended abnormally");
    }

    pool.join(config.worker.shutdown_grace()).await;

    if let Err(err) = cleanup_handle.await {
        warn!(error = %err, "cleanup task ended abnormally");
    }
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "API server error"),
        Err(err) => warn!(error = %err, "API task ended abnormally"),
    }

    store.close().await;
    info!("shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
