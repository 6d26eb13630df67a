//! Periodic retention maintenance: prune old api_logs, completed
//! files, and report rows.

use chrono::{Duration as ChronoDuration, Utc};
use devicefeed_store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CleanupConfig;

/// Spawn the maintenance loop. The first pass runs immediately; the
/// loop exits when the shutdown signal fires.
pub fn spawn(
    store: Store,
    config: CleanupConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = config.interval_secs, "starting cleanup tasks");
        let mut ticker = tokio::time::interval(config.interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => run_cleanup(&store, &config).await,
                _ = shutdown.changed() => break,
            }
        }
        info!("cleanup loop stopped");
    })
}

async fn run_cleanup(store: &Store, config: &CleanupConfig) {
    let now = Utc::now();

    match store
        .delete_api_logs_before(now - ChronoDuration::days(config.api_log_retention_days))
        .await
    {
        Ok(pruned) => debug!(pruned, "pruned old api logs"),
        Err(err) => warn!(error = %err, "failed to prune api logs"),
    }

    match store
        .delete_completed_files_before(now - ChronoDuration::days(config.file_retention_days))
        .await
    {
        Ok(pruned) => debug!(pruned, "pruned old completed files"),
        Err(err) => warn!(error = %err, "failed to prune files"),
    }

    match store
        .delete_reports_before(now - ChronoDuration::days(config.report_retention_days))
        .await
    {
        Ok(pruned) => debug!(pruned, "pruned old reports"),
        Err(err) => warn!(error = %err, "failed to prune reports"),
    }

    info!("cleanup pass completed");
}
