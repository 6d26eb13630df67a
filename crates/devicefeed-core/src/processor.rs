//! Drives one discovered file through its full lifecycle: dedupe,
//! readiness, transactional persistence, report scheduling, and the
//! final move to the archive or error directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use devicefeed_parser::parse_document;
use devicefeed_reports::ReportRenderer;
use devicefeed_store::{FileStatus, NewProcessingError, Store, StoreError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ProcessorConfig, ReportConfig};
use crate::reports::schedule_reports;
use crate::watcher::DiscoveryEntry;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("file not ready: {0}")]
    NotReady(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct FileProcessor {
    store: Store,
    renderer: Arc<dyn ReportRenderer>,
    archive_dir: PathBuf,
    error_dir: PathBuf,
    config: ProcessorConfig,
}

impl FileProcessor {
    pub fn new(
        store: Store,
        renderer: Arc<dyn ReportRenderer>,
        report: &ReportConfig,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            archive_dir: report.archive_path.clone(),
            error_dir: report.error_path.clone(),
            config,
        }
    }

    /// Process one file end-to-end.
    ///
    /// Everything persisted for the file (record, rows, errors,
    /// counters, terminal status) becomes visible in a single commit;
    /// reports and the on-disk move happen strictly after it.
    pub async fn process(&self, entry: &DiscoveryEntry) -> Result<(), ProcessError> {
        info!(file = %entry.filename, "processing file");

        // Dedupe before touching the file: identical content that is
        // already recorded only needs its on-disk leftover moved.
        if let Some(existing) = self.store.latest_file_by_filename(&entry.filename).await? {
            if existing.file_hash == entry.hash {
                info!(
                    file = %entry.filename,
                    status = existing.status.as_str(),
                    "file already processed"
                );
                self.move_existing(&entry.path, existing.status).await;
                return Ok(());
            }
            // Same filename with new content: a fresh ingest attempt,
            // the prior record stays as history.
        }

        self.wait_for_ready(&entry.path).await?;

        let mut tx = self.store.begin().await?;

        let file = match tx.create_file(&entry.filename, &entry.hash).await {
            Ok(file) => file,
            Err(err) if err.is_unique_violation() => {
                // Lost the race against another worker ingesting the
                // same content; adopt its outcome.
                drop(tx);
                info!(file = %entry.filename, "file ingested concurrently elsewhere");
                if let Some(existing) =
                    self.store.latest_file_by_filename(&entry.filename).await?
                {
                    self.move_existing(&entry.path, existing.status).await;
                }
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        debug!(file = %entry.filename, file_id = file.id, "created file record");

        let content = match tokio::fs::read_to_string(&entry.path).await {
            Ok(content) => content,
            Err(err) => {
                let message = format!("failed to read file: {err}");
                tx.insert_processing_error(
                    file.id,
                    &NewProcessingError::whole_file(message.clone()),
                )
                .await?;
                tx.update_status(file.id, FileStatus::Failed, Some(message.as_str()))
                    .await?;
                tx.commit().await?;
                warn!(file = %entry.filename, error = %err, "file unreadable, marked failed");
                self.move_file(&entry.path, &self.error_dir).await;
                return Ok(());
            }
        };

        let document = parse_document(&content);

        if document.is_empty() {
            let message = "file contained no data records";
            tx.insert_processing_error(file.id, &NewProcessingError::whole_file(message))
                .await?;
            tx.update_status(file.id, FileStatus::Failed, Some(message))
                .await?;
            tx.commit().await?;
            warn!(file = %entry.filename, "empty file, marked failed");
            self.move_file(&entry.path, &self.error_dir).await;
            return Ok(());
        }

        for line_error in &document.errors {
            let record = NewProcessingError {
                line_number: Some(line_error.line_number),
                raw_line: Some(line_error.raw_line.clone()),
                error_message: line_error.error.to_string(),
                field_name: line_error.error.field().map(str::to_string),
            };
            tx.insert_processing_error(file.id, &record).await?;
        }

        let mut success_count = 0i32;
        let mut failed_count = 0i32;
        for record in &document.records {
            match tx.insert_device_row(file.id, record).await {
                Ok(()) => success_count += 1,
                Err(err) => {
                    error!(
                        file = %entry.filename,
                        line = record.line_number,
                        error = %err,
                        "failed to insert device row"
                    );
                    failed_count += 1;
                }
            }
        }

        tx.update_progress(file.id, success_count, failed_count)
            .await?;

        let status = resolve_status(success_count, failed_count, document.errors.len());
        tx.update_status(file.id, status, None).await?;

        // A commit failure leaves the file in place; the next scan
        // retries from scratch.
        tx.commit().await?;
        info!(
            file = %entry.filename,
            status = status.as_str(),
            rows_processed = success_count,
            rows_failed = failed_count,
            "transaction committed"
        );

        schedule_reports(&self.store, self.renderer.as_ref(), &document.records).await;

        let destination = match status {
            FileStatus::Failed => &self.error_dir,
            _ => &self.archive_dir,
        };
        self.move_file(&entry.path, destination).await;

        Ok(())
    }

    /// Poll until the file has a non-zero size that held steady across
    /// two consecutive observations.
    async fn wait_for_ready(&self, path: &Path) -> Result<(), ProcessError> {
        let deadline = Instant::now() + self.config.readiness_timeout();
        let mut previous_size: Option<u64> = None;

        while Instant::now() < deadline {
            let metadata = tokio::fs::metadata(path).await?;
            let size = metadata.len();
            if size > 0 && previous_size == Some(size) {
                return Ok(());
            }
            previous_size = Some(size);
            tokio::time::sleep(self.config.readiness_poll_interval()).await;
        }

        Err(ProcessError::NotReady(format!(
            "file size not stable within {:?}",
            self.config.readiness_timeout()
        )))
    }

    /// Move an already-recorded file to its status-appropriate
    /// directory, if it is still present.
    async fn move_existing(&self, path: &Path, status: FileStatus) {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            _ => {
                debug!(file = %path.display(), "file already moved or deleted");
                return;
            }
        }

        match status {
            FileStatus::Completed | FileStatus::Partial => {
                self.move_file(path, &self.archive_dir).await;
            }
            FileStatus::Failed => {
                self.move_file(path, &self.error_dir).await;
            }
            // still pending or mid-flight elsewhere: leave it alone
            FileStatus::Pending | FileStatus::Processing => {}
        }
    }

    /// Best-effort move; failures are logged and the file is left in
    /// place for the next scan to re-dedupe.
    async fn move_file(&self, src: &Path, dest_dir: &Path) {
        if let Err(err) = move_into(src, dest_dir).await {
            warn!(
                file = %src.display(),
                dest = %dest_dir.display(),
                error = %err,
                "failed to move file"
            );
        } else {
            info!(file = %src.display(), dest = %dest_dir.display(), "file moved");
        }
    }
}

/// Terminal status for an ingest: nothing landed means failure; any
/// line-level error or row-insert failure alongside landed rows means
/// a partial ingest.
fn resolve_status(success_count: i32, failed_count: i32, parse_error_count: usize) -> FileStatus {
    if success_count == 0 {
        FileStatus::Failed
    } else if failed_count > 0 || parse_error_count > 0 {
        FileStatus::Partial
    } else {
        FileStatus::Completed
    }
}

/// Rename into `dest_dir`, falling back to copy+unlink when rename is
/// refused (e.g. across filesystems).
async fn move_into(src: &Path, dest_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dest_dir).await?;
    let filename = src
        .file_name()
        .ok_or_else(|| std::io::Error::other("source path has no filename"))?;
    let dest = dest_dir.join(filename);

    match tokio::fs::rename(src, &dest).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(src, &dest).await?;
            tokio::fs::remove_file(src).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_status;
    use devicefeed_store::FileStatus;

    #[test]
    fn status_resolution_follows_the_ingest_outcome() {
        assert_eq!(resolve_status(0, 0, 1), FileStatus::Failed);
        assert_eq!(resolve_status(0, 2, 0), FileStatus::Failed);
        assert_eq!(resolve_status(2, 0, 0), FileStatus::Completed);
        assert_eq!(resolve_status(1, 0, 2), FileStatus::Partial);
        assert_eq!(resolve_status(1, 1, 0), FileStatus::Partial);
    }
}
