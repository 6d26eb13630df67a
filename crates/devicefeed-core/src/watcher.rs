//! Directory watcher: periodic scans of the watch directory, content
//! hashing, in-process dedupe, and the bounded discovery queue that
//! feeds the worker pool.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;

/// Deadline applied to externally offered entries.
pub const DEFAULT_OFFER_TIMEOUT: Duration = Duration::from_secs(5);

/// A candidate file discovered in the watch directory. Owned by one
/// worker from the moment it is dequeued.
#[derive(Debug, Clone)]
pub struct DiscoveryEntry {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Hex SHA-256 of the full file contents.
    pub hash: String,
}

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("queue is full, timeout after {0:?}")]
    Full(Duration),

    #[error("queue is closed")]
    Closed,
}

/// Stream a file through SHA-256 and return the hex digest.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub struct DirectoryWatcher {
    watch_dir: PathBuf,
    interval: Duration,
    sender: Mutex<Option<mpsc::Sender<DiscoveryEntry>>>,
    receiver: Mutex<Option<mpsc::Receiver<DiscoveryEntry>>>,
    /// Content hashes already enqueued at least once this process
    /// lifetime. Durable dedupe lives in the store.
    seen_hashes: Mutex<HashSet<String>>,
    shutdown: watch::Sender<bool>,
}

impl DirectoryWatcher {
    pub fn new(config: &WatchConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            watch_dir: config.path.clone(),
            interval: config.scan_interval(),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            seen_hashes: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    /// Take the receive side of the discovery queue. Yields `Some`
    /// exactly once.
    pub fn take_queue(&self) -> Option<mpsc::Receiver<DiscoveryEntry>> {
        self.receiver.lock().expect("queue lock poisoned").take()
    }

    /// Spawn the scan loop: one immediate scan, then one per interval
    /// until [`DirectoryWatcher::stop`].
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            info!(
                dir = %watcher.watch_dir.display(),
                interval_secs = watcher.interval.as_secs(),
                "starting directory watcher"
            );

            let mut ticker = tokio::time::interval(watcher.interval);
            // the first tick fires immediately and covers the initial scan
            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => watcher.scan_directory().await,
                    _ = shutdown.changed() => break,
                }
            }

            info!("directory watcher stopped");
        })
    }

    /// Stop scanning and close the queue so consumers observe
    /// end-of-stream. Safe to call more than once.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        let mut sender = self.sender.lock().expect("sender lock poisoned");
        if sender.take().is_some() {
            info!("file queue closed");
        }
    }

    /// Enqueue an entry on behalf of an external caller, waiting up to
    /// `timeout` for queue space.
    pub async fn offer(
        &self,
        entry: DiscoveryEntry,
        timeout: Duration,
    ) -> Result<(), OfferError> {
        let sender = self
            .sender
            .lock()
            .expect("sender lock poisoned")
            .clone()
            .ok_or(OfferError::Closed)?;

        let hash = entry.hash.clone();
        let filename = entry.filename.clone();
        self.remember(hash.clone());
        match sender.send_timeout(entry, timeout).await {
            Ok(()) => {
                info!(file = %filename, "manually queued file");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.forget(&hash);
                Err(OfferError::Full(timeout))
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.forget(&hash);
                Err(OfferError::Closed)
            }
        }
    }

    async fn scan_directory(&self) {
        let mut entries = match tokio::fs::read_dir(&self.watch_dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    dir = %self.watch_dir.display(),
                    error = %err,
                    "failed to read watch directory"
                );
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to read directory entry");
                    break;
                }
            };

            let filename = entry.file_name().to_string_lossy().into_owned();
            if !is_candidate_name(&filename) {
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "failed to stat file");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let hash = match hash_file(&path).await {
                Ok(hash) => hash,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "failed to hash file");
                    continue;
                }
            };

            if self.already_seen(&hash) {
                continue;
            }

            let discovery = DiscoveryEntry {
                path,
                filename: filename.clone(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
                hash: hash.clone(),
            };

            // Scan enqueues never block: a full queue means the file
            // stays on disk and remains eligible next tick. The hash
            // is recorded before the entry can reach a worker and
            // withdrawn again if the enqueue does not go through.
            let sender = self.sender.lock().expect("sender lock poisoned").clone();
            let Some(sender) = sender else { return };
            self.remember(hash.clone());
            match sender.try_send(discovery) {
                Ok(()) => debug!(file = %filename, "queued file"),
                Err(TrySendError::Full(_)) => {
                    self.forget(&hash);
                    debug!(file = %filename, "queue full, retrying next scan");
                }
                Err(TrySendError::Closed(_)) => {
                    self.forget(&hash);
                    return;
                }
            }
        }
    }

    fn already_seen(&self, hash: &str) -> bool {
        self.seen_hashes
            .lock()
            .expect("hash set lock poisoned")
            .contains(hash)
    }

    fn remember(&self, hash: String) {
        self.seen_hashes
            .lock()
            .expect("hash set lock poisoned")
            .insert(hash);
    }

    fn forget(&self, hash: &str) {
        self.seen_hashes
            .lock()
            .expect("hash set lock poisoned")
            .remove(hash);
    }
}

/// Direct-child regular files named `*.tsv` (case-insensitive),
/// excluding hidden files.
fn is_candidate_name(filename: &str) -> bool {
    !filename.starts_with('.') && filename.to_ascii_lowercase().ends_with(".tsv")
}

#[cfg(test)]
mod tests {
    use super::is_candidate_name;

    #[test]
    fn candidate_names_are_visible_tsv_files() {
        assert!(is_candidate_name("devices.tsv"));
        assert!(is_candidate_name("DEVICES.TSV"));
        assert!(!is_candidate_name(".hidden.tsv"));
        assert!(!is_candidate_name("devices.csv"));
        assert!(!is_candidate_name("devices.tsv.bak"));
    }
}
