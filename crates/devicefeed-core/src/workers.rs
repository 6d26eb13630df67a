//! Worker pool: N tasks draining the discovery queue until it closes,
//! each file bounded by the per-file timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::processor::FileProcessor;
use crate::watcher::DiscoveryEntry;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers over a shared queue receiver.
    pub fn spawn(
        count: usize,
        queue: mpsc::Receiver<DiscoveryEntry>,
        processor: Arc<FileProcessor>,
        file_timeout: Duration,
    ) -> Self {
        info!(count, "starting workers");
        let queue = Arc::new(Mutex::new(queue));

        let handles = (1..=count)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let processor = Arc::clone(&processor);
                tokio::spawn(worker_loop(id, queue, processor, file_timeout))
            })
            .collect();

        Self { handles }
    }

    /// Wait for every worker to drain and exit, up to the shutdown
    /// grace period. Workers still mid-file afterwards are abandoned;
    /// their open transactions roll back with the connection.
    pub async fn join(self, grace: Duration) {
        let joined = futures::future::join_all(self.handles);
        if tokio::time::timeout(grace, joined).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "worker shutdown grace period expired, some tasks may be incomplete"
            );
        } else {
            info!("all workers stopped");
        }
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<DiscoveryEntry>>>,
    processor: Arc<FileProcessor>,
    file_timeout: Duration,
) {
    info!(worker = id, "worker started");

    loop {
        let entry = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };
        let Some(entry) = entry else { break };

        let hash_prefix = entry.hash.get(..8).unwrap_or(&entry.hash);
        info!(worker = id, file = %entry.filename, hash = %hash_prefix, "picked up file");
        match tokio::time::timeout(file_timeout, processor.process(&entry)).await {
            Ok(Ok(())) => info!(worker = id, file = %entry.filename, "completed file"),
            Ok(Err(err)) => {
                error!(worker = id, file = %entry.filename, error = %err, "file processing failed")
            }
            Err(_) => error!(
                worker = id,
                file = %entry.filename,
                timeout_secs = file_timeout.as_secs(),
                "file processing timed out"
            ),
        }
    }

    info!(worker = id, "worker stopped (queue closed)");
}
