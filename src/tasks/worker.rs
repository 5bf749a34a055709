use super::processor::{ItemError, ItemProcessor};
use crate::models::SourceRecord;
use crate::source::{MediaSource, SourceError};
use futures::FutureExt;
use std::any::Any;
use std::ops::AddAssign;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

/// Counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items taken off the channel
    pub processed: usize,
    /// Items whose video was created remotely
    pub uploaded: usize,
    /// Items that failed before the video was created
    pub failed: usize,
    /// Uploaded items whose outcome could not be recorded
    pub sink_failures: usize,
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.uploaded += other.uploaded;
        self.failed += other.failed;
        self.sink_failures += other.sink_failures;
    }
}

/// Fixed number of workers sharing one bounded channel
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Feed every record from `source` through `processor`.
    ///
    /// Returns once the source is exhausted and every worker has finished.
    /// Only a fatal source error is returned; item failures are counted.
    pub async fn run(
        &self,
        source: Box<dyn MediaSource>,
        processor: Arc<dyn ItemProcessor>,
    ) -> Result<RunSummary, SourceError> {
        let (tx, rx) = mpsc::channel::<SourceRecord>(self.threads);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.threads {
            workers.spawn(worker_loop(worker_id, rx.clone(), processor.clone()));
        }
        // Only workers hold the receiver, so sends fail once every worker is gone
        drop(rx);
        tracing::info!(target: "tasks::worker", threads = self.threads, "Worker pool started");

        // The sender is moved in and dropped when the source returns, which ends the workers
        let produced = source.produce(tx).await;
        if let Err(e) = &produced {
            tracing::error!(target: "tasks::worker", error = %e, "Media source failed, draining workers");
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => summary += stats,
                Err(e) => {
                    tracing::error!(target: "tasks::worker", error = %e, "Worker task panicked");
                }
            }
        }

        produced?;
        Ok(summary)
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<SourceRecord>>>,
    processor: Arc<dyn ItemProcessor>,
) -> RunSummary {
    let mut stats = RunSummary::default();

    loop {
        // Lock only while waiting; released before the item is processed
        let next = rx.lock().await.recv().await;
        let Some(record) = next else {
            break;
        };
        stats.processed += 1;

        let path = record.item.file_path.display().to_string();
        let outcome = AssertUnwindSafe(processor.process(&record))
            .catch_unwind()
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                stats.failed += 1;
                tracing::error!(
                    target: "tasks::worker",
                    worker_id,
                    path = %path,
                    panic = %panic_message(panic.as_ref()),
                    "Item processing panicked"
                );
                continue;
            }
        };

        match outcome {
            Ok(result) => {
                stats.uploaded += 1;
                tracing::info!(
                    target: "tasks::worker",
                    worker_id,
                    path = %path,
                    video_id = result.remote_id,
                    uuid = %result.uuid,
                    "Item uploaded"
                );
            }
            Err(ItemError::Sink { result, source }) => {
                stats.uploaded += 1;
                stats.sink_failures += 1;
                tracing::error!(
                    target: "tasks::worker",
                    worker_id,
                    path = %path,
                    video_id = result.remote_id,
                    error = %source,
                    "Item uploaded but not recorded"
                );
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(
                    target: "tasks::worker",
                    worker_id,
                    path = %path,
                    error = %e,
                    "Item failed"
                );
            }
        }
    }

    tracing::debug!(target: "tasks::worker", worker_id, processed = stats.processed, "Worker finished");
    stats
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
