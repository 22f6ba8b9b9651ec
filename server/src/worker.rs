//! In-process stand-in for the forum's job queue: bounded, at-least-once,
//! with exponential backoff on retryable failures.

use std::sync::Arc;
use std::time::Duration;
use sync_core::{SyncCoordinator, SyncJob};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_size: usize,
    /// Jobs allowed to run at the same time.
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { queue_size: 1024, concurrency: 4, max_retries: 3, retry_backoff_ms: 500 }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<SyncJob>,
}

impl JobQueue {
    /// Spawn the dispatcher. It stops once every `JobQueue` clone is dropped.
    pub fn start(coordinator: Arc<SyncCoordinator>, config: WorkerConfig) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<SyncJob>(config.queue_size.max(1));
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

        let handle = tokio::spawn(async move {
            info!(concurrency = config.concurrency, "sync worker started");
            let mut running = Vec::new();
            while let Some(job) = rx.recv().await {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let coordinator = coordinator.clone();
                let config = config.clone();
                running.push(tokio::spawn(async move {
                    run_with_retry(&coordinator, &job, &config).await;
                    drop(permit);
                }));
                running.retain(|h: &JoinHandle<()>| !h.is_finished());
            }
            for h in running {
                let _ = h.await;
            }
            info!("sync worker stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue a job without waiting; fails when the queue is full or closed.
    pub fn enqueue(&self, job: SyncJob) -> Result<(), TrySendError<SyncJob>> {
        self.tx.try_send(job)
    }
}

/// Run `job`, retrying retryable failures. Returns whether it succeeded.
pub async fn run_with_retry(coordinator: &SyncCoordinator, job: &SyncJob, config: &WorkerConfig) -> bool {
    let mut attempts: u32 = 0;
    loop {
        if attempts > 0 {
            let delay = config.retry_backoff_ms.saturating_mul(2_u64.saturating_pow(attempts - 1));
            info!(?job, attempt = attempts + 1, delay_ms = delay, "retrying sync job");
            sleep(Duration::from_millis(delay)).await;
        }

        match coordinator.run(job).await {
            Ok(()) => return true,
            Err(e) if e.is_retryable() && attempts < config.max_retries => {
                warn!(?job, attempts = attempts + 1, error = %e, "sync job failed");
            }
            Err(e) => {
                error!(?job, total_attempts = attempts + 1, error = %e, "sync job failed after all retries");
                return false;
            }
        }
        attempts += 1;
    }
}
