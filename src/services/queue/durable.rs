//! Durable queue backend: Redis-keyed lists with at-least-once delivery.
//!
//! Waiting jobs live on one list, in-flight jobs are moved to a processing
//! list, and permanently failed jobs are retained on a failed list for
//! operator inspection. Completed jobs are purged immediately. A failing
//! job is retried up to [`MAX_ATTEMPTS`] total with exponential backoff.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::job::{JobId, JobPayload, JobProgress, QueueStats};
use crate::services::queue::{JobContext, JobHandler, QueueError};

const WAITING_KEY: &str = "stickerforge:jobs";
const PROCESSING_KEY: &str = "stickerforge:processing";
const FAILED_KEY: &str = "stickerforge:failed";

/// Total attempts before a job is permanently Failed.
const MAX_ATTEMPTS: u32 = 3;

/// Idle poll interval when the waiting list is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Job record serialized into Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DurableJob {
    id: Uuid,
    /// 1-based attempt number of the next execution.
    attempt: u32,
    /// All payloads from this system are scheduled at one fixed priority;
    /// with a single priority level the list order is plain FIFO.
    priority: u8,
    enqueued_at: DateTime<Utc>,
    payload: JobPayload,
}

#[derive(Debug, Clone)]
pub struct DurableOptions {
    pub priority: u8,
    pub retry_base_delay: Duration,
}

struct Shared {
    options: DurableOptions,
    active: AtomicUsize,
    completed: AtomicU64,
    closed: AtomicBool,
    shutdown: Notify,
}

pub struct DurableQueue {
    client: redis::Client,
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl DurableQueue {
    pub fn new(redis_url: &str, options: DurableOptions) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            shared: Arc::new(Shared {
                options,
                active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            dispatcher: Mutex::new(None),
        })
    }

    /// Enqueue a job. Connectivity loss surfaces here synchronously.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<JobId, QueueError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let job = DurableJob {
            id: Uuid::new_v4(),
            attempt: 1,
            priority: self.shared.options.priority,
            enqueued_at: Utc::now(),
            payload,
        };
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let record = serde_json::to_string(&job)?;
        conn.lpush::<_, _, ()>(WAITING_KEY, &record).await?;
        tracing::info!(job_id = %job.id, "Job enqueued");
        Ok(JobId::Key(job.id))
    }

    pub async fn register_handler(&self, concurrency: usize, handler: JobHandler) {
        let mut slot = self.dispatcher.lock().await;
        if let Some(previous) = slot.take() {
            tracing::warn!("Queue handler re-registered; replacing active dispatcher");
            previous.abort();
        }
        tracing::info!(concurrency, "Queue processor registered");
        *slot = Some(tokio::spawn(run_dispatcher(
            self.client.clone(),
            self.shared.clone(),
            concurrency,
            handler,
        )));
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let waiting: u64 = conn.llen(WAITING_KEY).await?;
        let failed: u64 = conn.llen(FAILED_KEY).await?;
        Ok(QueueStats {
            waiting: waiting as usize,
            active: self.shared.active.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
            failed,
        })
    }

    /// Stop admission and shut the dispatcher down. Waits for the dispatch
    /// loop only; running jobs are left to finish on their own.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_waiters();
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("Durable queue closed");
    }

    /// Redis connectivity probe.
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// Move jobs left on the processing list by a stalled worker back to
/// waiting. This is the only path that takes a job from Active back to
/// Queued; application code never triggers it.
async fn recover_stalled(client: &redis::Client) -> Result<u64, QueueError> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let mut recovered = 0u64;
    loop {
        let moved: Option<String> = conn.rpoplpush(PROCESSING_KEY, WAITING_KEY).await?;
        if moved.is_none() {
            break;
        }
        recovered += 1;
    }
    Ok(recovered)
}

async fn dequeue(client: &redis::Client) -> Result<Option<DurableJob>, QueueError> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let record: Option<String> = conn.rpoplpush(WAITING_KEY, PROCESSING_KEY).await?;
    match record {
        Some(record) => Ok(Some(serde_json::from_str(&record)?)),
        None => Ok(None),
    }
}

/// Remove a job's record from the processing list.
async fn drop_from_processing(client: &redis::Client, job: &DurableJob) -> Result<(), QueueError> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let record = serde_json::to_string(job)?;
    conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &record).await?;
    Ok(())
}

async fn retain_failed(client: &redis::Client, job: &DurableJob) -> Result<(), QueueError> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let record = serde_json::to_string(job)?;
    conn.lpush::<_, _, ()>(FAILED_KEY, &record).await?;
    conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &record).await?;
    Ok(())
}

async fn run_dispatcher(
    client: redis::Client,
    shared: Arc<Shared>,
    concurrency: usize,
    handler: JobHandler,
) {
    match recover_stalled(&client).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(recovered = n, "Re-queued stalled jobs from processing list"),
        Err(e) => tracing::error!(error = %e, "Stall recovery failed"),
    }

    let slots = Arc::new(Semaphore::new(concurrency));
    'outer: loop {
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        let permit = tokio::select! {
            permit = slots.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = shared.shutdown.notified() => break,
        };

        // Poll until a job arrives or shutdown is requested.
        let job = loop {
            if shared.closed.load(Ordering::SeqCst) {
                break 'outer;
            }
            match dequeue(&client).await {
                Ok(Some(job)) => break job,
                Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => {
                    tracing::error!(error = %e, "Dequeue failed, backing off");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        };

        shared.active.fetch_add(1, Ordering::SeqCst);
        let client = client.clone();
        let shared = shared.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let _slot = permit;
            run_job(client, shared, handler, job).await;
        });
    }
    tracing::info!("Dispatch loop stopped");
}

async fn run_job(client: redis::Client, shared: Arc<Shared>, handler: JobHandler, job: DurableJob) {
    tracing::info!(job_id = %job.id, attempt = job.attempt, "Processing job");
    let ctx = JobContext {
        id: JobId::Key(job.id),
        attempt: job.attempt,
        max_attempts: MAX_ATTEMPTS,
        payload: job.payload.clone(),
        progress: JobProgress::new(),
    };
    let result = handler(ctx).await;
    shared.active.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(()) => {
            shared.completed.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = drop_from_processing(&client, &job).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to purge completed job");
            }
            tracing::info!(job_id = %job.id, "Job completed");
        }
        Err(e) if job.attempt >= MAX_ATTEMPTS => {
            if let Err(store_err) = retain_failed(&client, &job).await {
                tracing::error!(job_id = %job.id, error = %store_err, "Failed to retain failed job");
            }
            tracing::warn!(
                job_id = %job.id,
                attempts = job.attempt,
                error = %e,
                "Job permanently failed; retained for inspection"
            );
        }
        Err(e) => {
            // Exponential backoff: base delay doubled per completed attempt.
            let delay = shared.options.retry_base_delay * 2u32.pow(job.attempt - 1);
            tracing::info!(
                job_id = %job.id,
                attempt = job.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "Job failed; scheduling retry"
            );
            // The failed record stays on the processing list through the
            // backoff window; a crash here leaves it where stall recovery
            // finds it, so the job is never held only in process memory.
            let retry = DurableJob {
                attempt: job.attempt + 1,
                ..job.clone()
            };
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let result = async {
                    let mut conn = client.get_multiplexed_async_connection().await?;
                    let settled = serde_json::to_string(&job)?;
                    let record = serde_json::to_string(&retry)?;
                    // One atomic swap: the retry lands on waiting in the
                    // same transaction that clears the settled attempt.
                    redis::pipe()
                        .atomic()
                        .lpush(WAITING_KEY, &record)
                        .lrem(PROCESSING_KEY, 1, &settled)
                        .query_async::<()>(&mut conn)
                        .await?;
                    Ok::<_, QueueError>(())
                }
                .await;
                if let Err(e) = result {
                    tracing::error!(job_id = %retry.id, error = %e, "Failed to re-enqueue retry");
                }
            });
        }
    }
}
