//! Job dispatch layer: one queue interface, two interchangeable backends.
//!
//! The backend is chosen once at construction: a Redis connection string
//! selects the durable backend (at-least-once delivery, retries, retained
//! failures); its absence selects the in-process backend (single instance,
//! best effort, no retries).

pub mod durable;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::job::{JobId, JobPayload, JobProgress, QueueStats};

use durable::{DurableOptions, DurableQueue};
use memory::MemoryQueue;

/// Error type a handler may settle with. The queue only needs success or
/// failure plus a printable message; classification happens upstream.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

/// Installed job processor. Must tolerate re-invocation with the same
/// payload: the durable backend delivers at least once.
pub type JobHandler = Arc<dyn Fn(JobContext) -> HandlerFuture + Send + Sync>;

/// Everything one handler invocation receives.
#[derive(Clone)]
pub struct JobContext {
    pub id: JobId,
    /// 1-based attempt number; always 1 on the in-process backend.
    pub attempt: u32,
    /// This backend's attempt ceiling; `attempt >= max_attempts` means a
    /// failure of this invocation is terminal, not retried.
    pub max_attempts: u32,
    pub payload: JobPayload,
    pub progress: JobProgress,
}

/// Queue abstraction over the two backends. Tagged variant rather than a
/// trait object: the choice is made once and callers never downcast.
pub enum JobQueue {
    Memory(MemoryQueue),
    Durable(DurableQueue),
}

impl JobQueue {
    /// Select and construct a backend from configuration.
    pub fn connect(config: &AppConfig) -> Result<Self, QueueError> {
        match &config.redis_url {
            Some(url) => {
                tracing::info!("Queue backend: durable (Redis)");
                let queue = DurableQueue::new(
                    url,
                    DurableOptions {
                        priority: config.queue_priority,
                        retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
                    },
                )?;
                Ok(JobQueue::Durable(queue))
            }
            None => {
                tracing::info!("Queue backend: in-process (Redis not configured)");
                Ok(JobQueue::Memory(MemoryQueue::new()))
            }
        }
    }

    /// Accept a job. Returns as soon as the job is queued; never waits for
    /// execution. Fails only when the queue is closed or the durable store
    /// is unreachable.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<JobId, QueueError> {
        match self {
            JobQueue::Memory(q) => q.enqueue(payload).await,
            JobQueue::Durable(q) => q.enqueue(payload).await,
        }
    }

    /// Install the handler and concurrency bound. Calling this again
    /// re-binds the active handler (last write wins).
    pub async fn register_handler(&self, concurrency: usize, handler: JobHandler) {
        match self {
            JobQueue::Memory(q) => q.register_handler(concurrency, handler).await,
            JobQueue::Durable(q) => q.register_handler(concurrency, handler).await,
        }
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        match self {
            JobQueue::Memory(q) => Ok(q.stats().await),
            JobQueue::Durable(q) => q.stats().await,
        }
    }

    /// Stop admitting jobs and tear down the backend. Best-effort drain:
    /// jobs already running are not interrupted and not waited for.
    pub async fn close(&self) {
        match self {
            JobQueue::Memory(q) => q.close().await,
            JobQueue::Durable(q) => q.close().await,
        }
    }

    /// Backend connectivity probe for health checks.
    pub async fn health_check(&self) -> Result<(), QueueError> {
        match self {
            JobQueue::Memory(_) => Ok(()),
            JobQueue::Durable(q) => q.health_check().await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue is closed")]
    Closed,
}
