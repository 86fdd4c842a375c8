//! In-process queue backend: a FIFO waiting list and a bounded active set,
//! all state in local memory. Not safe across process instances. A failed
//! attempt is terminal and the job is discarded; there is no failed-job
//! registry here, unlike the durable backend.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::job::{JobId, JobPayload, JobProgress, QueueStats};
use crate::services::queue::{JobContext, JobHandler, QueueError};

struct Waiting {
    id: u64,
    payload: JobPayload,
}

struct State {
    waiting: VecDeque<Waiting>,
    active: usize,
    concurrency: usize,
    handler: Option<JobHandler>,
    next_id: u64,
    completed: u64,
    failed: u64,
    closed: bool,
}

pub struct MemoryQueue {
    inner: Arc<Mutex<State>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                waiting: VecDeque::new(),
                active: 0,
                concurrency: 1,
                handler: None,
                next_id: 1,
                completed: 0,
                failed: 0,
                closed: false,
            })),
        }
    }

    pub async fn enqueue(&self, payload: JobPayload) -> Result<JobId, QueueError> {
        let id = {
            let mut state = self.inner.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }
            let id = state.next_id;
            state.next_id += 1;
            state.waiting.push_back(Waiting { id, payload });
            id
        };
        tracing::info!(job_id = id, "Job enqueued");
        dispatch(self.inner.clone());
        Ok(JobId::Seq(id))
    }

    pub async fn register_handler(&self, concurrency: usize, handler: JobHandler) {
        {
            let mut state = self.inner.lock().await;
            if state.handler.is_some() {
                tracing::warn!("Queue handler re-registered; last write wins");
            }
            state.handler = Some(handler);
            state.concurrency = concurrency;
        }
        tracing::info!(concurrency, "Queue processor registered");
        dispatch(self.inner.clone());
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.inner.lock().await;
        QueueStats {
            waiting: state.waiting.len(),
            active: state.active,
            completed: state.completed,
            failed: state.failed,
        }
    }

    pub async fn close(&self) {
        let mut state = self.inner.lock().await;
        state.closed = true;
        tracing::info!(
            waiting = state.waiting.len(),
            active = state.active,
            "In-process queue closed"
        );
    }
}

/// Kick the dispatch loop. Every slot-freeing or enqueue event funnels here;
/// admission decisions all happen under the single state lock, so no two
/// decisions ever race on the slot count.
fn dispatch(inner: Arc<Mutex<State>>) {
    tokio::spawn(run_dispatch(inner));
}

async fn run_dispatch(inner: Arc<Mutex<State>>) {
    loop {
        let (job, handler) = {
            let mut state = inner.lock().await;
            if state.closed || state.active >= state.concurrency {
                return;
            }
            let Some(handler) = state.handler.clone() else {
                return;
            };
            let Some(job) = state.waiting.pop_front() else {
                return;
            };
            state.active += 1;
            (job, handler)
        };

        let inner_for_job = inner.clone();
        tokio::spawn(async move {
            let job_id = job.id;
            tracing::info!(job_id, owner_id = job.payload.owner_id, "Processing job");
            let ctx = JobContext {
                id: JobId::Seq(job_id),
                attempt: 1,
                max_attempts: 1,
                payload: job.payload,
                progress: JobProgress::new(),
            };
            let result = handler(ctx).await;
            {
                let mut state = inner_for_job.lock().await;
                state.active -= 1;
                match &result {
                    Ok(()) => state.completed += 1,
                    Err(_) => state.failed += 1,
                }
            }
            match result {
                Ok(()) => tracing::info!(job_id, "Job completed"),
                // Terminal: no retry and no retained record on this backend.
                Err(e) => tracing::error!(job_id, error = %e, "Job failed"),
            }
            dispatch(inner_for_job);
        });
    }
}
