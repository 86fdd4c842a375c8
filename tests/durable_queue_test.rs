//! Durable queue backend tests. These need a reachable Redis instance and
//! share its key space, so they are ignored by default:
//!
//!   REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored --test-threads=1

mod common;

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::AsyncCommands;
use stickerforge::models::job::JobId;
use stickerforge::services::queue::durable::{DurableOptions, DurableQueue};
use stickerforge::services::queue::{JobContext, JobError, JobHandler};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn handler<F, Fut>(f: F) -> JobHandler
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Clear queue keys so earlier runs cannot bleed into this one.
async fn flush_keys() {
    let client = redis::Client::open(redis_url()).expect("invalid REDIS_URL");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("Redis not reachable");
    redis::cmd("DEL")
        .arg("stickerforge:jobs")
        .arg("stickerforge:processing")
        .arg("stickerforge:failed")
        .query_async::<i64>(&mut conn)
        .await
        .expect("failed to clear queue keys");
}

async fn list_len(key: &str) -> i64 {
    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    conn.llen(key).await.unwrap()
}

fn test_queue() -> DurableQueue {
    DurableQueue::new(
        &redis_url(),
        DurableOptions {
            priority: 1,
            retry_base_delay: Duration::from_millis(10),
        },
    )
    .unwrap()
}

async fn wait_until<F>(queue: &DurableQueue, pred: F)
where
    F: Fn(&stickerforge::models::job::QueueStats) -> bool,
{
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let stats = queue.stats().await.unwrap();
            if pred(&stats) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("queue did not reach expected state in time");
}

#[tokio::test]
#[ignore]
async fn enqueue_is_visible_in_stats() {
    flush_keys().await;
    let queue = test_queue();

    queue.health_check().await.unwrap();

    let id = queue
        .enqueue(common::payload(1, PathBuf::from("/tmp/none.png")))
        .await
        .unwrap();
    assert!(matches!(id, JobId::Key(_)));

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.waiting, 1);
    assert_eq!(stats.failed, 0);

    queue.close().await;
}

#[tokio::test]
#[ignore]
async fn retries_with_backoff_until_success() {
    flush_keys().await;
    let queue = test_queue();
    let attempts = Arc::new(AtomicU32::new(0));

    let attempts_h = attempts.clone();
    queue
        .register_handler(
            1,
            handler(move |ctx| {
                let attempts = attempts_h.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if ctx.attempt < 3 {
                        Err("flaky".into())
                    } else {
                        Ok(())
                    }
                }
            }),
        )
        .await;

    queue
        .enqueue(common::payload(2, PathBuf::from("/tmp/none.png")))
        .await
        .unwrap();

    wait_until(&queue, |s| s.completed == 1).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.waiting, 0);

    queue.close().await;
}

#[tokio::test]
#[ignore]
async fn backoff_window_keeps_the_job_in_the_store() {
    flush_keys().await;
    // Long enough backoff to observe the window between attempts.
    let queue = DurableQueue::new(
        &redis_url(),
        DurableOptions {
            priority: 1,
            retry_base_delay: Duration::from_millis(1500),
        },
    )
    .unwrap();
    let attempts = Arc::new(AtomicU32::new(0));

    let attempts_h = attempts.clone();
    queue
        .register_handler(
            1,
            handler(move |ctx| {
                let attempts = attempts_h.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if ctx.attempt == 1 {
                        Err("flaky".into())
                    } else {
                        Ok(())
                    }
                }
            }),
        )
        .await;

    queue
        .enqueue(common::payload(5, PathBuf::from("/tmp/none.png")))
        .await
        .unwrap();

    // Wait for the first attempt to settle into its backoff delay.
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let stats = queue.stats().await.unwrap();
            if attempts.load(Ordering::SeqCst) == 1 && stats.active == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("first attempt did not settle in time");

    // While the retry waits, the record must be visible to stall recovery:
    // a crash in this window cannot lose the job.
    assert_eq!(list_len("stickerforge:processing").await, 1);
    assert_eq!(list_len("stickerforge:jobs").await, 0);

    wait_until(&queue, |s| s.completed == 1).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(list_len("stickerforge:processing").await, 0);

    queue.close().await;
}

#[tokio::test]
#[ignore]
async fn exhausted_retries_are_retained_as_failed() {
    flush_keys().await;
    let queue = test_queue();
    let attempts = Arc::new(AtomicU32::new(0));

    let attempts_h = attempts.clone();
    queue
        .register_handler(
            1,
            handler(move |_ctx| {
                let attempts = attempts_h.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("permanently broken".into())
                }
            }),
        )
        .await;

    queue
        .enqueue(common::payload(3, PathBuf::from("/tmp/none.png")))
        .await
        .unwrap();

    wait_until(&queue, |s| s.failed == 1).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.waiting, 0);

    queue.close().await;
}

#[tokio::test]
#[ignore]
async fn close_refuses_new_jobs() {
    flush_keys().await;
    let queue = test_queue();
    queue.close().await;

    let result = queue
        .enqueue(common::payload(4, PathBuf::from("/tmp/none.png")))
        .await;
    assert!(result.is_err());
}
