use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to produce one labeled sticker set from a source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    /// Owner of the resulting artifact set at the distribution service.
    pub owner_id: i64,
    /// Display name woven into the set title.
    pub display_name: String,
    /// Channel that receives progress and result notifications.
    pub channel_id: i64,
    /// Remote locator the source was acquired from.
    pub source_url: String,
    /// Local path of the downloaded source image.
    pub source_path: PathBuf,
}

/// Queue-assigned job identity. The in-process backend numbers jobs
/// sequentially; the durable backend assigns store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobId {
    Seq(u64),
    Key(Uuid),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Seq(n) => write!(f, "{n}"),
            JobId::Key(id) => write!(f, "{id}"),
        }
    }
}

/// Lifecycle state of a job. `Active -> Queued` happens only through the
/// durable backend's stall recovery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

/// Point-in-time queue statistics, recomputed on demand.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Monotonic 0-100 progress indicator shared between a running handler and
/// anything observing the job.
#[derive(Debug, Clone, Default)]
pub struct JobProgress(Arc<AtomicU8>);

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance progress. Values below the current reading are ignored so the
    /// reported figure never moves backwards; values above 100 are clamped.
    pub fn set(&self, percent: u8) {
        self.0.fetch_max(percent.min(100), Ordering::Relaxed);
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic() {
        let progress = JobProgress::new();
        progress.set(50);
        progress.set(10);
        assert_eq!(progress.get(), 50);
        progress.set(80);
        assert_eq!(progress.get(), 80);
    }

    #[test]
    fn progress_clamps_at_100() {
        let progress = JobProgress::new();
        progress.set(200);
        assert_eq!(progress.get(), 100);
    }
}
