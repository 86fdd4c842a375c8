use std::sync::Arc;

use crate::services::fetch::SourceFetcher;
use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub fetcher: Arc<SourceFetcher>,
}

impl AppState {
    pub fn new(queue: Arc<JobQueue>, fetcher: Arc<SourceFetcher>) -> Self {
        Self { queue, fetcher }
    }
}
