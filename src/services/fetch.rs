//! Source acquisition: resolves a remote image locator to a local file.
//! Failures here are I/O-level, never pipeline errors.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;

static FETCH_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct SourceFetcher {
    http: Client,
    temp_dir: PathBuf,
}

impl SourceFetcher {
    pub fn new(temp_dir: PathBuf) -> Result<Self, FetchError> {
        std::fs::create_dir_all(&temp_dir)?;
        Ok(Self {
            http: Client::new(),
            temp_dir,
        })
    }

    /// Download the locator's content into the temp directory and return
    /// the local path.
    pub async fn fetch(&self, url: &str, owner_id: i64) -> Result<PathBuf, FetchError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        let seq = FETCH_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = self.temp_dir.join(format!("input_{owner_id}_{seq}.jpg"));
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Downloaded source image");
        Ok(path)
    }

    /// Persist an already-received image body (e.g. an HTTP upload).
    pub async fn store(&self, bytes: &[u8], owner_id: i64) -> Result<PathBuf, FetchError> {
        let seq = FETCH_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = self.temp_dir.join(format!("input_{owner_id}_{seq}.jpg"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
