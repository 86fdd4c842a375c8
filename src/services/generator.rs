//! Variation generation: one intermediate copy of the source per label.
//!
//! The deployed mode bypasses AI generation entirely; each variation is a
//! byte-identical copy of the source and only the overlaid text differs.
//! The trait seam exists so a true generative backend can be substituted
//! without touching the pipeline or orchestrator.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::sticker::Variation;
use crate::services::pipeline::remove_quiet;

pub type GeneratorFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Variation>, GeneratorError>> + Send + 'a>>;

/// Produces `count` variations of a source image.
pub trait VariationGenerator: Send + Sync {
    fn generate<'a>(&'a self, source: &'a Path, count: usize) -> GeneratorFuture<'a>;
}

static COPY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Copy-only generator for text-overlay mode.
pub struct CopyGenerator {
    temp_dir: PathBuf,
}

impl CopyGenerator {
    pub fn new(temp_dir: PathBuf) -> Result<Self, GeneratorError> {
        std::fs::create_dir_all(&temp_dir)?;
        Ok(Self { temp_dir })
    }
}

impl VariationGenerator for CopyGenerator {
    fn generate<'a>(&'a self, source: &'a Path, count: usize) -> GeneratorFuture<'a> {
        Box::pin(async move {
            tracing::info!(count, "Preparing image copies for text overlay");
            let run = COPY_SEQ.fetch_add(1, Ordering::Relaxed);
            let mut variations: Vec<Variation> = Vec::with_capacity(count);
            for i in 0..count {
                let out = self.temp_dir.join(format!("variation_{run}_{i}.png"));
                if let Err(e) = tokio::fs::copy(source, &out).await {
                    for v in &variations {
                        remove_quiet(&v.path);
                    }
                    return Err(GeneratorError::Io(e));
                }
                variations.push(Variation { path: out });
            }
            Ok(variations)
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Failed to produce variation: {0}")]
    Io(#[from] std::io::Error),
}
