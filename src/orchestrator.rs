//! Wires one job to the full run: fan out labeled variations, compose
//! stickers, publish the set, report progress, and clean up on every exit
//! path. Stage outcomes are plain `Result` values inspected here; cleanup
//! never depends on unwinding.

use std::path::PathBuf;
use std::sync::Arc;

use crate::models::sticker::StickerArtifact;
use crate::services::generator::{GeneratorError, VariationGenerator};
use crate::services::pipeline::{remove_quiet, CompositionPipeline, PipelineError};
use crate::services::publisher::{tag_for_index, PublishError, SetItem, StickerPublisher};
use crate::services::queue::{JobContext, JobError, JobHandler};

pub struct Orchestrator {
    generator: Arc<dyn VariationGenerator>,
    pipeline: Arc<CompositionPipeline>,
    publisher: Arc<dyn StickerPublisher>,
    labels: Vec<String>,
}

/// User-facing category of a terminal failure, derived from the error's
/// textual content: the distribution service only exposes text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Forbidden,
    InvalidName,
    Other,
}

/// Case-sensitive token inspection; the service's error strings are stable
/// enough that these exact substrings are the only contract available.
pub fn classify_failure(message: &str) -> FailureKind {
    if message.contains("Forbidden") {
        FailureKind::Forbidden
    } else if message.contains("STICKERSET_INVALID") {
        FailureKind::InvalidName
    } else {
        FailureKind::Other
    }
}

fn failure_message(kind: FailureKind) -> String {
    let base = "❌ Kechirasiz, stikerlar to'plamini yaratishda xatolik yuz berdi.";
    let hint = match kind {
        FailureKind::Forbidden => "Bot bloklangan yoki ruxsat yo'q.",
        FailureKind::InvalidName => "Noto'g'ri nom.",
        FailureKind::Other => "Iltimos, keyinroq qayta urinib ko'ring.",
    };
    format!("{base}\n\n{hint}")
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn VariationGenerator>,
        pipeline: Arc<CompositionPipeline>,
        publisher: Arc<dyn StickerPublisher>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            generator,
            pipeline,
            publisher,
            labels,
        }
    }

    /// Adapt this orchestrator into the queue's handler shape.
    pub fn into_handler(self: Arc<Self>) -> JobHandler {
        Arc::new(move |ctx| {
            let this = Arc::clone(&self);
            Box::pin(async move { this.run(ctx).await })
        })
    }

    /// Execute one job. The source file and every artifact recorded during
    /// the run are deleted before this returns, success or failure.
    pub async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        let mut scratch: Vec<PathBuf> = vec![ctx.payload.source_path.clone()];
        let outcome = self.drive(&ctx, &mut scratch).await;
        for path in &scratch {
            remove_quiet(path);
        }

        match outcome {
            Ok(set_ref) => {
                metrics::counter!("sticker_jobs_completed").increment(1);
                let text = format!(
                    "✅ Sizning stikerlar to'plamingiz tayyor!\n\n{set_ref}\n\nShaxsiy stikerlaringizdan zavqlaning! 🎉"
                );
                self.notify_best_effort(&ctx, &text).await;
                Ok(())
            }
            Err(e) => {
                let kind = classify_failure(&e.to_string());
                let terminal = ctx.attempt >= ctx.max_attempts;
                tracing::error!(
                    job_id = %ctx.id,
                    owner_id = ctx.payload.owner_id,
                    attempt = ctx.attempt,
                    kind = ?kind,
                    terminal,
                    error = %e,
                    "Sticker job attempt failed"
                );
                // Exactly one categorized notification per terminal failure;
                // attempts the backend will retry stay silent.
                if terminal {
                    metrics::counter!("sticker_jobs_failed").increment(1);
                    self.notify_best_effort(&ctx, &failure_message(kind)).await;
                }
                Err(Box::new(e) as JobError)
            }
        }
    }

    async fn drive(
        &self,
        ctx: &JobContext,
        scratch: &mut Vec<PathBuf>,
    ) -> Result<String, OrchestratorError> {
        let payload = &ctx.payload;

        if !payload.source_path.is_file() {
            return Err(OrchestratorError::Validation(format!(
                "source image not found at {}",
                payload.source_path.display()
            )));
        }

        ctx.progress.set(10);
        self.notify_best_effort(ctx, "🎨 Rasmlar tayyorlanmoqda... (1/3)")
            .await;

        let variations = self
            .generator
            .generate(&payload.source_path, self.labels.len())
            .await?;
        scratch.extend(variations.iter().map(|v| v.path.clone()));

        ctx.progress.set(50);
        self.notify_best_effort(ctx, "✍️ Matnlar yozilmoqda... (2/3)")
            .await;

        let artifacts = self.pipeline.process_stickers(&variations, &self.labels)?;
        scratch.extend(artifacts.iter().map(|a| a.path.clone()));

        ctx.progress.set(80);
        self.notify_best_effort(ctx, "📦 Stikerlar to'plami yaratilmoqda... (3/3)")
            .await;

        let set_ref = self.publish(ctx, &artifacts).await?;
        ctx.progress.set(100);
        Ok(set_ref)
    }

    /// Upload every artifact, then create the set in one call. Any failure
    /// aborts the whole batch; no partial set is ever created.
    async fn publish(
        &self,
        ctx: &JobContext,
        artifacts: &[StickerArtifact],
    ) -> Result<String, OrchestratorError> {
        let owner_id = ctx.payload.owner_id;
        let mut items: Vec<SetItem> = Vec::with_capacity(artifacts.len());
        for (i, artifact) in artifacts.iter().enumerate() {
            let artifact_ref = self
                .publisher
                .upload_artifact(owner_id, &artifact.path)
                .await?;
            items.push(SetItem {
                artifact_ref,
                tag: tag_for_index(i).to_string(),
            });
        }

        let set_name = self.publisher.new_set_name(owner_id);
        let title = format!("AI Stickers by @{}", ctx.payload.display_name);
        let set_ref = self
            .publisher
            .create_artifact_set(owner_id, &set_name, &title, &items)
            .await?;
        Ok(set_ref)
    }

    /// Progress and result notifications must never decide a job's fate.
    async fn notify_best_effort(&self, ctx: &JobContext, text: &str) {
        if let Err(e) = self.publisher.notify(ctx.payload.channel_id, text).await {
            tracing::warn!(
                job_id = %ctx.id,
                channel_id = ctx.payload.channel_id,
                error = %e,
                "Notification failed"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Source image unavailable: {0}")]
    Validation(String),

    #[error("Variation generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Sticker composition failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Publish(#[from] PublishError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_forbidden_by_exact_token() {
        let kind = classify_failure("Forbidden: bot was blocked by the user");
        assert_eq!(kind, FailureKind::Forbidden);
        // Case-sensitive: a lowercase token is not the service's error.
        assert_eq!(classify_failure("forbidden"), FailureKind::Other);
    }

    #[test]
    fn classifies_invalid_set_name() {
        let kind = classify_failure("Bad Request: STICKERSET_INVALID");
        assert_eq!(kind, FailureKind::InvalidName);
    }

    #[test]
    fn everything_else_is_other() {
        assert_eq!(
            classify_failure("connection reset by peer"),
            FailureKind::Other
        );
    }
}
