//! Image composition: resize -> text-fit overlay -> lossy encode.
//!
//! Each stage writes a fresh temp file and the previous stage's output is
//! deleted as soon as it has been consumed. `process_stickers` is
//! all-or-nothing: on any stage failure every file the call produced is
//! removed before the error propagates.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tiny_skia::Pixmap;

use crate::config::TextAnchor;
use crate::models::sticker::{StickerArtifact, Variation};
use crate::services::render::{RenderError, TextRenderer, TextStyle};
use crate::services::text_fit::{fit_text, FitParams};

/// Composition settings, fixed for the lifetime of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sticker_size: u32,
    pub codec_quality: u8,
    pub text_padding: f32,
    pub font_ceiling: f32,
    pub font_floor: f32,
    pub font_step: f32,
    pub max_block_fraction: f32,
    pub text_anchor: TextAnchor,
    pub temp_dir: PathBuf,
}

/// Stateless per-call pipeline; safe to share across concurrent jobs. Each
/// invocation owns only the temp files it created.
pub struct CompositionPipeline {
    config: PipelineConfig,
    renderer: Arc<dyn TextRenderer>,
    style: TextStyle,
}

// Process-wide counter; combined with a stage tag it keeps temp names from
// colliding across concurrent jobs.
static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

impl CompositionPipeline {
    pub fn new(
        config: PipelineConfig,
        renderer: Arc<dyn TextRenderer>,
    ) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(&config.temp_dir)?;
        Ok(Self {
            config,
            renderer,
            style: TextStyle::default(),
        })
    }

    fn stage_path(&self, stage: &str, ext: &str) -> PathBuf {
        let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        self.config.temp_dir.join(format!("{stage}_{seq}.{ext}"))
    }

    fn fit_params(&self, canvas_size: u32) -> FitParams {
        FitParams {
            canvas_size,
            padding: self.config.text_padding,
            font_ceiling: self.config.font_ceiling,
            font_floor: self.config.font_floor,
            font_step: self.config.font_step,
            max_block_fraction: self.config.max_block_fraction,
        }
    }

    /// Produce an exactly S x S raster using crop-to-fill scaling: the
    /// shorter dimension is scaled to S and the overflow on the longer
    /// dimension is center-cropped.
    pub fn resize(&self, source: &Path) -> Result<PathBuf, PipelineError> {
        let size = self.config.sticker_size;
        let img = image::open(source)?;
        let resized = img.resize_to_fill(size, size, FilterType::Lanczos3);
        let out = self.stage_path("resized", "png");
        if let Err(e) = resized.save(&out) {
            remove_quiet(&out);
            return Err(e.into());
        }
        Ok(out)
    }

    /// Overlay fitted text onto the image. Lines are drawn top to bottom,
    /// stroke pass before fill pass, centered horizontally; the block is
    /// placed against the configured anchor with fixed edge padding.
    pub fn overlay(&self, source: &Path, text: &str) -> Result<PathBuf, PipelineError> {
        let img = image::open(source)?.to_rgba8();
        let (width, height) = img.dimensions();

        let mut pixmap = Pixmap::new(width, height).ok_or(PipelineError::Canvas(width))?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
        }

        let layout = fit_text(&*self.renderer, text, &self.fit_params(width));

        let canvas = height as f32;
        let block_top = match self.config.text_anchor {
            TextAnchor::Top => self.config.text_padding,
            TextAnchor::Center => (canvas - layout.block_height) / 2.0,
            TextAnchor::Bottom => canvas - self.config.text_padding - layout.block_height,
        };

        for (i, line) in layout.lines.iter().enumerate() {
            let line_top = block_top + i as f32 * layout.line_height;
            self.renderer.draw_line(
                &mut pixmap,
                line,
                layout.font_size,
                width as f32 / 2.0,
                line_top,
                &self.style,
            )?;
        }

        let mut composed = image::RgbaImage::new(width, height);
        for (dst, src) in composed.pixels_mut().zip(pixmap.pixels()) {
            let c = src.demultiply();
            dst.0 = [c.red(), c.green(), c.blue(), c.alpha()];
        }

        let out = self.stage_path("overlay", "png");
        if let Err(e) = composed.save(&out) {
            remove_quiet(&out);
            return Err(e.into());
        }
        Ok(out)
    }

    /// Re-encode with the fixed lossy codec at the configured quality.
    pub fn encode(&self, source: &Path) -> Result<PathBuf, PipelineError> {
        let img = image::open(source)?.to_rgb8();
        let out = self.stage_path("sticker", "jpg");
        let result = (|| -> Result<(), PipelineError> {
            let file = std::fs::File::create(&out)?;
            let mut writer = std::io::BufWriter::new(file);
            let encoder = JpegEncoder::new_with_quality(&mut writer, self.config.codec_quality);
            img.write_with_encoder(encoder)?;
            Ok(())
        })();
        if let Err(e) = result {
            remove_quiet(&out);
            return Err(e);
        }
        Ok(out)
    }

    /// Run resize -> overlay -> encode per variation, in input order. Either
    /// returns exactly `labels.len()` artifacts with no intermediates left
    /// behind, or fails having deleted every file this call produced.
    pub fn process_stickers(
        &self,
        variations: &[Variation],
        labels: &[String],
    ) -> Result<Vec<StickerArtifact>, PipelineError> {
        if variations.len() != labels.len() {
            return Err(PipelineError::LabelCount {
                variations: variations.len(),
                labels: labels.len(),
            });
        }

        tracing::info!(count = labels.len(), "Processing stickers");

        let mut artifacts: Vec<StickerArtifact> = Vec::with_capacity(labels.len());
        for (i, (variation, label)) in variations.iter().zip(labels).enumerate() {
            tracing::debug!(index = i, label = %label, "Composing sticker");
            match self.compose_one(&variation.path, label) {
                Ok(path) => artifacts.push(StickerArtifact {
                    path,
                    label: label.clone(),
                }),
                Err(e) => {
                    tracing::error!(index = i, error = %e, "Sticker composition failed");
                    for artifact in &artifacts {
                        remove_quiet(&artifact.path);
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(count = artifacts.len(), "Stickers processed");
        Ok(artifacts)
    }

    fn compose_one(&self, source: &Path, label: &str) -> Result<PathBuf, PipelineError> {
        let resized = self.resize(source)?;
        let overlaid = match self.overlay(&resized, label) {
            Ok(p) => {
                remove_quiet(&resized);
                p
            }
            Err(e) => {
                remove_quiet(&resized);
                return Err(e);
            }
        };
        match self.encode(&overlaid) {
            Ok(p) => {
                remove_quiet(&overlaid);
                Ok(p)
            }
            Err(e) => {
                remove_quiet(&overlaid);
                Err(e)
            }
        }
    }
}

/// Best-effort file removal; cleanup must never mask the original error.
pub fn remove_quiet(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image operation failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Text rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Cannot allocate {0}x{0} canvas")]
    Canvas(u32),

    #[error("Variation/label count mismatch: {variations} variations, {labels} labels")]
    LabelCount { variations: usize, labels: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_paths_are_unique_per_call() {
        let a = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let b = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        assert_ne!(a, b);
    }
}
