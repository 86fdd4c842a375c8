//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use stickerforge::models::job::JobPayload;
use stickerforge::services::render::{RenderError, TextRenderer, TextStyle};
use stickerforge::services::text_fit::TextMeasure;
use tiny_skia::Pixmap;

/// Deterministic fixed-advance renderer that draws nothing, so pipeline and
/// orchestrator tests run without any font installed.
pub struct FakeRenderer;

impl TextMeasure for FakeRenderer {
    fn line_width(&self, text: &str, font_size: f32) -> f32 {
        text.chars().count() as f32 * font_size * 0.5
    }
}

impl TextRenderer for FakeRenderer {
    fn draw_line(
        &self,
        _pixmap: &mut Pixmap,
        _text: &str,
        _font_size: f32,
        _center_x: f32,
        _line_top: f32,
        _style: &TextStyle,
    ) -> Result<(), RenderError> {
        Ok(())
    }
}

pub fn payload(owner_id: i64, source_path: PathBuf) -> JobPayload {
    JobPayload {
        owner_id,
        display_name: format!("user{owner_id}"),
        channel_id: owner_id,
        source_url: String::new(),
        source_path,
    }
}

/// Write a solid-color PNG of the given dimensions.
pub fn write_png(path: &Path, width: u32, height: u32) {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([120, 80, 200, 255]));
    img.save(path).expect("failed to write test image");
}
