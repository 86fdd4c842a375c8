//! Glyph rasterization for the overlay stage.
//!
//! Builds tiny-skia paths from ttf-parser glyph outlines and draws each text
//! line in two passes: a stroked outline first, then the fill, so the text
//! stays legible against any background.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiny_skia::{Color, FillRule, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::services::text_fit::TextMeasure;

/// Fill/stroke styling for overlay text.
#[derive(Debug, Clone)]
pub struct TextStyle {
    pub fill: Color,
    pub stroke: Color,
    pub stroke_width: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            fill: Color::from_rgba8(255, 255, 255, 255),
            stroke: Color::from_rgba8(0, 0, 0, 255),
            stroke_width: 4.0,
        }
    }
}

/// Measures and draws single lines of text. The pipeline depends on this
/// trait so tests can substitute a fake that draws nothing.
pub trait TextRenderer: TextMeasure {
    /// Draw one line, horizontally centered on `center_x`, with the line box
    /// starting at `line_top`. Stroke pass precedes fill pass.
    fn draw_line(
        &self,
        pixmap: &mut Pixmap,
        text: &str,
        font_size: f32,
        center_x: f32,
        line_top: f32,
        style: &TextStyle,
    ) -> Result<(), RenderError>;
}

/// Renderer backed by a single TTF font file held in memory.
pub struct FontRenderer {
    data: Arc<Vec<u8>>,
}

impl FontRenderer {
    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        let data = std::fs::read(path)?;
        // Parse once up front so a bad font fails at construction.
        Face::parse(&data, 0).map_err(|e| RenderError::Font(e.to_string()))?;
        Ok(Self {
            data: Arc::new(data),
        })
    }

    /// Look for a widely installed sans-serif font.
    pub fn locate_system_font() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "C:\\Windows\\Fonts\\arialbd.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];
        CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
    }

    fn face(&self) -> Result<Face<'_>, RenderError> {
        Face::parse(&self.data, 0).map_err(|e| RenderError::Font(e.to_string()))
    }
}

fn glyph_advance(face: &Face<'_>, c: char) -> f32 {
    let glyph = face.glyph_index(c).unwrap_or(GlyphId(0));
    face.glyph_hor_advance(glyph).unwrap_or(0) as f32
}

impl TextMeasure for FontRenderer {
    fn line_width(&self, text: &str, font_size: f32) -> f32 {
        let Ok(face) = self.face() else { return 0.0 };
        let scale = font_size / face.units_per_em() as f32;
        text.chars().map(|c| glyph_advance(&face, c)).sum::<f32>() * scale
    }
}

impl TextRenderer for FontRenderer {
    fn draw_line(
        &self,
        pixmap: &mut Pixmap,
        text: &str,
        font_size: f32,
        center_x: f32,
        line_top: f32,
        style: &TextStyle,
    ) -> Result<(), RenderError> {
        let face = self.face()?;
        let scale = font_size / face.units_per_em() as f32;
        let baseline_y = line_top + face.ascender() as f32 * scale;
        let line_width = self.line_width(text, font_size);

        let mut builder = PathBuilder::new();
        let mut cursor_x = center_x - line_width / 2.0;
        for c in text.chars() {
            let glyph = face.glyph_index(c).unwrap_or(GlyphId(0));
            let mut outline = GlyphOutline {
                builder: &mut builder,
                origin_x: cursor_x,
                origin_y: baseline_y,
                scale,
            };
            face.outline_glyph(glyph, &mut outline);
            cursor_x += face.glyph_hor_advance(glyph).unwrap_or(0) as f32 * scale;
        }

        let Some(path) = builder.finish() else {
            // Whitespace-only line: nothing to draw.
            return Ok(());
        };

        let mut paint = Paint::default();
        paint.anti_alias = true;

        paint.set_color(style.stroke);
        let stroke = Stroke {
            width: style.stroke_width,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);

        paint.set_color(style.fill);
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

        Ok(())
    }
}

/// Appends one glyph's outline to a shared path builder, translating from
/// font units (y-up) into pixel space (y-down).
struct GlyphOutline<'a> {
    builder: &'a mut PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl OutlineBuilder for GlyphOutline<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y - y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to read font file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse font: {0}")]
    Font(String),

    #[error("No usable font found; set FONT_PATH to a TTF file")]
    NoFont,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_renderer() -> Option<FontRenderer> {
        let path = FontRenderer::locate_system_font()?;
        FontRenderer::from_path(&path).ok()
    }

    #[test]
    fn measured_width_grows_with_font_size() {
        let Some(renderer) = system_renderer() else {
            return;
        };
        let narrow = renderer.line_width("Rahmat", 24.0);
        let wide = renderer.line_width("Rahmat", 48.0);
        assert!(narrow > 0.0);
        assert!(wide > narrow);
    }

    #[test]
    fn drawing_touches_pixels() {
        let Some(renderer) = system_renderer() else {
            return;
        };
        let mut pixmap = Pixmap::new(512, 512).unwrap();
        renderer
            .draw_line(&mut pixmap, "Xayr", 48.0, 256.0, 400.0, &TextStyle::default())
            .unwrap();
        let touched = pixmap.pixels().iter().any(|p| p.alpha() != 0);
        assert!(touched);
    }
}
