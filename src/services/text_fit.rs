//! Font-fit and line-wrapping for the overlay stage.
//!
//! Deterministic and pure: identical inputs always produce the identical
//! layout. Width measurement goes through [`TextMeasure`] so the algorithm
//! stays independent of any particular font backend.

/// Measures the rendered width of a single line at a given font size.
pub trait TextMeasure: Send + Sync {
    fn line_width(&self, text: &str, font_size: f32) -> f32;
}

/// Constraints for fitting a text block onto a square canvas.
#[derive(Debug, Clone)]
pub struct FitParams {
    /// Canvas side length S.
    pub canvas_size: u32,
    /// Horizontal padding on each side; usable width is S - 2p.
    pub padding: f32,
    /// Largest font size tried.
    pub font_ceiling: f32,
    /// Smallest font size tried; also the best-effort fallback size.
    pub font_floor: f32,
    /// Decrement between tried sizes.
    pub font_step: f32,
    /// The block may occupy at most this fraction of the canvas height.
    pub max_block_fraction: f32,
}

/// A fitted layout: the chosen font size and the wrapped lines, top to
/// bottom. Computed fresh per overlay call, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub font_size: f32,
    pub lines: Vec<String>,
    pub line_height: f32,
    pub block_height: f32,
}

const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Select the largest font size in `[font_floor, font_ceiling]` whose
/// greedily wrapped block fits within `max_block_fraction` of the canvas
/// height. If no size fits, the wrapping at `font_floor` is returned anyway:
/// overflow is best-effort, never an error.
pub fn fit_text(measure: &dyn TextMeasure, text: &str, params: &FitParams) -> TextLayout {
    let max_width = params.canvas_size as f32 - 2.0 * params.padding;
    let max_block = params.max_block_fraction * params.canvas_size as f32;

    let mut size = params.font_ceiling;
    while size >= params.font_floor - f32::EPSILON {
        let lines = wrap_words(measure, text, size, max_width);
        let line_height = size * LINE_HEIGHT_FACTOR;
        let block_height = lines.len() as f32 * line_height;
        if block_height <= max_block {
            return TextLayout {
                font_size: size,
                lines,
                line_height,
                block_height,
            };
        }
        size -= params.font_step;
    }

    // Nothing in range fits; fall back to the floor size.
    let lines = wrap_words(measure, text, params.font_floor, max_width);
    let line_height = params.font_floor * LINE_HEIGHT_FACTOR;
    let block_height = lines.len() as f32 * line_height;
    TextLayout {
        font_size: params.font_floor,
        lines,
        line_height,
        block_height,
    }
}

/// Greedy word wrap: a line starts with its first word unconditionally; each
/// following word joins the line while the measured candidate stays below
/// `max_width`.
fn wrap_words(measure: &dyn TextMeasure, text: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure.line_width(&candidate, font_size) < max_width {
            current = candidate;
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-advance measurer: every character is half the font size wide.
    struct FixedMeasure;

    impl TextMeasure for FixedMeasure {
        fn line_width(&self, text: &str, font_size: f32) -> f32 {
            text.chars().count() as f32 * font_size * 0.5
        }
    }

    fn params() -> FitParams {
        FitParams {
            canvas_size: 512,
            padding: 20.0,
            font_ceiling: 48.0,
            font_floor: 24.0,
            font_step: 4.0,
            max_block_fraction: 0.5,
        }
    }

    #[test]
    fn short_greeting_fits_on_one_line_at_ceiling() {
        // 16 chars at size 48 measure 384 < 472, so a single line, and the
        // block height 57.6 is well under half the canvas.
        let layout = fit_text(&FixedMeasure, "Assalomu alaykum", &params());
        assert_eq!(layout.font_size, 48.0);
        assert_eq!(layout.lines, vec!["Assalomu alaykum".to_string()]);
        assert!((layout.line_height - 57.6).abs() < 1e-3);
        assert!((layout.block_height - 57.6).abs() < 1e-3);
    }

    #[test]
    fn layout_is_deterministic() {
        let text = "Uylayapmanda kemay qolyaptida deb o'ylagan edim";
        let a = fit_text(&FixedMeasure, text, &params());
        let b = fit_text(&FixedMeasure, text, &params());
        assert_eq!(a, b);
    }

    #[test]
    fn font_size_stays_within_bounds() {
        let long = "so'z ".repeat(120);
        let layout = fit_text(&FixedMeasure, &long, &params());
        assert!(layout.font_size >= 24.0);
        assert!(layout.font_size <= 48.0);
    }

    #[test]
    fn overflowing_text_falls_back_to_floor() {
        // Enough words that even at the floor the block exceeds half the
        // canvas; the fitter must still return a layout rather than fail.
        let long = "juda uzun matn bu yerda turadi ".repeat(30);
        let layout = fit_text(&FixedMeasure, &long, &params());
        assert_eq!(layout.font_size, 24.0);
        assert!(layout.block_height > 256.0);
    }

    #[test]
    fn shrinks_only_as_far_as_needed() {
        // Pick a text that wraps to too many lines at 48 but fits at the
        // next size down, and verify the fitter stops there.
        let text = "bir ikki uch turt besh olti yetti sakkiz toqqiz on";
        let mut p = params();
        p.max_block_fraction = 0.25; // 128 px budget
        let layout = fit_text(&FixedMeasure, text, &p);
        // Every size above the accepted one must overflow the budget.
        let mut size = p.font_ceiling;
        while size > layout.font_size + f32::EPSILON {
            let probe = fit_text(
                &FixedMeasure,
                text,
                &FitParams {
                    font_floor: size,
                    font_ceiling: size,
                    ..p.clone()
                },
            );
            assert!(probe.block_height > 0.25 * 512.0);
            size -= p.font_step;
        }
        assert!(layout.block_height <= 0.25 * 512.0 || layout.font_size == p.font_floor);
    }

    #[test]
    fn first_word_opens_each_line() {
        // A single word wider than the canvas still occupies its own line.
        let wide = "juda_uzun_bitta_sozdan_iborat_matn_bu";
        let layout = fit_text(&FixedMeasure, wide, &params());
        assert_eq!(layout.lines.len(), 1);
    }

    #[test]
    fn empty_text_yields_empty_block() {
        let layout = fit_text(&FixedMeasure, "", &params());
        assert!(layout.lines.is_empty());
        assert_eq!(layout.block_height, 0.0);
        assert_eq!(layout.font_size, 48.0);
    }
}
