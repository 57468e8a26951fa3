//! Single-line text layout and rasterization.

use crate::error::DrawError;
use crate::font::{GlyphBitmap, LineMetrics, LoadedFont};
use crate::surface::new_pixmap;
use common::color::Color;
use common::geometry::Point;
use smallvec::SmallVec;
use std::sync::Arc;
use tiny_skia::{ColorU8, Pixmap};

/// A glyph placed on the pen line.
pub struct PositionedGlyph {
    /// Pen position of the glyph origin.
    pub x: f32,
    pub bitmap: Arc<GlyphBitmap>,
}

/// A laid-out line of glyphs.
pub struct TextLine {
    pub glyphs: Vec<PositionedGlyph>,
    /// Total advance width.
    pub width: f32,
    pub metrics: LineMetrics,
    /// Characters the font has no glyph for.
    pub missing: SmallVec<[char; 4]>,
}

impl TextLine {
    /// Lay out `text` in `font` at `size` pixels.
    pub fn layout(font: &LoadedFont, text: &str, size: f32) -> Self {
        let mut glyphs = Vec::with_capacity(text.len());
        let mut missing = SmallVec::new();
        let mut pen = 0.0;

        for c in text.chars() {
            if !font.has_glyph(c) && !missing.contains(&c) {
                missing.push(c);
            }
            let bitmap = font.rasterize(c, size);
            let advance = bitmap.metrics.advance_width;
            glyphs.push(PositionedGlyph { x: pen, bitmap });
            pen += advance;
        }

        Self {
            glyphs,
            width: pen,
            metrics: font.line_metrics(size),
            missing,
        }
    }

    pub fn height(&self) -> f32 {
        self.metrics.height()
    }
}

/// A line of text rendered into its own pixmap.
pub struct TextRaster {
    pub pixmap: Pixmap,
    /// Point in pixmap coordinates that sits on the layer's position: the
    /// horizontal center of the advance box and the vertical center of the
    /// line box.
    pub anchor: Point,
    pub missing: SmallVec<[char; 4]>,
}

/// Largest text pixmap, in pixels.
pub const MAX_TEXT_PIXELS: u64 = 1 << 26;

/// Rasterize `text` centered on its anchor. Returns `Ok(None)` for text that
/// covers no pixels.
pub fn rasterize_line(font: &LoadedFont, text: &str, size: f32, color: Color) -> Result<Option<TextRaster>, DrawError> {
    if text.is_empty() || size <= 0.0 || color.is_transparent() {
        return Ok(None);
    }

    // Room for antialiasing and glyphs that overhang their advance box.
    let pad = 1.0 + size * 0.25;
    check_budget(font, text, size, pad)?;

    let line = TextLine::layout(font, text, size);
    if line.width <= 0.0 {
        return Ok(None);
    }

    let width = (line.width + pad * 2.0).ceil() as u32;
    let height = (line.height() + pad * 2.0).ceil() as u32;
    let mut pixmap = new_pixmap(width, height)?;
    let baseline = pad + line.metrics.ascent;

    let stride = width as i64;
    let pixels = pixmap.pixels_mut();
    for glyph in &line.glyphs {
        let m = glyph.bitmap.metrics;
        let left = (pad + glyph.x).round() as i64 + m.xmin as i64;
        let top = baseline.round() as i64 - (m.height as i64 + m.ymin as i64);

        for gy in 0..m.height as i64 {
            let y = top + gy;
            if y < 0 || y >= height as i64 {
                continue;
            }
            for gx in 0..m.width as i64 {
                let x = left + gx;
                if x < 0 || x >= stride {
                    continue;
                }
                let coverage = glyph.bitmap.coverage[(gy * m.width as i64 + gx) as usize];
                if coverage == 0 {
                    continue;
                }
                let index = (y * stride + x) as usize;
                let tinted = tinted(color, coverage);
                // Overlapping glyphs keep the stronger coverage.
                if tinted.alpha() > pixels[index].alpha() {
                    pixels[index] = tinted;
                }
            }
        }
    }

    Ok(Some(TextRaster {
        pixmap,
        anchor: Point::new(pad + line.width / 2.0, pad + line.height() / 2.0),
        missing: line.missing,
    }))
}

/// Reject lines whose pixmap would exceed [`MAX_TEXT_PIXELS`], using metrics
/// only so no glyph gets rasterized.
fn check_budget(font: &LoadedFont, text: &str, size: f32, pad: f32) -> Result<(), DrawError> {
    let advance: f64 = text.chars().map(|c| font.advance(c, size) as f64).sum();
    let width = advance + pad as f64 * 2.0;
    let height = font.line_metrics(size).height() as f64 + pad as f64 * 2.0;
    // Written so that NaN fails too.
    if !(width * height <= MAX_TEXT_PIXELS as f64) {
        return Err(DrawError::allocation(saturate(width), saturate(height)));
    }
    Ok(())
}

fn saturate(value: f64) -> u32 {
    if value.is_nan() {
        u32::MAX
    } else {
        value.ceil().clamp(0.0, u32::MAX as f64) as u32
    }
}

fn tinted(color: Color, coverage: u8) -> tiny_skia::PremultipliedColorU8 {
    let alpha = ((color.a as u16 * coverage as u16 + 127) / 255) as u8;
    ColorU8::from_rgba(color.r, color.g, color.b, alpha).premultiply()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::test_font;

    #[test]
    fn test_empty_text_draws_nothing() {
        let Some(font) = test_font() else {
            return;
        };
        assert!(rasterize_line(&font, "", 20.0, Color::BLACK).unwrap().is_none());
        assert!(rasterize_line(&font, "Hi", 0.0, Color::BLACK).unwrap().is_none());
        assert!(rasterize_line(&font, "Hi", 20.0, Color::TRANSPARENT).unwrap().is_none());
    }

    #[test]
    fn test_layout_advances_pen() {
        let Some(font) = test_font() else {
            return;
        };
        let line = TextLine::layout(&font, "Hello", 40.0);
        assert_eq!(line.glyphs.len(), 5);
        assert!(line.glyphs.windows(2).all(|pair| pair[1].x > pair[0].x));
        assert!(line.width > 40.0);
        assert!(line.missing.is_empty());
    }

    #[test]
    fn test_ink_is_centered_on_anchor() {
        let Some(font) = test_font() else {
            return;
        };
        let raster = rasterize_line(&font, "HOH", 60.0, Color::BLACK).unwrap().unwrap();

        let (mut min_x, mut max_x) = (u32::MAX, 0);
        let width = raster.pixmap.width();
        for (i, px) in raster.pixmap.pixels().iter().enumerate() {
            if px.alpha() > 128 {
                let x = i as u32 % width;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
        let ink_center = (min_x + max_x) as f32 / 2.0;
        assert!((ink_center - raster.anchor.x).abs() < 6.0);
    }

    #[test]
    fn test_huge_font_size_is_a_draw_error() {
        let Some(font) = test_font() else {
            return;
        };
        match rasterize_line(&font, "W", 200_000.0, Color::BLACK) {
            Err(DrawError::SurfaceAllocation { width, height }) => {
                assert!(width as u64 * height as u64 > MAX_TEXT_PIXELS);
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("oversized text must not rasterize"),
        }
        assert_eq!(font.cached_glyphs(), 0);
        assert!(rasterize_line(&font, "W", 100.0, Color::BLACK).unwrap().is_some());
    }

    #[test]
    fn test_missing_glyphs_are_listed_once() {
        let Some(font) = test_font() else {
            return;
        };
        let line = TextLine::layout(&font, "a\u{10FFFD}\u{10FFFD}", 20.0);
        assert_eq!(line.missing.as_slice(), &['\u{10FFFD}']);
    }
}
