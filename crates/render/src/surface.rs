//! Pixel surface that layers are drawn into.

use crate::error::DrawError;
use crate::raster::RasterImage;
use common::color::Color;
use common::geometry::{Size, Transform};
use tiny_skia::{
    FillRule, FilterQuality, LineCap, LineJoin, Paint, Path, Pixmap, PixmapPaint, PixmapRef, Rect,
    Stroke,
};

/// Convert an engine transform to a tiny-skia transform.
pub fn to_skia(ts: &Transform) -> tiny_skia::Transform {
    tiny_skia::Transform::from_row(ts.m11, ts.m12, ts.m21, ts.m22, ts.m31, ts.m32)
}

/// Solid paint for `color`, anti-aliased.
pub fn solid_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

/// Allocate a transparent pixmap, failing with a draw error when the size is
/// zero or too large.
pub fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, DrawError> {
    Pixmap::new(width, height).ok_or_else(|| DrawError::allocation(width, height))
}

/// An RGBA surface with premultiplied alpha.
pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self, DrawError> {
        Ok(Self {
            pixmap: new_pixmap(width, height)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width() as f32, self.height() as f32)
    }

    /// Reallocate to a new size; contents are cleared either way.
    pub fn resize_to(&mut self, width: u32, height: u32) -> Result<(), DrawError> {
        if width == self.width() && height == self.height() {
            self.clear();
        } else {
            self.pixmap = new_pixmap(width, height)?;
        }
        Ok(())
    }

    /// Clear to transparent.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// Fill with a color, blending over the current contents.
    pub fn fill(&mut self, color: Color) {
        if let Some(rect) = Rect::from_xywh(0.0, 0.0, self.width() as f32, self.height() as f32) {
            self.pixmap
                .fill_rect(rect, &solid_paint(color), tiny_skia::Transform::identity(), None);
        }
    }

    /// Transparency checkerboard made of `cell`-sized squares.
    pub fn fill_checkerboard(&mut self, cell: f32, light: Color, dark: Color) {
        self.fill(light);
        if cell <= 0.0 {
            return;
        }

        let mut paint = solid_paint(dark);
        paint.anti_alias = false;
        let columns = (self.width() as f32 / cell).ceil() as u32;
        let rows = (self.height() as f32 / cell).ceil() as u32;

        for row in 0..rows {
            for column in ((row % 2)..columns).step_by(2) {
                let rect = Rect::from_xywh(column as f32 * cell, row as f32 * cell, cell, cell);
                if let Some(rect) = rect {
                    self.pixmap
                        .fill_rect(rect, &paint, tiny_skia::Transform::identity(), None);
                }
            }
        }
    }

    /// Draw a decoded raster. `ts` maps raster pixels to surface pixels.
    pub fn draw_raster(&mut self, raster: &RasterImage, ts: &Transform, opacity: f32) {
        self.draw_pixmap(raster.pixmap(), ts, opacity);
    }

    pub fn draw_pixmap(&mut self, pixmap: PixmapRef<'_>, ts: &Transform, opacity: f32) {
        draw_pixmap_into(&mut self.pixmap, pixmap, ts, opacity);
    }

    /// Fill `path` after mapping it through `ts`.
    pub fn fill_path(&mut self, path: &Path, color: Color, ts: &Transform) {
        fill_path_into(&mut self.pixmap, path, color, ts);
    }

    /// Stroke `path` mapped through `ts` with a width in surface pixels.
    pub fn stroke_path(&mut self, path: &Path, color: Color, width: f32, ts: &Transform) {
        stroke_path_into(&mut self.pixmap, path, color, width, ts);
    }

    /// Straight-alpha color at a pixel; transparent when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        match self.pixmap.pixel(x, y) {
            Some(pixel) => {
                let c = pixel.demultiply();
                Color::rgba(c.red(), c.green(), c.blue(), c.alpha())
            }
            None => Color::TRANSPARENT,
        }
    }

    /// Straight-alpha RGBA bytes, row major.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.data().len());
        for pixel in self.pixmap.pixels() {
            let c = pixel.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }

    pub fn pixmap(&self) -> PixmapRef<'_> {
        self.pixmap.as_ref()
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

/// Draw `src` into `target`; `ts` maps source pixels to target pixels.
pub fn draw_pixmap_into(target: &mut Pixmap, src: PixmapRef<'_>, ts: &Transform, opacity: f32) {
    if opacity <= 0.0 || ts.is_degenerate() {
        return;
    }
    let paint = PixmapPaint {
        opacity: opacity.min(1.0),
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    target.draw_pixmap(0, 0, src, &paint, to_skia(ts), None);
}

pub fn fill_path_into(pixmap: &mut Pixmap, path: &Path, color: Color, ts: &Transform) {
    if color.is_transparent() || ts.is_degenerate() {
        return;
    }
    pixmap.fill_path(path, &solid_paint(color), FillRule::Winding, to_skia(ts), None);
}

pub fn stroke_path_into(pixmap: &mut Pixmap, path: &Path, color: Color, width: f32, ts: &Transform) {
    if color.is_transparent() || width <= 0.0 || ts.is_degenerate() {
        return;
    }
    // Map the path first so the stroke width stays in surface pixels.
    let Some(mapped) = path.clone().transform(to_skia(ts)) else {
        return;
    };
    let stroke = Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(&mapped, &solid_paint(color), &stroke, tiny_skia::Transform::identity(), None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::PathBuilder;

    #[test]
    fn test_fill_and_pixel() {
        let mut surface = Surface::new(4, 4).unwrap();
        assert_eq!(surface.pixel(0, 0), Color::TRANSPARENT);

        surface.fill(Color::rgba(255, 0, 0, 128));
        let pixel = surface.pixel(1, 1);
        assert_eq!(pixel.a, 128);
        assert!(pixel.r >= 254);
        assert_eq!(surface.pixel(10, 10), Color::TRANSPARENT);
    }

    #[test]
    fn test_checkerboard_alternates() {
        let mut surface = Surface::new(20, 20).unwrap();
        surface.fill_checkerboard(10.0, Color::WHITE, Color::rgb(200, 200, 200));
        assert_eq!(surface.pixel(2, 2), Color::rgb(200, 200, 200));
        assert_eq!(surface.pixel(12, 2), Color::WHITE);
        assert_eq!(surface.pixel(2, 12), Color::WHITE);
        assert_eq!(surface.pixel(12, 12), Color::rgb(200, 200, 200));
    }

    #[test]
    fn test_stroke_width_is_in_surface_pixels() {
        let mut surface = Surface::new(100, 100).unwrap();
        let mut pb = PathBuilder::new();
        pb.move_to(0.0, 0.5);
        pb.line_to(1.0, 0.5);
        let path = pb.finish().unwrap();

        // The unit path is scaled 100x; the stroke stays 4px wide.
        surface.stroke_path(&path, Color::BLACK, 4.0, &Transform::scale(100.0, 100.0));
        assert_eq!(surface.pixel(50, 50).a, 255);
        assert_eq!(surface.pixel(50, 56).a, 0);
    }

    #[test]
    fn test_resize_and_allocation_errors() {
        let mut surface = Surface::new(8, 8).unwrap();
        surface.fill(Color::WHITE);
        surface.resize_to(8, 8).unwrap();
        assert_eq!(surface.pixel(0, 0), Color::TRANSPARENT);

        surface.resize_to(16, 4).unwrap();
        assert_eq!(surface.size(), Size::new(16.0, 4.0));
        assert_eq!(Surface::new(0, 10).err(), Some(DrawError::allocation(0, 10)));
    }

    #[test]
    fn test_to_rgba8_is_unpremultiplied() {
        let mut surface = Surface::new(1, 1).unwrap();
        surface.fill(Color::rgba(100, 50, 200, 128));
        let bytes = surface.to_rgba8();
        assert_eq!(bytes.len(), 4);
        assert!(bytes[0].abs_diff(100) <= 2);
        assert!(bytes[2].abs_diff(200) <= 2);
        assert_eq!(bytes[3], 128);
    }
}
