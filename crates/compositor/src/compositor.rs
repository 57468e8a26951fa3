//! Flattens a scene into a surface.
//!
//! The draw order is fixed: background fill, background images, shapes,
//! texts, the primary foreground, its clones, the inpainted patch and finally
//! the movable object. Collections draw in insertion order.

use common::color::Color;
use common::geometry::{Point, Rect, Size, Transform};
use render::effects::{glow_from_coverage, glow_padding, glow_sigma};
use render::shapes::shape_path;
use render::surface::{draw_pixmap_into, fill_path_into, new_pixmap, stroke_path_into};
use render::text::rasterize_line;
use render::{DrawError, Failure, RasterHandle, RasterImage, RasterState, ResourceCache, Surface};
use scene::{
    BackgroundFill, BackgroundImageLayer, ClonedForeground, Glow, LayerId, Position, Scene, ShapeLayer, SourceKey,
    TextLayer,
};
use smallvec::SmallVec;
use std::time::Instant;
use tiny_skia::Pixmap;
use tracing::debug;

/// Why a frame is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPurpose {
    /// Live preview; transparency shows as a checkerboard.
    Preview,
    /// Final output; transparency stays transparent.
    Export,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderOptions {
    pub purpose: RenderPurpose,
    /// Multiplier for attributes given in preview pixels: font size, stroke
    /// width and glow intensity.
    pub pixel_scale: f32,
}

impl RenderOptions {
    pub fn preview() -> Self {
        Self {
            purpose: RenderPurpose::Preview,
            pixel_scale: 1.0,
        }
    }

    pub fn export(pixel_scale: f32) -> Self {
        Self {
            purpose: RenderPurpose::Export,
            pixel_scale,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::preview()
    }
}

/// Per-frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub drawn: usize,
    /// Layers left out because their raster failed or their draw failed.
    pub skipped: usize,
    /// Optional layers whose raster is still loading.
    pub pending: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    Drawn(RenderStats),
    /// A raster the frame cannot do without is still loading; the surface was
    /// left untouched.
    Deferred { waiting_on: SmallVec<[SourceKey; 2]> },
}

impl RenderOutcome {
    pub fn is_drawn(&self) -> bool {
        matches!(self, RenderOutcome::Drawn(_))
    }

    pub fn stats(&self) -> Option<RenderStats> {
        match self {
            RenderOutcome::Drawn(stats) => Some(*stats),
            RenderOutcome::Deferred { .. } => None,
        }
    }
}

/// Look of the transparency checkerboard, in preview pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CheckerStyle {
    pub cell: f32,
    pub light: Color,
    pub dark: Color,
}

impl Default for CheckerStyle {
    fn default() -> Self {
        Self {
            cell: 10.0,
            light: Color::WHITE,
            dark: Color::rgb(204, 204, 204),
        }
    }
}

/// Draws scenes. Holds no per-scene state.
#[derive(Clone, Debug, Default)]
pub struct Compositor {
    checker: CheckerStyle,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checker(mut self, checker: CheckerStyle) -> Self {
        self.checker = checker;
        self
    }

    pub fn checker(&self) -> &CheckerStyle {
        &self.checker
    }

    /// Render `scene` into `surface`, sized to the surface.
    ///
    /// Layer failures are reported through the cache's notifier and the rest
    /// of the scene still draws.
    pub fn render(
        &self,
        scene: &Scene,
        resources: &ResourceCache,
        surface: &mut Surface,
        options: &RenderOptions,
    ) -> RenderOutcome {
        let waiting_on = required_pending(scene, resources);
        if !waiting_on.is_empty() {
            debug!(waiting = waiting_on.len(), "frame deferred until required rasters load");
            return RenderOutcome::Deferred { waiting_on };
        }

        let start = Instant::now();
        surface.clear();
        let canvas = surface.size();
        let mut pass = Pass {
            surface,
            resources,
            canvas,
            options: *options,
            stats: RenderStats::default(),
        };

        pass.background(scene, &self.checker);
        for layer in &scene.background_images {
            pass.background_image(layer);
        }
        for layer in &scene.shapes {
            pass.shape(layer);
        }
        for layer in &scene.texts {
            pass.text(layer);
        }

        let foreground = scene.foreground_photo.as_ref().and_then(|key| pass.raster(key));
        match &foreground {
            Some(raster) => {
                pass.foreground(scene, raster);
                for clone in &scene.clones {
                    pass.clone_layer(raster, clone);
                }
            }
            None if scene.foreground_photo.is_some() => pass.stats.skipped += scene.clones.len(),
            None => {}
        }

        if let Some(key) = &scene.inpainted_patch {
            pass.inpainted_patch(key);
        }
        if let Some(object) = &scene.movable_object {
            if let Some(raster) = pass.raster(&object.source) {
                let offset = pass.px(object.position);
                pass.cutout(&raster, object.scale, object.rotation, offset);
            }
        }

        let stats = pass.stats;
        debug!(
            drawn = stats.drawn,
            skipped = stats.skipped,
            pending = stats.pending,
            elapsed_us = start.elapsed().as_micros() as u64,
            "frame composited"
        );
        RenderOutcome::Drawn(stats)
    }
}

/// Rasters the frame cannot be drawn without that are not loaded yet.
fn required_pending(scene: &Scene, resources: &ResourceCache) -> SmallVec<[SourceKey; 2]> {
    let photo = match scene.background_fill() {
        BackgroundFill::Photo(key) => Some(key),
        _ => None,
    };
    [photo, scene.foreground_photo.as_ref()]
        .into_iter()
        .flatten()
        .filter(|key| matches!(resources.raster_state(key), RasterState::Missing | RasterState::Pending))
        .cloned()
        .collect()
}

struct Pass<'a> {
    surface: &'a mut Surface,
    resources: &'a ResourceCache,
    canvas: Size,
    options: RenderOptions,
    stats: RenderStats,
}

impl Pass<'_> {
    /// Percent position to canvas pixels.
    fn px(&self, position: Position) -> Point {
        self.canvas.resolve_percent(Point::new(position.x, position.y))
    }

    fn raster(&mut self, key: &SourceKey) -> Option<RasterHandle> {
        match self.resources.raster_state(key) {
            RasterState::Ready(raster) => Some(raster),
            RasterState::Failed(err) => {
                // Already reported by the cache when the load failed.
                debug!(key = %key, error = %err, "skipping layer with failed raster");
                self.stats.skipped += 1;
                None
            }
            RasterState::Missing | RasterState::Pending => {
                self.stats.pending += 1;
                None
            }
        }
    }

    fn report(&mut self, key: String, err: &DrawError) {
        self.resources.notifier().notify(&Failure::draw(key, err.to_string()));
        self.stats.skipped += 1;
    }

    fn finish(&mut self, id: LayerId, result: Result<(), DrawError>) {
        match result {
            Ok(()) => self.stats.drawn += 1,
            Err(err) => self.report(id.to_string(), &err),
        }
    }

    fn background(&mut self, scene: &Scene, checker: &CheckerStyle) {
        match scene.background_fill() {
            BackgroundFill::Color(color) => self.surface.fill(color),
            BackgroundFill::Checkerboard => {
                if self.options.purpose == RenderPurpose::Preview {
                    let cell = checker.cell * self.options.pixel_scale;
                    self.surface.fill_checkerboard(cell, checker.light, checker.dark);
                }
            }
            BackgroundFill::Photo(key) => {
                if let Some(raster) = self.raster(key) {
                    let adjusted = raster.adjusted(&scene.image_adjustments);
                    let ts = Transform::scale(
                        self.canvas.width / raster.width() as f32,
                        self.canvas.height / raster.height() as f32,
                    );
                    self.surface.draw_pixmap((*adjusted).as_ref(), &ts, 1.0);
                    self.stats.drawn += 1;
                }
            }
            BackgroundFill::Empty => {}
        }
    }

    fn background_image(&mut self, layer: &BackgroundImageLayer) {
        let Some(raster) = self.raster(&layer.source) else {
            return;
        };
        let (w, h) = (raster.width() as f32, raster.height() as f32);
        // The image's longer side spans `scale` percent of the canvas' shorter side.
        let s = layer.scale / 100.0 * self.canvas.min_side() / w.max(h);
        if !(s > 0.0) {
            self.stats.drawn += 1;
            return;
        }

        let placement = &layer.placement;
        let at = self.px(placement.position);
        let ts = Transform::translation(-w / 2.0, -h / 2.0)
            .then_scale(s, s)
            .then_rotate_degrees(placement.rotation)
            .then_translate(at.x, at.y);
        let bounds = ts.transform_rect(Rect::new(0.0, 0.0, w, h));

        let result = self.composite(bounds, placement.opacity, placement.visible_glow(), |target, offset| {
            draw_pixmap_into(target, raster.pixmap(), &ts.then(offset), 1.0)
        });
        self.finish(layer.id, result);
    }

    fn shape(&mut self, layer: &ShapeLayer) {
        let Some(path) = shape_path(layer.shape) else {
            self.report(layer.id.to_string(), &DrawError::DegeneratePath(layer.shape.name().to_string()));
            return;
        };
        let size = layer.scale / 1000.0 * self.canvas.min_side();
        if !(size > 0.0) {
            self.stats.drawn += 1;
            return;
        }

        let placement = &layer.placement;
        let at = self.px(placement.position);
        let ts = Transform::translation(-0.5, -0.5)
            .then_scale(size, size)
            .then_rotate_degrees(placement.rotation)
            .then_translate(at.x, at.y);

        let stroke = layer.stroke_width * self.options.pixel_scale;
        let b = path.bounds();
        let mut bounds = ts.transform_rect(Rect::new(b.x(), b.y(), b.width(), b.height()));
        if !layer.is_filled {
            bounds = bounds.inflate(stroke / 2.0 + 1.0, stroke / 2.0 + 1.0);
        }

        let (color, filled) = (layer.color, layer.is_filled);
        let result = self.composite(bounds, placement.opacity, placement.visible_glow(), |target, offset| {
            let ts = ts.then(offset);
            if filled {
                fill_path_into(target, path, color, &ts);
            } else {
                stroke_path_into(target, path, color, stroke, &ts);
            }
        });
        self.finish(layer.id, result);
    }

    fn text(&mut self, layer: &TextLayer) {
        if layer.text.is_empty() {
            return;
        }
        let Some(font) = self.resources.font(&layer.font_family, layer.font_weight) else {
            self.report(layer.id.to_string(), &DrawError::NoFont(layer.font_key().to_string()));
            return;
        };

        let size = layer.font_size * self.options.pixel_scale;
        let raster = match rasterize_line(&font, &layer.text, size, layer.color) {
            Ok(Some(raster)) => raster,
            Ok(None) => {
                self.stats.drawn += 1;
                return;
            }
            Err(err) => {
                self.report(layer.id.to_string(), &err);
                return;
            }
        };

        if !raster.missing.is_empty() {
            let glyphs: String = raster.missing.iter().collect();
            let err = DrawError::MissingGlyphs {
                font: font.key().to_string(),
                glyphs: glyphs.clone(),
            };
            // Drawn anyway with the font's notdef glyph.
            self.resources
                .notifier()
                .notify(&Failure::draw(format!("{}:{}", font.key(), glyphs), err.to_string()));
        }

        let placement = &layer.placement;
        let at = self.px(placement.position);
        let ts = Transform::translation(-raster.anchor.x, -raster.anchor.y)
            .then_rotate_degrees(placement.rotation)
            .then_translate(at.x, at.y);
        let bounds = ts.transform_rect(Rect::new(
            0.0,
            0.0,
            raster.pixmap.width() as f32,
            raster.pixmap.height() as f32,
        ));

        let result = self.composite(bounds, placement.opacity, placement.visible_glow(), |target, offset| {
            draw_pixmap_into(target, raster.pixmap.as_ref(), &ts.then(offset), 1.0)
        });
        self.finish(layer.id, result);
    }

    fn foreground(&mut self, scene: &Scene, raster: &RasterImage) {
        let transform = &scene.foreground_transform;
        let offset = if scene.foreground_is_detached() {
            self.px(transform.offset)
        } else {
            Point::ZERO
        };
        self.cutout(raster, transform.size_multiplier, 0.0, offset);
    }

    fn clone_layer(&mut self, raster: &RasterImage, clone: &ClonedForeground) {
        let offset = self.px(clone.position);
        self.cutout(raster, clone.size_multiplier, clone.rotation, offset);
    }

    fn inpainted_patch(&mut self, key: &SourceKey) {
        if let Some(raster) = self.raster(key) {
            let ts = Transform::scale(
                self.canvas.width / raster.width() as f32,
                self.canvas.height / raster.height() as f32,
            );
            self.surface.draw_raster(&raster, &ts, 1.0);
            self.stats.drawn += 1;
        }
    }

    /// Scale-to-fit times `percent`, centered on the canvas center plus
    /// `offset`, rotated about its own center.
    fn cutout(&mut self, raster: &RasterImage, percent: f32, rotation: f32, offset: Point) {
        let size = raster.size();
        let s = self.canvas.fit_scale(size) * percent / 100.0;
        if s > 0.0 {
            let center = self.canvas.center();
            let ts = Transform::translation(-size.width / 2.0, -size.height / 2.0)
                .then_scale(s, s)
                .then_rotate_degrees(rotation)
                .then_translate(center.x + offset.x, center.y + offset.y);
            self.surface.draw_raster(raster, &ts, 1.0);
        }
        self.stats.drawn += 1;
    }

    /// Draw content covering `bounds` (canvas pixels) with group opacity and
    /// an optional glow beneath it.
    ///
    /// `paint` receives the target and the transform from canvas to target
    /// pixels. With full opacity and no glow it paints straight onto the
    /// surface; otherwise into a scratch pixmap cropped to the visible region.
    fn composite<F>(&mut self, bounds: Rect, opacity: f32, glow: Option<Glow>, paint: F) -> Result<(), DrawError>
    where
        F: FnOnce(&mut Pixmap, &Transform),
    {
        if opacity <= 0.0 {
            return Ok(());
        }
        let glow = glow.map(|glow| (glow, glow_sigma(glow.intensity * self.options.pixel_scale)));
        if glow.is_none() && opacity >= 1.0 {
            paint(self.surface.pixmap_mut(), &Transform::identity());
            return Ok(());
        }

        let pad = glow.map_or(0.0, |(_, sigma)| glow_padding(sigma));
        // Glow from content just off-canvas can still bleed in.
        let visible = Rect::from_size(self.canvas).inflate(pad, pad);
        let Some(region) = bounds.inflate(pad, pad).round_out().intersection(&visible) else {
            return Ok(());
        };
        let region = region.round_out();

        let mut scratch = new_pixmap(region.width as u32, region.height as u32)?;
        paint(&mut scratch, &Transform::translation(-region.x, -region.y));

        let place = Transform::translation(region.x, region.y);
        if let Some((glow, sigma)) = glow {
            let halo = glow_from_coverage(&scratch, glow.color, sigma);
            self.surface.draw_pixmap(halo.as_ref(), &place, opacity);
        }
        self.surface.draw_pixmap(scratch.as_ref(), &place, opacity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::{ExportRequest, Exporter};
    use crate::testing::{loaded_blob, quiet_cache, solid_png, split_png};
    use render::FailureKind;
    use scene::{ForegroundTransform, ImageAdjustments, MovableObject, Placement, ShapeKind};

    fn red_circle(x: f32, y: f32, scale: f32) -> ShapeLayer {
        ShapeLayer::new(ShapeKind::Circle, Color::RED, scale, Placement::at(x, y))
    }

    fn render(scene: &Scene, cache: &ResourceCache, width: u32, height: u32, options: RenderOptions) -> (Surface, RenderOutcome) {
        let mut surface = Surface::new(width, height).unwrap();
        let outcome = Compositor::new().render(scene, cache, &mut surface, &options);
        (surface, outcome)
    }

    #[tokio::test]
    async fn test_background_priority() {
        let (cache, _) = quiet_cache();
        let photo = loaded_blob(&cache, solid_png(4, 4, [0, 0, 255, 255])).await;
        let mut scene = Scene {
            background_photo: Some(photo),
            transparent_background: true,
            background_color: Some(Color::GREEN),
            ..Scene::default()
        };

        let (surface, _) = render(&scene, &cache, 40, 40, RenderOptions::preview());
        assert_eq!(surface.pixel(5, 5), Color::GREEN);

        scene.background_color = None;
        let (surface, _) = render(&scene, &cache, 40, 40, RenderOptions::preview());
        assert_eq!(surface.pixel(5, 5), CheckerStyle::default().dark);
        assert_eq!(surface.pixel(15, 5), Color::WHITE);

        // Export keeps transparency instead of the checkerboard.
        let (surface, _) = render(&scene, &cache, 40, 40, RenderOptions::export(1.0));
        assert_eq!(surface.pixel(5, 5).a, 0);

        scene.transparent_background = false;
        let (surface, _) = render(&scene, &cache, 40, 40, RenderOptions::preview());
        assert_eq!(surface.pixel(20, 20), Color::BLUE);
    }

    #[tokio::test]
    async fn test_adjustments_only_touch_background_photo() {
        let (cache, _) = quiet_cache();
        let gray = loaded_blob(&cache, solid_png(10, 10, [200, 200, 200, 255])).await;
        let scene = Scene {
            background_photo: Some(gray.clone()),
            image_adjustments: ImageAdjustments {
                brightness: 50.0,
                ..ImageAdjustments::default()
            },
            background_images: vec![BackgroundImageLayer::new(gray, 40.0, Placement::at(50.0, 50.0))],
            ..Scene::default()
        };

        let (surface, _) = render(&scene, &cache, 100, 100, RenderOptions::preview());
        assert_eq!(surface.pixel(5, 5).r, 100);
        assert_eq!(surface.pixel(50, 50).r, 200);
    }

    #[tokio::test]
    async fn test_pending_required_raster_defers_frame() {
        let (cache, _) = quiet_cache();
        let scene = Scene {
            background_photo: Some(SourceKey::new("blob:layerforge/never-loaded")),
            shapes: vec![red_circle(50.0, 50.0, 500.0)],
            ..Scene::default()
        };

        let mut surface = Surface::new(20, 20).unwrap();
        surface.fill(Color::GREEN);
        let outcome = Compositor::new().render(&scene, &cache, &mut surface, &RenderOptions::preview());
        match outcome {
            RenderOutcome::Deferred { waiting_on } => {
                assert_eq!(waiting_on.as_slice(), &[SourceKey::new("blob:layerforge/never-loaded")]);
            }
            other => panic!("expected deferral, got {:?}", other),
        }
        assert_eq!(surface.pixel(10, 10), Color::GREEN);
    }

    #[tokio::test]
    async fn test_failed_raster_skips_only_that_layer() {
        let (cache, notifier) = quiet_cache();
        let broken = cache.register_blob(b"not an image".to_vec());
        assert!(cache.load_raster(&broken).await.is_err());

        let scene = Scene {
            background_color: Some(Color::WHITE),
            background_images: vec![BackgroundImageLayer::new(broken.clone(), 50.0, Placement::at(50.0, 50.0))],
            shapes: vec![red_circle(50.0, 50.0, 200.0)],
            movable_object: Some(MovableObject::new(broken)),
            ..Scene::default()
        };

        let (surface, outcome) = render(&scene, &cache, 100, 100, RenderOptions::preview());
        let stats = outcome.stats().unwrap();
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.drawn, 1);
        assert_eq!(surface.pixel(50, 50), Color::RED);
        assert_eq!(notifier.count(FailureKind::Resource), 1);
    }

    #[tokio::test]
    async fn test_later_layers_draw_on_top() {
        let (cache, _) = quiet_cache();
        let sticker = loaded_blob(&cache, solid_png(10, 10, [0, 0, 255, 255])).await;
        let mut scene = Scene {
            background_images: vec![BackgroundImageLayer::new(sticker, 50.0, Placement::at(50.0, 50.0))],
            shapes: vec![
                red_circle(50.0, 50.0, 300.0),
                ShapeLayer::new(ShapeKind::Square, Color::GREEN, 100.0, Placement::at(50.0, 50.0)),
            ],
            ..Scene::default()
        };

        let (surface, _) = render(&scene, &cache, 100, 100, RenderOptions::preview());
        assert_eq!(surface.pixel(50, 50), Color::GREEN);
        assert_eq!(surface.pixel(50, 40), Color::RED);
        assert_eq!(surface.pixel(50, 28), Color::BLUE);

        scene.shapes.swap(0, 1);
        let (surface, _) = render(&scene, &cache, 100, 100, RenderOptions::preview());
        assert_eq!(surface.pixel(50, 50), Color::RED);
    }

    #[tokio::test]
    async fn test_circle_and_text_scenario() {
        let (cache, _) = quiet_cache();
        let photo_color = [0, 0, 255, 255];
        let photo = loaded_blob(&cache, solid_png(800, 600, photo_color)).await;
        let scene = Scene {
            background_photo: Some(photo),
            shapes: vec![red_circle(20.0, 20.0, 50.0)],
            texts: vec![TextLayer::new("Hello", "sans-serif", 100.0, Color::BLACK, Placement::at(50.0, 50.0))],
            ..Scene::default()
        };
        cache.ensure_fonts(&scene).await;

        let exported = Exporter::new(Compositor::new())
            .export(&scene, &cache, &ExportRequest::new(Size::new(800.0, 600.0)))
            .await
            .unwrap();
        assert_eq!((exported.width, exported.height), (800, 600));
        let image = image::load_from_memory(&exported.bytes).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (800, 600));
        let pixel = |x: u32, y: u32| image.get_pixel(x, y).0;

        // Circle: diameter 50/1000 * 600 = 30, so radius 15 around (160, 120).
        assert_eq!(pixel(160, 120), [255, 0, 0, 255]);
        assert_eq!(pixel(160 + 13, 120), [255, 0, 0, 255]);
        assert_eq!(pixel(160 - 13, 120), [255, 0, 0, 255]);
        assert_eq!(pixel(160 + 17, 120), photo_color);
        assert_eq!(pixel(160, 120 + 17), photo_color);

        if cache.fallback_font().is_some() {
            let ink = (370..430)
                .flat_map(|x| (280..320).map(move |y| (x, y)))
                .filter(|&(x, y)| pixel(x, y) != photo_color)
                .count();
            assert!(ink > 0, "text should be centered on (400, 300)");
            assert_eq!(pixel(400, 200), photo_color);
            assert_eq!(pixel(100, 300), photo_color);
        }
    }

    #[tokio::test]
    async fn test_layer_kinds_stack_in_fixed_order() {
        let (cache, _) = quiet_cache();
        let shade = |r: u8| [r, 0, 0, 255];
        let aux = loaded_blob(&cache, solid_png(10, 10, shade(30))).await;
        let cutout = loaded_blob(&cache, split_png(20, 10, shade(60), shade(70))).await;
        let patch = loaded_blob(&cache, solid_png(10, 10, shade(80))).await;
        let object = loaded_blob(&cache, solid_png(10, 10, shade(90))).await;

        // Every layer covers (45, 50). The cutout spans x 30..70 with its
        // left half there; the clone, shifted 10px left, shows its right half.
        let mut scene = Scene {
            background_color: Some(Color::rgb(20, 0, 0)),
            background_images: vec![BackgroundImageLayer::new(aux, 100.0, Placement::at(50.0, 50.0))],
            shapes: vec![ShapeLayer::new(ShapeKind::Square, Color::rgb(40, 0, 0), 1000.0, Placement::at(50.0, 50.0))],
            texts: vec![TextLayer::new("I", "sans-serif", 60.0, Color::rgb(50, 0, 0), Placement::at(45.0, 50.0))],
            foreground_photo: Some(cutout),
            foreground_transform: ForegroundTransform {
                offset: Position::default(),
                size_multiplier: 40.0,
            },
            clones: vec![ClonedForeground::new(Position::new(-10.0, 0.0), 40.0, 0.0)],
            inpainted_patch: Some(patch),
            movable_object: Some(MovableObject::new(object)),
            ..Scene::default()
        };
        cache.ensure_fonts(&scene).await;
        let visible = |scene: &Scene| {
            let (surface, outcome) = render(scene, &cache, 100, 100, RenderOptions::preview());
            assert!(outcome.is_drawn());
            surface
        };

        assert_eq!(visible(&scene).pixel(45, 50), Color::rgb(90, 0, 0));
        scene.movable_object = None;
        assert_eq!(visible(&scene).pixel(45, 50), Color::rgb(80, 0, 0));
        scene.inpainted_patch = None;
        assert_eq!(visible(&scene).pixel(45, 50), Color::rgb(70, 0, 0));
        scene.clones.clear();
        assert_eq!(visible(&scene).pixel(45, 50), Color::rgb(60, 0, 0));
        scene.foreground_photo = None;
        if cache.fallback_font().is_some() {
            let surface = visible(&scene);
            let text_pixels = (35..56)
                .flat_map(|x| (30..71).map(move |y| (x, y)))
                .filter(|&(x, y)| surface.pixel(x, y) == Color::rgb(50, 0, 0))
                .count();
            assert!(text_pixels > 0, "text should cover the shape");
        }
        scene.texts.clear();
        assert_eq!(visible(&scene).pixel(45, 50), Color::rgb(40, 0, 0));
        scene.shapes.clear();
        assert_eq!(visible(&scene).pixel(45, 50), Color::rgb(30, 0, 0));
        scene.background_images.clear();
        assert_eq!(visible(&scene).pixel(45, 50), Color::rgb(20, 0, 0));
    }

    #[tokio::test]
    async fn test_movable_object_offset_scale_and_rotation() {
        let (cache, _) = quiet_cache();
        let object = loaded_blob(&cache, solid_png(10, 10, [0, 0, 255, 255])).await;
        let scene = Scene {
            movable_object: Some(MovableObject {
                position: Position::new(25.0, 0.0),
                scale: 40.0,
                rotation: 45.0,
                ..MovableObject::new(object)
            }),
            ..Scene::default()
        };

        // Fits at 10x, so 40% is a 40px square, moved 50px right of center
        // to (150, 50) and turned into a diamond.
        let (surface, outcome) = render(&scene, &cache, 200, 100, RenderOptions::export(1.0));
        assert_eq!(outcome.stats().unwrap().drawn, 1);
        assert_eq!(surface.pixel(150, 50), Color::BLUE);
        assert_eq!(surface.pixel(150, 25), Color::BLUE);
        assert_eq!(surface.pixel(150, 15).a, 0);
        assert_eq!(surface.pixel(133, 33).a, 0);
        assert_eq!(surface.pixel(100, 50).a, 0);
    }

    #[tokio::test]
    async fn test_oversized_text_is_skipped_and_reported() {
        let (cache, notifier) = quiet_cache();
        let scene = Scene {
            shapes: vec![red_circle(50.0, 50.0, 400.0)],
            texts: vec![TextLayer::new("W", "sans-serif", 200_000.0, Color::BLACK, Placement::at(50.0, 50.0))],
            ..Scene::default()
        };
        cache.ensure_fonts(&scene).await;

        let (surface, outcome) = render(&scene, &cache, 100, 100, RenderOptions::export(1.0));
        let stats = outcome.stats().unwrap();
        assert_eq!(stats.drawn, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(surface.pixel(50, 50), Color::RED);
        assert_eq!(notifier.count(FailureKind::Draw), 1);
        if cache.fallback_font().is_some() {
            let failure = notifier.failures().into_iter().find(|f| f.kind == FailureKind::Draw).unwrap();
            assert!(failure.message.contains("allocate"), "{}", failure.message);
        }
    }

    #[tokio::test]
    async fn test_two_clones_share_the_foreground() {
        let (cache, _) = quiet_cache();
        let cutout = loaded_blob(&cache, solid_png(100, 100, [0, 0, 255, 255])).await;
        let scene = Scene {
            transparent_background: true,
            foreground_photo: Some(cutout),
            foreground_transform: ForegroundTransform {
                offset: Position::default(),
                size_multiplier: 20.0,
            },
            clones: vec![
                ClonedForeground::new(Position::new(-25.0, 0.0), 20.0, 0.0),
                ClonedForeground::new(Position::new(25.0, 0.0), 20.0, 45.0),
            ],
            ..Scene::default()
        };

        let (surface, outcome) = render(&scene, &cache, 400, 400, RenderOptions::export(1.0));
        assert_eq!(outcome.stats().unwrap().drawn, 3);
        assert_eq!(cache.decode_count(), 1);

        // Primary 80px square at the center, clones 100px to either side.
        assert_eq!(surface.pixel(200, 200), Color::BLUE);
        assert_eq!(surface.pixel(100, 200), Color::BLUE);
        assert_eq!(surface.pixel(300, 200), Color::BLUE);
        assert_eq!(surface.pixel(150, 200).a, 0);
        // The rotated clone reaches past its unrotated half width along the diagonal.
        assert_eq!(surface.pixel(300, 200 - 50).a, 255);
        assert_eq!(surface.pixel(300 - 38, 200 - 38).a, 0);
    }

    #[tokio::test]
    async fn test_foreground_offset_needs_detached_background() {
        let (cache, _) = quiet_cache();
        let cutout = loaded_blob(&cache, solid_png(10, 10, [0, 0, 255, 255])).await;
        let photo = loaded_blob(&cache, solid_png(10, 10, [255, 255, 255, 255])).await;
        let mut scene = Scene {
            background_photo: Some(photo),
            foreground_photo: Some(cutout),
            foreground_transform: ForegroundTransform {
                offset: Position::new(30.0, 0.0),
                size_multiplier: 20.0,
            },
            ..Scene::default()
        };

        let (surface, _) = render(&scene, &cache, 100, 100, RenderOptions::preview());
        assert_eq!(surface.pixel(50, 50), Color::BLUE);
        assert_eq!(surface.pixel(80, 50), Color::WHITE);

        scene.background_replaced = true;
        let (surface, _) = render(&scene, &cache, 100, 100, RenderOptions::preview());
        assert_eq!(surface.pixel(50, 50), Color::WHITE);
        assert_eq!(surface.pixel(80, 50), Color::BLUE);
    }

    #[tokio::test]
    async fn test_opacity_and_glow() {
        let (cache, _) = quiet_cache();
        let mut faded = red_circle(50.0, 50.0, 400.0);
        faded.placement.opacity = 0.5;
        let scene = Scene {
            shapes: vec![faded],
            ..Scene::default()
        };
        let (surface, _) = render(&scene, &cache, 100, 100, RenderOptions::export(1.0));
        assert!(surface.pixel(50, 50).a.abs_diff(128) <= 1);

        let mut glowing = red_circle(50.0, 50.0, 400.0);
        glowing.placement.glow = Some(Glow::new(Color::BLUE, 8.0));
        let scene = Scene {
            shapes: vec![glowing],
            ..Scene::default()
        };
        let (surface, _) = render(&scene, &cache, 100, 100, RenderOptions::export(1.0));
        assert_eq!(surface.pixel(50, 50), Color::RED);
        let halo = surface.pixel(50, 50 - 22);
        assert!(halo.a > 0 && halo.b > halo.r, "halo {:?}", halo);
        assert_eq!(surface.pixel(2, 2).a, 0);
    }

    #[tokio::test]
    async fn test_outline_stroke_scales_with_pixel_scale() {
        let (cache, _) = quiet_cache();
        let scene = Scene {
            shapes: vec![ShapeLayer::new(ShapeKind::Square, Color::BLACK, 500.0, Placement::at(50.0, 50.0)).outlined(4.0)],
            ..Scene::default()
        };

        // Square edges at 25 and 75 at 1x, 50 and 150 at 2x.
        let (small, _) = render(&scene, &cache, 100, 100, RenderOptions::export(1.0));
        assert_eq!(small.pixel(25, 50).a, 255);
        assert_eq!(small.pixel(50, 50).a, 0);
        assert_eq!(small.pixel(29, 50).a, 0);

        let (large, _) = render(&scene, &cache, 200, 200, RenderOptions::export(2.0));
        assert_eq!(large.pixel(53, 100).a, 255);
        assert_eq!(large.pixel(58, 100).a, 0);
    }

    #[tokio::test]
    async fn test_zero_scale_and_empty_text_are_invisible() {
        let (cache, notifier) = quiet_cache();
        let scene = Scene {
            shapes: vec![red_circle(50.0, 50.0, 0.0)],
            texts: vec![TextLayer::new("", "sans-serif", 20.0, Color::BLACK, Placement::default())],
            ..Scene::default()
        };
        let (surface, outcome) = render(&scene, &cache, 50, 50, RenderOptions::preview());
        assert!(outcome.is_drawn());
        assert!(surface.to_rgba8().chunks_exact(4).all(|px| px[3] == 0));
        assert!(notifier.failures().is_empty());
    }
}
