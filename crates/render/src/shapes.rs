//! Vector templates for the shape layer kinds.
//!
//! Every template lives in the unit square `0..1 x 0..1` with its visual
//! center at `(0.5, 0.5)`. Layers scale and place it with a transform.

use once_cell::sync::Lazy;
use scene::ShapeKind;
use std::collections::HashMap;
use std::f32::consts::PI;
use tiny_skia::{Path, PathBuilder};

static TEMPLATES: Lazy<HashMap<ShapeKind, Path>> = Lazy::new(|| {
    ShapeKind::ALL
        .iter()
        .filter_map(|&kind| build(kind).map(|path| (kind, path)))
        .collect()
});

/// Unit-square path for `kind`.
pub fn shape_path(kind: ShapeKind) -> Option<&'static Path> {
    TEMPLATES.get(&kind)
}

fn build(kind: ShapeKind) -> Option<Path> {
    match kind {
        ShapeKind::Circle => PathBuilder::from_circle(0.5, 0.5, 0.5),
        ShapeKind::Square => tiny_skia::Rect::from_xywh(0.0, 0.0, 1.0, 1.0).map(PathBuilder::from_rect),
        ShapeKind::Rectangle => tiny_skia::Rect::from_xywh(0.0, 0.2, 1.0, 0.6).map(PathBuilder::from_rect),
        ShapeKind::Triangle => polygon(&[(0.5, 0.0), (1.0, 1.0), (0.0, 1.0)]),
        ShapeKind::Diamond => polygon(&[(0.5, 0.0), (1.0, 0.5), (0.5, 1.0), (0.0, 0.5)]),
        ShapeKind::Pentagon => polygon(&regular(5, 0.5)),
        ShapeKind::Hexagon => polygon(&regular(6, 0.5)),
        ShapeKind::Star => polygon(&star(5, 0.5, 0.2)),
        ShapeKind::Arrow => polygon(&[
            (0.0, 0.35),
            (0.6, 0.35),
            (0.6, 0.1),
            (1.0, 0.5),
            (0.6, 0.9),
            (0.6, 0.65),
            (0.0, 0.65),
        ]),
        ShapeKind::Heart => heart(),
    }
}

fn polygon(points: &[(f32, f32)]) -> Option<Path> {
    let (&(x, y), rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(x, y);
    for &(x, y) in rest {
        pb.line_to(x, y);
    }
    pb.close();
    pb.finish()
}

/// Vertices of a regular polygon pointing up.
fn regular(sides: usize, radius: f32) -> Vec<(f32, f32)> {
    (0..sides)
        .map(|i| vertex(i as f32 * 2.0 * PI / sides as f32, radius))
        .collect()
}

fn star(points: usize, outer: f32, inner: f32) -> Vec<(f32, f32)> {
    let step = PI / points as f32;
    (0..points * 2)
        .map(|i| {
            let radius = if i % 2 == 0 { outer } else { inner };
            vertex(i as f32 * step, radius)
        })
        .collect()
}

fn vertex(angle: f32, radius: f32) -> (f32, f32) {
    let angle = angle - PI / 2.0;
    (0.5 + radius * angle.cos(), 0.5 + radius * angle.sin())
}

fn heart() -> Option<Path> {
    let mut pb = PathBuilder::new();
    pb.move_to(0.5, 0.3);
    pb.cubic_to(0.5, 0.27, 0.45, 0.15, 0.25, 0.15);
    pb.cubic_to(0.0, 0.15, 0.0, 0.4, 0.0, 0.4);
    pb.cubic_to(0.0, 0.55, 0.1, 0.77, 0.5, 0.95);
    pb.cubic_to(0.9, 0.77, 1.0, 0.55, 1.0, 0.4);
    pb.cubic_to(1.0, 0.4, 1.0, 0.15, 0.75, 0.15);
    pb.cubic_to(0.6, 0.15, 0.5, 0.27, 0.5, 0.3);
    pb.close();
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_template() {
        for kind in ShapeKind::ALL {
            let path = shape_path(kind).unwrap_or_else(|| panic!("no path for {}", kind.name()));
            let bounds = path.bounds();
            assert!(bounds.left() >= -0.001 && bounds.top() >= -0.001, "{}", kind.name());
            assert!(bounds.right() <= 1.001 && bounds.bottom() <= 1.001, "{}", kind.name());
        }
    }

    #[test]
    fn test_templates_are_shared() {
        let a = shape_path(ShapeKind::Star).unwrap();
        let b = shape_path(ShapeKind::Star).unwrap();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_star_alternates_radius() {
        let points = star(5, 0.5, 0.2);
        assert_eq!(points.len(), 10);
        let dist = |(x, y): (f32, f32)| ((x - 0.5).powi(2) + (y - 0.5).powi(2)).sqrt();
        assert!((dist(points[0]) - 0.5).abs() < 1e-5);
        assert!((dist(points[1]) - 0.2).abs() < 1e-5);
        // First point is straight up.
        assert!((points[0].0 - 0.5).abs() < 1e-5 && points[0].1.abs() < 1e-5);
    }

    #[test]
    fn test_circle_fills_unit_square() {
        let bounds = shape_path(ShapeKind::Circle).unwrap().bounds();
        assert!((bounds.width() - 1.0).abs() < 1e-4);
        assert!((bounds.height() - 1.0).abs() < 1e-4);
    }
}
