//! Pixel effects: photo color adjustments and glow.

use common::color::Color;
use scene::ImageAdjustments;
use tiny_skia::{ColorU8, Pixmap};

/// Apply brightness, contrast, saturation and fade in that order.
///
/// The first three follow CSS filter semantics with 100 as identity. Fade
/// blends each channel toward white.
pub fn apply_adjustments(pixmap: &mut Pixmap, adjustments: &ImageAdjustments) {
    if adjustments.is_neutral() {
        return;
    }

    let brightness = adjustments.brightness / 100.0;
    let contrast = adjustments.contrast / 100.0;
    let s = adjustments.saturation / 100.0;
    let fade = adjustments.fade / 100.0;

    for pixel in pixmap.pixels_mut() {
        if pixel.alpha() == 0 {
            continue;
        }
        let straight = pixel.demultiply();
        let mut r = straight.red() as f32 / 255.0;
        let mut g = straight.green() as f32 / 255.0;
        let mut b = straight.blue() as f32 / 255.0;

        r *= brightness;
        g *= brightness;
        b *= brightness;

        r = (r - 0.5) * contrast + 0.5;
        g = (g - 0.5) * contrast + 0.5;
        b = (b - 0.5) * contrast + 0.5;

        let (sr, sg, sb) = (
            (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * b,
            (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * b,
            (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * b,
        );

        let finish = |c: f32| {
            let c = c.clamp(0.0, 1.0);
            ((c + (1.0 - c) * fade) * 255.0).round() as u8
        };

        *pixel = ColorU8::from_rgba(finish(sr), finish(sg), finish(sb), straight.alpha()).premultiply();
    }
}

/// Gaussian sigma for a glow of the given intensity in pixels.
pub fn glow_sigma(intensity: f32) -> f32 {
    intensity.max(0.0) / 2.0
}

/// Margin needed around content so its glow is not clipped.
pub fn glow_padding(sigma: f32) -> f32 {
    (sigma * 3.0).ceil()
}

/// Build a glow from the coverage of `layer`: every pixel becomes `color`
/// weighted by the layer's alpha, then the result is blurred.
pub fn glow_from_coverage(layer: &Pixmap, color: Color, sigma: f32) -> Pixmap {
    let mut glow = layer.clone();
    let tint_alpha = color.a as u32;

    for px in glow.data_mut().chunks_exact_mut(4) {
        let a = (px[3] as u32 * tint_alpha + 127) / 255;
        px[0] = ((color.r as u32 * a + 127) / 255) as u8;
        px[1] = ((color.g as u32 * a + 127) / 255) as u8;
        px[2] = ((color.b as u32 * a + 127) / 255) as u8;
        px[3] = a as u8;
    }

    gaussian_blur(&mut glow, sigma);
    glow
}

/// Approximate a gaussian blur with three box blurs.
///
/// Pixels outside the pixmap count as transparent.
pub fn gaussian_blur(pixmap: &mut Pixmap, sigma: f32) {
    if sigma < 0.5 {
        return;
    }
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let mut scratch = Vec::with_capacity(pixmap.data().len());

    for size in box_sizes(sigma) {
        let radius = (size - 1) / 2;
        if radius == 0 {
            continue;
        }
        box_blur_1d(pixmap.data_mut(), width, height, radius, true, &mut scratch);
        box_blur_1d(pixmap.data_mut(), width, height, radius, false, &mut scratch);
    }
}

/// Widths of three successive box filters whose combination approximates a
/// gaussian of standard deviation `sigma`.
fn box_sizes(sigma: f32) -> [usize; 3] {
    const PASSES: f32 = 3.0;
    let ideal = (12.0 * sigma * sigma / PASSES + 1.0).sqrt();
    let mut lower = ideal.floor() as i64;
    if lower % 2 == 0 {
        lower -= 1;
    }
    let lower = lower.max(1);
    let upper = lower + 2;
    let lf = lower as f32;
    let m = ((12.0 * sigma * sigma - PASSES * lf * lf - 4.0 * PASSES * lf - 3.0 * PASSES) / (-4.0 * lf - 4.0)).round() as i64;

    let mut sizes = [0usize; 3];
    for (i, size) in sizes.iter_mut().enumerate() {
        *size = if (i as i64) < m { lower as usize } else { upper as usize };
    }
    sizes
}

fn box_blur_1d(data: &mut [u8], width: usize, height: usize, radius: usize, horizontal: bool, scratch: &mut Vec<u8>) {
    let (len, lines, step, line_step) = if horizontal {
        (width, height, 4, width * 4)
    } else {
        (height, width, width * 4, 4)
    };
    if len == 0 {
        return;
    }

    scratch.clear();
    scratch.extend_from_slice(data);
    let src = scratch.as_slice();
    let div = (2 * radius + 1) as u32;

    for line in 0..lines {
        let base = line * line_step;
        for channel in 0..4 {
            let at = |i: usize| base + i * step + channel;
            let mut sum: u32 = (0..=radius.min(len - 1)).map(|k| src[at(k)] as u32).sum();

            for i in 0..len {
                data[at(i)] = ((sum + div / 2) / div) as u8;
                if i + radius + 1 < len {
                    sum += src[at(i + radius + 1)] as u32;
                }
                if i >= radius {
                    sum -= src[at(i - radius)] as u32;
                }
            }
        }
    }
}
