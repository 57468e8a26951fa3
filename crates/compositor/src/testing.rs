//! Fixtures shared by the compositor tests.

use image::{ImageEncoder, Rgba, RgbaImage};
use render::{CollectingNotifier, ReportOnce, ResourceCache};
use scene::SourceKey;
use std::sync::Arc;

/// Encode a solid-color PNG.
pub(crate) fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    bytes
}

/// Encode a PNG whose left and right halves have different colors.
pub(crate) fn split_png(width: u32, height: u32, left: [u8; 4], right: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| Rgba(if x < width / 2 { left } else { right }));
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    bytes
}

/// A cache whose failures are collected, each reported once.
pub(crate) fn quiet_cache() -> (ResourceCache, Arc<CollectingNotifier>) {
    let collector = Arc::new(CollectingNotifier::new());
    let cache = ResourceCache::new().with_notifier(Arc::new(ReportOnce::new(collector.clone())));
    (cache, collector)
}

/// Register `png` as a blob and wait for it to decode.
pub(crate) async fn loaded_blob(cache: &ResourceCache, png: Vec<u8>) -> SourceKey {
    let key = cache.register_blob(png);
    cache.load_raster(&key).await.unwrap();
    key
}
