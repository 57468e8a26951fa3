//! Decoded raster images.

use crate::effects;
use crate::error::ResourceError;
use common::geometry::Size;
use image::ImageFormat;
use parking_lot::Mutex;
use scene::ImageAdjustments;
use std::sync::Arc;
use tiny_skia::{IntSize, Pixmap, PixmapRef};

/// A decoded image, stored premultiplied and ready to draw.
pub struct RasterImage {
    pixmap: Pixmap,
    /// Original format, if decoded from an encoded file.
    format: Option<ImageFormat>,
    /// Last color-adjusted variant, keyed by its adjustments.
    adjusted: Mutex<Option<(ImageAdjustments, Arc<Pixmap>)>>,
}

impl RasterImage {
    /// Decode PNG, JPEG, WebP, GIF or any other format the `image` crate knows.
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        let format = image::guess_format(bytes).map_err(|e| e.to_string())?;
        let img = image::load_from_memory_with_format(bytes, format).map_err(|e| e.to_string())?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut raster = Self::from_rgba8(width, height, rgba.into_raw())?;
        raster.format = Some(format);
        Ok(raster)
    }

    /// Build from straight-alpha RGBA bytes.
    pub fn from_rgba8(width: u32, height: u32, mut rgba: Vec<u8>) -> Result<Self, String> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(format!("expected {}x{} RGBA pixels, got {} bytes", width, height, rgba.len()));
        }
        premultiply_in_place(&mut rgba);

        let size = IntSize::from_wh(width, height).ok_or_else(|| format!("invalid size {}x{}", width, height))?;
        let pixmap = Pixmap::from_vec(rgba, size).ok_or_else(|| format!("cannot allocate {}x{} image", width, height))?;

        Ok(Self::from_pixmap(pixmap))
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            format: None,
            adjusted: Mutex::new(None),
        }
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

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn pixmap(&self) -> PixmapRef<'_> {
        self.pixmap.as_ref()
    }

    /// This image with `adjustments` applied.
    ///
    /// The most recent variant is memoized so dragging unrelated sliders does
    /// not recompute it every frame.
    pub fn adjusted(&self, adjustments: &ImageAdjustments) -> Arc<Pixmap> {
        let mut cached = self.adjusted.lock();
        if let Some((key, pixmap)) = cached.as_ref() {
            if key == adjustments {
                return pixmap.clone();
            }
        }

        let mut pixmap = self.pixmap.clone();
        effects::apply_adjustments(&mut pixmap, adjustments);
        let pixmap = Arc::new(pixmap);
        *cached = Some((*adjustments, pixmap.clone()));
        pixmap
    }

    /// Memory used by the pixel data, in bytes.
    pub fn memory_size(&self) -> usize {
        self.pixmap.data().len()
    }
}

impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format)
            .finish()
    }
}

/// Decode `bytes` fetched for `key`.
pub(crate) fn decode_for(key: &str, bytes: &[u8]) -> Result<RasterImage, ResourceError> {
    RasterImage::decode(bytes).map_err(|reason| ResourceError::Decode(key.to_string(), reason))
}

/// Convert straight alpha to premultiplied alpha.
pub fn premultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageEncoder, Rgba, RgbaImage};

    /// Encode a solid-color PNG.
    pub(crate) fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_png() {
        let raster = RasterImage::decode(&solid_png(6, 3, [10, 20, 30, 255])).unwrap();
        assert_eq!(raster.size(), Size::new(6.0, 3.0));
        assert_eq!(raster.format(), Some(ImageFormat::Png));
        assert_eq!(raster.memory_size(), 6 * 3 * 4);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(RasterImage::decode(b"definitely not an image").is_err());
        let err = decode_for("bad.png", b"nope").unwrap_err();
        assert!(matches!(err, ResourceError::Decode(key, _) if key == "bad.png"));
    }

    #[test]
    fn test_from_rgba8_premultiplies() {
        let raster = RasterImage::from_rgba8(1, 1, vec![200, 100, 0, 128]).unwrap();
        let px = raster.pixmap().pixel(0, 0).unwrap();
        assert_eq!(px.alpha(), 128);
        assert_eq!(px.red(), 100);
        assert!(RasterImage::from_rgba8(2, 2, vec![0; 4]).is_err());
    }

    #[test]
    fn test_adjusted_variant_is_memoized() {
        let raster = RasterImage::from_rgba8(2, 2, [100, 100, 100, 255].repeat(4)).unwrap();
        let darker = ImageAdjustments {
            brightness: 50.0,
            ..ImageAdjustments::default()
        };
        let first = raster.adjusted(&darker);
        let second = raster.adjusted(&darker);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.pixel(0, 0).unwrap().red() < 100);
    }
}
