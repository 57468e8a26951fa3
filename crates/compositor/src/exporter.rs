//! Full-resolution export to PNG.

use crate::compositor::{Compositor, RenderOptions, RenderOutcome};
use chrono::{DateTime, Utc};
use common::error::EditorError;
use common::geometry::Size;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use render::{DrawError, Failure, RasterState, ResourceCache, Surface};
use scene::{Scene, SourceKey};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PRODUCT: &str = "layerforge";

/// Export failure. Returned to the caller; the scene is untouched, so the
/// export can be retried.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Required image not available: {0}")]
    MissingResource(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render failed: {0}")]
    Render(#[from] DrawError),

    #[error("Nothing to export: {0}")]
    EmptyScene(String),
}

impl From<ExportError> for EditorError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(e) => EditorError::Io(e),
            other => EditorError::export(other.to_string()),
        }
    }
}

/// How big the exported image is.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ExportSizing {
    /// Native size of the photo: background, else foreground, else the
    /// preview size.
    #[default]
    Native,
    /// Preview size times a factor.
    Scale(f32),
    Exact { width: u32, height: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportRequest {
    /// Size the scene was composed at; preview-pixel attributes scale from it.
    pub preview_size: Size,
    pub sizing: ExportSizing,
    /// File name prefix.
    pub product: String,
}

impl ExportRequest {
    pub fn new(preview_size: Size) -> Self {
        Self {
            preview_size,
            sizing: ExportSizing::Native,
            product: DEFAULT_PRODUCT.to_string(),
        }
    }

    pub fn with_sizing(mut self, sizing: ExportSizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }
}

/// An encoded export, ready to be saved.
#[derive(Clone, Debug)]
pub struct ExportedImage {
    pub width: u32,
    pub height: u32,
    /// PNG bytes.
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl ExportedImage {
    /// Write the image into `dir`, creating it if needed.
    pub async fn save_into(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        info!(path = %path.display(), bytes = self.bytes.len(), "export saved");
        Ok(path)
    }
}

/// Renders scenes offscreen at output resolution.
#[derive(Default)]
pub struct Exporter {
    compositor: Compositor,
    attempts: AtomicU64,
}

impl Exporter {
    pub fn new(compositor: Compositor) -> Self {
        Self {
            compositor,
            attempts: AtomicU64::new(0),
        }
    }

    /// Wait for every raster and font the scene uses, then render and encode.
    ///
    /// Failures are also pushed to the cache's notifier.
    pub async fn export(
        &self,
        scene: &Scene,
        resources: &ResourceCache,
        request: &ExportRequest,
    ) -> Result<ExportedImage, ExportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let result = self.run(scene, resources, request).await;
        if let Err(err) = &result {
            warn!(attempt, error = %err, "export failed");
            resources
                .notifier()
                .notify(&Failure::export(format!("export#{}", attempt), err.to_string()));
        }
        result
    }

    async fn run(
        &self,
        scene: &Scene,
        resources: &ResourceCache,
        request: &ExportRequest,
    ) -> Result<ExportedImage, ExportError> {
        resources.ensure_rasters(scene).await;
        resources.ensure_fonts(scene).await;

        let (width, height) = output_size(scene, resources, request)?;
        let pixel_scale = width as f32 / request.preview_size.width;
        let mut surface = Surface::new(width, height)?;

        let options = RenderOptions::export(pixel_scale);
        match self.compositor.render(scene, resources, &mut surface, &options) {
            RenderOutcome::Drawn(stats) => {
                info!(width, height, pixel_scale, drawn = stats.drawn, skipped = stats.skipped, "export rendered");
            }
            RenderOutcome::Deferred { waiting_on } => {
                let keys: Vec<String> = waiting_on.iter().map(SourceKey::to_string).collect();
                return Err(ExportError::MissingResource(keys.join(", ")));
            }
        }

        let rgba = surface.to_rgba8();
        let bytes = tokio::task::spawn_blocking(move || encode_png(width, height, &rgba))
            .await
            .map_err(|e| ExportError::Encode(e.to_string()))??;

        Ok(ExportedImage {
            width,
            height,
            bytes,
            file_name: export_file_name(&request.product, Utc::now()),
        })
    }
}

/// Pixel size of the export.
fn output_size(scene: &Scene, resources: &ResourceCache, request: &ExportRequest) -> Result<(u32, u32), ExportError> {
    let preview = request.preview_size;
    if preview.is_empty() || !preview.width.is_finite() || !preview.height.is_finite() {
        return Err(ExportError::EmptyScene(format!(
            "preview size {}x{}",
            preview.width, preview.height
        )));
    }

    let (width, height) = match request.sizing {
        ExportSizing::Exact { width, height } => (width, height),
        ExportSizing::Scale(factor) => (
            (preview.width * factor).round() as u32,
            (preview.height * factor).round() as u32,
        ),
        ExportSizing::Native => [scene.background_photo.as_ref(), scene.foreground_photo.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|key| match resources.raster_state(key) {
                RasterState::Ready(raster) => Some((raster.width(), raster.height())),
                _ => None,
            })
            .unwrap_or((preview.width.round() as u32, preview.height.round() as u32)),
    };

    if width == 0 || height == 0 {
        return Err(ExportError::EmptyScene(format!("export size {}x{}", width, height)));
    }
    Ok((width, height))
}

/// Lossless PNG at the strongest compression.
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, FilterType::Adaptive)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// `<product>_<YYYYMMDD_HHMMSS_mmm>.png`, UTC.
pub fn export_file_name(product: &str, at: DateTime<Utc>) -> String {
    let product: String = product
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let product = if product.is_empty() { DEFAULT_PRODUCT.to_string() } else { product };
    format!("{}_{}.png", product, at.format("%Y%m%d_%H%M%S_%3f"))
}
