//! Editor configuration.

use common::geometry::Size;
use compositor::{CheckerStyle, ExportSizing};
use std::path::PathBuf;
use std::time::Duration;

/// Editor configuration.
#[derive(Clone, Debug)]
pub struct EditorConfig {
    /// Box the preview is fitted into, in pixels.
    pub preview_width: u32,
    pub preview_height: u32,
    /// Minimum time between preview frames.
    pub frame_interval: Duration,
    /// Time a font gets to load before the fallback is used.
    pub font_timeout: Duration,
    /// Prefix of exported file names.
    pub product_name: String,
    /// Where exports are saved.
    pub downloads_dir: PathBuf,
    /// Transparency checkerboard cell size in preview pixels.
    pub checker_cell: f32,
    pub export_sizing: ExportSizing,
}

impl EditorConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preview_size(mut self, width: u32, height: u32) -> Self {
        self.preview_width = width;
        self.preview_height = height;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_font_timeout(mut self, timeout: Duration) -> Self {
        self.font_timeout = timeout;
        self
    }

    pub fn with_product_name(mut self, name: &str) -> Self {
        self.product_name = name.to_string();
        self
    }

    pub fn with_downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = dir.into();
        self
    }

    pub fn with_checker_cell(mut self, cell: f32) -> Self {
        self.checker_cell = cell;
        self
    }

    pub fn with_export_sizing(mut self, sizing: ExportSizing) -> Self {
        self.export_sizing = sizing;
        self
    }

    pub fn preview_box(&self) -> Size {
        Size::new(self.preview_width as f32, self.preview_height as f32)
    }

    pub fn checker_style(&self) -> CheckerStyle {
        CheckerStyle {
            cell: self.checker_cell,
            ..CheckerStyle::default()
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            preview_width: 800,
            preview_height: 600,
            frame_interval: Duration::from_millis(16),
            font_timeout: render::resources::DEFAULT_FONT_TIMEOUT,
            product_name: compositor::exporter::DEFAULT_PRODUCT.to_string(),
            downloads_dir: default_downloads_dir(),
            checker_cell: 10.0,
            export_sizing: ExportSizing::Native,
        }
    }
}

fn default_downloads_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.preview_box(), Size::new(800.0, 600.0));
        assert_eq!(config.product_name, "layerforge");
        assert_eq!(config.export_sizing, ExportSizing::Native);
        assert_eq!(config.checker_style().cell, 10.0);
    }

    #[test]
    fn test_builders() {
        let config = EditorConfig::new()
            .with_preview_size(400, 300)
            .with_frame_interval(Duration::from_millis(5))
            .with_product_name("poster")
            .with_downloads_dir("/tmp/exports")
            .with_checker_cell(8.0)
            .with_export_sizing(ExportSizing::Scale(3.0));

        assert_eq!(config.preview_box(), Size::new(400.0, 300.0));
        assert_eq!(config.frame_interval, Duration::from_millis(5));
        assert_eq!(config.product_name, "poster");
        assert_eq!(config.downloads_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(config.checker_style().cell, 8.0);
        assert_eq!(config.export_sizing, ExportSizing::Scale(3.0));
    }
}
