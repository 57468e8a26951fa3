//! Render and resource errors.

use common::error::EditorError;
use thiserror::Error;

/// A raster or font could not be loaded.
///
/// Failures are terminal for their source key, so the error is cloned into
/// every reader of that key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Fetch failed for {0}: {1}")]
    Fetch(String, String),

    #[error("Decode failed for {0}: {1}")]
    Decode(String, String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("Font unavailable: {0}")]
    FontUnavailable(String),

    #[error("Timed out loading {0}")]
    Timeout(String),
}

/// A single layer could not be drawn.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrawError {
    #[error("Degenerate path for {0}")]
    DegeneratePath(String),

    #[error("Cannot allocate {width}x{height} surface")]
    SurfaceAllocation { width: u32, height: u32 },

    #[error("No font available for {0}")]
    NoFont(String),

    #[error("Missing glyphs {glyphs:?} in {font}")]
    MissingGlyphs { font: String, glyphs: String },
}

impl DrawError {
    pub fn allocation(width: u32, height: u32) -> Self {
        Self::SurfaceAllocation { width, height }
    }
}

impl From<ResourceError> for EditorError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Decode(..) => EditorError::decode(err.to_string()),
            ResourceError::Timeout(..) => EditorError::timeout(err.to_string()),
            _ => EditorError::resource(err.to_string()),
        }
    }
}

impl From<DrawError> for EditorError {
    fn from(err: DrawError) -> Self {
        EditorError::draw(err.to_string())
    }
}
