//! Rendering primitives for the compositing editor.
//!
//! This crate handles:
//! - The pixel surface layers are drawn into
//! - Raster decoding and the resource cache
//! - Font loading and single-line text rasterization
//! - Shape templates, color adjustments and glow

pub mod effects;
pub mod error;
pub mod font;
pub mod notify;
pub mod raster;
pub mod resources;
pub mod shapes;
pub mod surface;
pub mod text;

pub use error::{DrawError, ResourceError};
pub use font::LoadedFont;
pub use notify::{default_notifier, CollectingNotifier, Failure, FailureKind, Notifier, ReportOnce, TracingNotifier};
pub use raster::RasterImage;
pub use resources::{BlobStore, DefaultFetcher, FontReady, RasterHandle, RasterState, ResourceCache, SourceFetcher};
pub use shapes::shape_path;
pub use surface::Surface;
pub use text::{rasterize_line, TextRaster, MAX_TEXT_PIXELS};
