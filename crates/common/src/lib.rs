//! Common utilities and types shared by the compositing engine crates.

pub mod color;
pub mod geometry;
pub mod error;

pub use color::Color;
pub use geometry::{Point, Size, Rect, Transform};
pub use error::{EditorError, EditorResult};
