//! Scene model for the compositing editor.
//!
//! This crate holds:
//! - The serializable scene description (layers and global properties)
//! - Layer identity
//! - The copy-on-write scene store that every edit goes through

pub mod model;
pub mod store;

pub use model::{
    BackgroundFill, BackgroundImageLayer, ClonedForeground, FontKey, ForegroundTransform, Glow,
    ImageAdjustments, Layer, LayerId, MovableObject, Placement, Position, Scene, ShapeKind, ShapeLayer,
    SourceKey, TextLayer,
};
pub use store::SceneStore;
