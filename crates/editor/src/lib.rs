//! Layerforge editor - ties the scene, the resource cache and the compositor
//! into an editing session with a live preview and PNG export.

pub mod config;
pub mod preview;
pub mod session;

pub use config::EditorConfig;
pub use preview::{PreviewLoop, PreviewStats};
pub use session::EditorSession;

/// Editor version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
