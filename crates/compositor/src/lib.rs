//! Scene compositing for the editor.
//!
//! This crate handles:
//! - Flattening a scene into a surface in a fixed layer order
//! - Scheduling preview frames so edits coalesce
//! - Full-resolution PNG export

pub mod compositor;
pub mod exporter;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use self::compositor::{CheckerStyle, Compositor, RenderOptions, RenderOutcome, RenderPurpose, RenderStats};
pub use exporter::{ExportError, ExportRequest, ExportSizing, ExportedImage, Exporter};
pub use render::{CollectingNotifier, Failure, FailureKind, Notifier, ReportOnce, TracingNotifier};
pub use scheduler::{FrameRun, FrameTicket, RenderScheduler, SchedulerState, SchedulerStats};
