//! Preview loop - turns frame requests into rendered frames.

use compositor::{FrameRun, RenderOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::session::EditorSession;

/// Counters kept by a [`PreviewLoop`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PreviewStats {
    pub frames: u64,
    /// Frames that left the surface untouched while rasters loaded.
    pub deferred: u64,
    pub stale: u64,
    /// Wall time of the last rendered frame.
    pub last_frame_time: Duration,
}

impl PreviewStats {
    /// Frames per second the last frame would allow.
    pub fn fps(&self) -> f64 {
        let secs = self.last_frame_time.as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }
}

/// Renders at most one preview frame per interval, and only when something
/// changed: an edit, or a raster or font finishing its load.
pub struct PreviewLoop {
    session: Arc<EditorSession>,
    interval: Duration,
}

impl PreviewLoop {
    pub fn new(session: Arc<EditorSession>) -> Self {
        let interval = session.config().frame_interval;
        Self { session, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run on the current runtime until the session is torn down.
    pub fn spawn(self) -> JoinHandle<PreviewStats> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> PreviewStats {
        let session = self.session;
        let mut shutdown = session.shutdown_signal();
        let mut ready = session.resources().ready_events();
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = PreviewStats::default();

        debug!(interval_ms = self.interval.as_millis() as u64, "preview loop started");
        while !*shutdown.borrow() {
            tokio::select! {
                _ = session.frame_requested() => {}
                changed = ready.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Deferred frames and fallback text need another pass.
                    session.invalidate();
                    continue;
                }
                _ = shutdown.changed() => continue,
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => continue,
            }

            let Some(ticket) = session.take_frame_ticket() else {
                continue;
            };
            let started = Instant::now();
            match session.render_frame(ticket) {
                FrameRun::Stale => stats.stale += 1,
                FrameRun::Rendered { output, .. } => {
                    stats.frames += 1;
                    stats.last_frame_time = started.elapsed();
                    if let RenderOutcome::Deferred { waiting_on } = &output {
                        stats.deferred += 1;
                        trace!(waiting = waiting_on.len(), "preview deferred");
                    }
                }
            }
        }
        debug!(frames = stats.frames, deferred = stats.deferred, "preview loop stopped");
        stats
    }
}
