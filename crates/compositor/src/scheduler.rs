//! Coalesces scene invalidations into frames.
//!
//! ```text
//! Idle --invalidate--> Scheduled --run_frame--> Rendering --> Idle
//!                          ^                        |
//!                          +---- invalidated -------+
//! ```
//!
//! Any number of invalidations while a frame is scheduled collapse into that
//! frame. An invalidation during a render schedules exactly one follow-up.

use parking_lot::Mutex;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Rendering,
    /// Owner is gone; nothing renders any more.
    TornDown,
}

/// Permission to run one frame. Tickets from an older generation are stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameTicket {
    generation: u64,
}

impl FrameTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub frames_rendered: u64,
    /// Invalidations folded into an already scheduled frame.
    pub invalidations_absorbed: u64,
    pub stale_tickets: u64,
    /// Frames whose render closure unwound.
    pub aborted_frames: u64,
}

/// Result of [`RenderScheduler::run_frame`].
#[derive(Debug, PartialEq)]
pub enum FrameRun<T> {
    /// The ticket was stale; nothing ran.
    Stale,
    Rendered {
        output: T,
        /// Set when the scene changed during the render.
        follow_up: Option<FrameTicket>,
    },
}

impl<T> FrameRun<T> {
    pub fn follow_up(&self) -> Option<FrameTicket> {
        match self {
            FrameRun::Rendered { follow_up, .. } => *follow_up,
            FrameRun::Stale => None,
        }
    }
}

struct Inner {
    state: SchedulerState,
    generation: u64,
    /// Invalidated while rendering.
    dirty: bool,
    stats: SchedulerStats,
}

impl Inner {
    fn schedule(&mut self) -> FrameTicket {
        self.generation += 1;
        self.state = SchedulerState::Scheduled;
        FrameTicket {
            generation: self.generation,
        }
    }
}

/// Frame scheduler. At most one render is in flight.
pub struct RenderScheduler {
    inner: Mutex<Inner>,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SchedulerState::Idle,
                generation: 0,
                dirty: false,
                stats: SchedulerStats::default(),
            }),
        }
    }

    /// Mark the scene as changed.
    ///
    /// Returns a ticket only when a new frame has to be requested; the
    /// caller must then eventually pass it to [`run_frame`](Self::run_frame).
    pub fn invalidate(&self) -> Option<FrameTicket> {
        let mut inner = self.inner.lock();
        match inner.state {
            SchedulerState::Idle => Some(inner.schedule()),
            SchedulerState::Scheduled => {
                inner.stats.invalidations_absorbed += 1;
                None
            }
            SchedulerState::Rendering => {
                if inner.dirty {
                    inner.stats.invalidations_absorbed += 1;
                }
                inner.dirty = true;
                None
            }
            SchedulerState::TornDown => None,
        }
    }

    /// Run the frame `ticket` stands for.
    ///
    /// `render` is called at most once and should read the latest scene
    /// snapshot itself. The scheduler leaves the rendering state even if
    /// `render` unwinds.
    pub fn run_frame<T>(&self, ticket: FrameTicket, render: impl FnOnce() -> T) -> FrameRun<T> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SchedulerState::Scheduled || ticket.generation != inner.generation {
                inner.stats.stale_tickets += 1;
                debug!(ticket = ticket.generation, current = inner.generation, "ignoring stale frame ticket");
                return FrameRun::Stale;
            }
            inner.state = SchedulerState::Rendering;
            inner.dirty = false;
        }

        let guard = RenderingGuard { scheduler: self };
        let output = render();
        std::mem::forget(guard);

        let mut inner = self.inner.lock();
        inner.stats.frames_rendered += 1;
        let follow_up = match inner.state {
            SchedulerState::Rendering if inner.dirty => {
                inner.dirty = false;
                Some(inner.schedule())
            }
            SchedulerState::Rendering => {
                inner.state = SchedulerState::Idle;
                None
            }
            // Torn down mid-render.
            _ => None,
        };
        FrameRun::Rendered { output, follow_up }
    }

    /// Stop scheduling. Outstanding tickets become stale.
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        inner.state = SchedulerState::TornDown;
        inner.generation += 1;
        inner.dirty = false;
        debug!("render scheduler torn down");
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    pub fn is_torn_down(&self) -> bool {
        self.state() == SchedulerState::TornDown
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.lock().stats
    }
}

/// Leaves the rendering state when a render closure unwinds.
struct RenderingGuard<'a> {
    scheduler: &'a RenderScheduler,
}

impl Drop for RenderingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.scheduler.inner.lock();
        inner.stats.aborted_frames += 1;
        if inner.state == SchedulerState::Rendering {
            // Without a ticket holder the follow-up could never run, so the
            // next invalidation starts over.
            inner.state = SchedulerState::Idle;
            inner.dirty = false;
        }
    }
}
