//! User-visible failure notifications.
//!
//! Recovered failures (a layer that could not be drawn, a font that fell back)
//! are not returned to the caller; they are pushed through a [`Notifier`] side
//! channel, typically a toast in an interactive front end.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// What went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A raster failed to load or decode.
    Resource,
    /// A font could not be loaded and a substitute is used.
    FontFallback,
    /// One layer's draw call failed.
    Draw,
    /// Export could not complete.
    Export,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Resource => "resource",
            FailureKind::FontFallback => "font",
            FailureKind::Draw => "draw",
            FailureKind::Export => "export",
        })
    }
}

/// A reported failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Identity of the failure, used for de-duplication.
    pub key: String,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn resource(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Resource, key, message)
    }

    pub fn font(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::FontFallback, key, message)
    }

    pub fn draw(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Draw, key, message)
    }

    pub fn export(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Export, key, message)
    }
}

/// Receives user-visible failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, failure: &Failure);
}

/// Logs failures as warnings.
#[derive(Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, failure: &Failure) {
        warn!(kind = %failure.kind, key = %failure.key, "{}", failure.message);
    }
}

/// Forwards each distinct failure once.
pub struct ReportOnce<N> {
    inner: N,
    seen: Mutex<HashSet<(FailureKind, String)>>,
}

impl<N: Notifier> ReportOnce<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Forget what has been reported, e.g. after the scene was reset.
    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }
}

impl<N: Notifier> Notifier for ReportOnce<N> {
    fn notify(&self, failure: &Failure) {
        let first = self.seen.lock().insert((failure.kind, failure.key.clone()));
        if first {
            self.inner.notify(failure);
        }
    }
}

/// Keeps every failure in memory.
#[derive(Default)]
pub struct CollectingNotifier {
    failures: Mutex<Vec<Failure>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<Failure> {
        self.failures.lock().clone()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.failures.lock().iter().filter(|f| f.kind == kind).count()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, failure: &Failure) {
        self.failures.lock().push(failure.clone());
    }
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, failure: &Failure) {
        (**self).notify(failure)
    }
}

/// The notifier used when none is supplied.
pub fn default_notifier() -> Arc<dyn Notifier> {
    Arc::new(ReportOnce::new(TracingNotifier))
}
