//! Heartbeat dispatch decisions.
//!
//! The dispatcher turns activity events into helper invocations. It never
//! runs anything itself: `on_activity` returns the invocation to issue and
//! the session hands it to the invoker, so the decision path stays
//! synchronous and cheap on the main context.

pub mod tracker;
pub mod window;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::SettingsHandle;
use crate::models::{ActivityEvent, HelperInvocation};

pub use tracker::ModificationTracker;
pub use window::DispatchWindow;

/// Whether the helper is known to be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Activity is dropped, not queued.
    NotReady,
    Armed,
}

/// Counters for what happened to received events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub dropped_not_ready: u64,
    pub excluded: u64,
    pub suppressed: u64,
    pub dispatched: u64,
}

pub struct HeartbeatDispatcher {
    settings: SettingsHandle,
    readiness: Readiness,
    helper: Option<PathBuf>,
    window: DispatchWindow,
    tracker: ModificationTracker,
    next_id: u64,
    stats: DispatchStats,
}

impl HeartbeatDispatcher {
    pub fn new(settings: SettingsHandle) -> Self {
        Self {
            settings,
            readiness: Readiness::NotReady,
            helper: None,
            window: DispatchWindow::new(),
            tracker: ModificationTracker::default(),
            next_id: 1,
            stats: DispatchStats::default(),
        }
    }

    /// Start dispatching to the helper at `executable`.
    pub fn arm(&mut self, executable: PathBuf) {
        debug!(helper = %executable.display(), "dispatcher armed");
        self.helper = Some(executable);
        self.readiness = Readiness::Armed;
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Decide whether `event` becomes a helper invocation.
    ///
    /// On dispatch the window is updated before the invocation is returned,
    /// so a burst of events cannot slip through while the helper starts.
    pub fn on_activity(&mut self, event: ActivityEvent) -> Option<HelperInvocation> {
        self.stats.received += 1;

        let helper = match (&self.readiness, &self.helper) {
            (Readiness::Armed, Some(helper)) => helper.clone(),
            _ => {
                self.stats.dropped_not_ready += 1;
                debug!(path = %event.path.display(), "dropping activity: helper not ready");
                return None;
            }
        };

        let settings = self.settings.read();
        if settings.is_excluded(&event.path) {
            self.stats.excluded += 1;
            debug!(path = %event.path.display(), "dropping activity: excluded");
            return None;
        }

        if !self.window.should_dispatch(&event, settings.debounce()) {
            self.stats.suppressed += 1;
            debug!(
                kind = event.kind.label(),
                path = %event.path.display(),
                "suppressing duplicate heartbeat"
            );
            return None;
        }

        self.window.record(&event);
        let id = self.next_id;
        self.next_id += 1;
        self.stats.dispatched += 1;

        let invocation = HelperInvocation::heartbeat(id, helper, &event, &settings);
        debug!(
            id,
            kind = event.kind.label(),
            path = %event.path.display(),
            "dispatching heartbeat"
        );
        Some(invocation)
    }

    /// Attribute text changes to `path` from now on.
    pub fn attach_tracking(&mut self, path: &Path) {
        if self.tracker.attach(path) {
            debug!(path = %path.display(), "tracking text changes");
        }
    }

    pub fn detach_tracking(&mut self) {
        if let Some(path) = self.tracker.detach() {
            debug!(path = %path.display(), "stopped tracking text changes");
        }
    }

    pub fn tracked_path(&self) -> Option<&Path> {
        self.tracker.current()
    }

    pub fn window(&self) -> &DispatchWindow {
        &self.window
    }

    pub(crate) fn window_mut(&mut self) -> &mut DispatchWindow {
        &mut self.window
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}
