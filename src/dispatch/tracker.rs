//! Which document text-change notifications are attributed to.

use std::path::{Path, PathBuf};

/// Text-change tracking for the focused editor.
///
/// Attaching the same path twice, or detaching when nothing is attached, is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ModificationTracker {
    attached: Option<PathBuf>,
}

impl ModificationTracker {
    /// Track `path`, replacing any previous attachment.
    /// Returns `true` if the tracked path changed.
    pub fn attach(&mut self, path: &Path) -> bool {
        if self.attached.as_deref() == Some(path) {
            return false;
        }
        self.attached = Some(path.to_path_buf());
        true
    }

    /// Stop tracking. Returns the path that was tracked, if any.
    pub fn detach(&mut self) -> Option<PathBuf> {
        self.attached.take()
    }

    pub fn current(&self) -> Option<&Path> {
        self.attached.as_deref()
    }
}
