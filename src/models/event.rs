//! Activity observed in the editor.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What kind of editor action produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    /// An editor gained focus on a document.
    FocusChanged,
    /// A document is about to be written to disk.
    Saved,
    /// The focused document's text changed.
    TextModified,
}

impl ActivityKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::FocusChanged => "focus",
            Self::Saved => "save",
            Self::TextModified => "edit",
        }
    }
}

/// One observed editor action, consumed immediately by the dispatcher.
///
/// `captured_at` drives throttling; `wall_time` is what the helper reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub path: PathBuf,
    pub captured_at: Instant,
    pub wall_time: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, path: impl Into<PathBuf>) -> Self {
        Self::at(kind, path, Instant::now())
    }

    /// Build an event with an explicit capture instant.
    pub fn at(kind: ActivityKind, path: impl Into<PathBuf>, captured_at: Instant) -> Self {
        Self {
            kind,
            path: path.into(),
            captured_at,
            wall_time: Utc::now(),
        }
    }

    pub fn focus_changed(path: impl Into<PathBuf>) -> Self {
        Self::new(ActivityKind::FocusChanged, path)
    }

    pub fn saved(path: impl Into<PathBuf>) -> Self {
        Self::new(ActivityKind::Saved, path)
    }

    pub fn text_modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ActivityKind::TextModified, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves are reported to the helper with `--write`.
    pub fn is_write(&self) -> bool {
        self.kind == ActivityKind::Saved
    }
}
