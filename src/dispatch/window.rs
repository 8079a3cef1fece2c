//! Per-session suppression state.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::models::{ActivityEvent, ActivityKind};

/// What was last sent, and whether a status pulse is still showing.
///
/// Owned by the dispatcher and only touched from the main context.
#[derive(Debug, Clone, Default)]
pub struct DispatchWindow {
    last_path: Option<PathBuf>,
    last_timestamp: Option<Instant>,
    in_flight: bool,
}

impl DispatchWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves always pass. Other events pass on a new path, or once
    /// `threshold` has elapsed since the last dispatch for the same path.
    pub fn should_dispatch(&self, event: &ActivityEvent, threshold: Duration) -> bool {
        if event.kind == ActivityKind::Saved {
            return true;
        }
        match (&self.last_path, self.last_timestamp) {
            (Some(path), Some(at)) if *path == event.path => {
                event.captured_at.saturating_duration_since(at) >= threshold
            }
            _ => true,
        }
    }

    /// Remember `event` as the latest dispatch.
    pub fn record(&mut self, event: &ActivityEvent) {
        self.last_path = Some(event.path.clone());
        self.last_timestamp = Some(event.captured_at);
    }

    /// Claim the status pulse. Returns `false` while an earlier pulse is still showing.
    pub fn begin_pulse(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn end_pulse(&mut self) {
        self.in_flight = false;
    }

    pub fn last_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }

    pub fn last_timestamp(&self) -> Option<Instant> {
        self.last_timestamp
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}
