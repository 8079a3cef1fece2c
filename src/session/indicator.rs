//! Host status indicator.

/// A host-side activity light, pulsed while a heartbeat is being sent.
pub trait StatusIndicator: Send {
    fn set_active(&mut self, active: bool);

    /// Show or hide the indicator entirely.
    fn set_visible(&mut self, _visible: bool) {}
}

/// Indicator for hosts without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn set_active(&mut self, _active: bool) {}
}
