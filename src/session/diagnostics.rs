//! User-visible diagnostic messages.
//!
//! Diagnostics are separate from tracing logs: they are what the host shows
//! the user. Most are gated on the `diagnostics` setting; provisioning
//! failure is always shown.

use tracing::info;

use crate::config::SettingsHandle;

pub trait DiagnosticSink: Send {
    fn emit(&mut self, message: &str);
}

/// Sink that forwards diagnostics to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&mut self, message: &str) {
        info!(target: "wakabeat::diagnostic", "{message}");
    }
}

/// Routes messages to the sink according to the current settings.
pub struct Diagnostics {
    sink: Box<dyn DiagnosticSink>,
    settings: SettingsHandle,
}

impl Diagnostics {
    pub fn new(sink: Box<dyn DiagnosticSink>, settings: SettingsHandle) -> Self {
        Self { sink, settings }
    }

    /// Emit only when diagnostics are enabled.
    pub fn debug(&mut self, message: &str) {
        if self.settings.read().diagnostics {
            self.sink.emit(message);
        }
    }

    /// Emit regardless of settings.
    pub fn always(&mut self, message: &str) {
        self.sink.emit(message);
    }

    pub(crate) fn replace_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = sink;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<String>>>);

    impl DiagnosticSink for Collect {
        fn emit(&mut self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_debug_respects_setting() {
        let sink = Collect::default();
        let settings = SettingsHandle::new(Settings::default());
        let mut diagnostics = Diagnostics::new(Box::new(sink.clone()), settings.clone());

        diagnostics.debug("hidden");
        settings.replace(Settings {
            diagnostics: true,
            ..Settings::default()
        });
        diagnostics.debug("shown");

        assert_eq!(*sink.0.lock().unwrap(), vec!["shown".to_string()]);
    }

    #[test]
    fn test_always_ignores_setting() {
        let sink = Collect::default();
        let mut diagnostics =
            Diagnostics::new(Box::new(sink.clone()), SettingsHandle::new(Settings::default()));

        diagnostics.always("helper unavailable");

        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }
}
