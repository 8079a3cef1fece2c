//! CLI command implementations.

pub mod install;
pub mod locate;
pub mod run;
pub mod send;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tracing::debug;

use crate::config::Settings;
use crate::session::{DiagnosticSink, StatusIndicator};

/// Load settings from `--config` or the default location.
pub fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let settings = Settings::load(config).context("Failed to load settings")?;
    debug!(helper_dir = ?settings.helper_dir, cli_version = %settings.cli_version, "settings loaded");
    Ok(settings)
}

/// Prints a short marker on stderr when a heartbeat starts.
#[derive(Debug)]
pub struct TerminalIndicator {
    visible: bool,
}

impl Default for TerminalIndicator {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl StatusIndicator for TerminalIndicator {
    fn set_active(&mut self, active: bool) {
        if active && self.visible {
            eprintln!("{} heartbeat", "♥".red());
        }
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// Diagnostics printed to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&mut self, message: &str) {
        eprintln!("{} {message}", "wakabeat:".yellow().bold());
    }
}
