//! Helper invocation requests and their outcomes.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Settings;
use crate::error::InvocationError;
use crate::models::event::ActivityEvent;

/// An immutable request to run the helper once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperInvocation {
    id: u64,
    executable: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    entity: PathBuf,
    is_write: bool,
}

impl HelperInvocation {
    pub fn new(id: u64, executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            id,
            executable: executable.into(),
            args,
            working_dir: None,
            entity: PathBuf::new(),
            is_write: false,
        }
    }

    /// Build the heartbeat command line for an activity event.
    ///
    /// Settings are read once here; later changes never alter an issued invocation.
    pub fn heartbeat(
        id: u64,
        executable: impl Into<PathBuf>,
        event: &ActivityEvent,
        settings: &Settings,
    ) -> Self {
        let entity = event.path.to_string_lossy().into_owned();
        let mut args = vec![
            "--entity".to_string(),
            entity,
            "--time".to_string(),
            format_heartbeat_time(&event.wall_time),
            "--plugin".to_string(),
            settings.plugin_identifier(),
        ];
        if event.is_write() {
            args.push("--write".to_string());
        }
        match (&settings.helper_config, settings.api_key.as_deref()) {
            (Some(config), _) => {
                args.push("--config".to_string());
                args.push(config.to_string_lossy().into_owned());
            }
            (None, Some(key)) if !key.is_empty() => {
                args.push("--key".to_string());
                args.push(key.to_string());
            }
            (None, _) => {}
        }

        Self {
            id,
            executable: executable.into(),
            args,
            working_dir: event.path.parent().map(Path::to_path_buf),
            entity: event.path.clone(),
            is_write: event.is_write(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn entity(&self) -> &Path {
        &self.entity
    }

    pub fn is_write(&self) -> bool {
        self.is_write
    }

    /// Shell-quoted command line for logs, with the API key masked.
    pub fn command_line(&self) -> String {
        let mut parts = vec![shell_escape::escape(self.executable.to_string_lossy())];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push(Cow::Borrowed("********"));
                mask_next = false;
                continue;
            }
            mask_next = arg == "--key";
            parts.push(shell_escape::escape(Cow::Borrowed(arg.as_str())));
        }
        parts.join(" ")
    }
}

/// Seconds since the epoch with millisecond precision, the helper's `--time` format.
pub fn format_heartbeat_time(time: &DateTime<Utc>) -> String {
    format!("{}.{:03}", time.timestamp(), time.timestamp_subsec_millis())
}

/// What happened when the helper ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub id: u64,
    pub entity: PathBuf,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub result: Result<(), InvocationError>,
}

impl InvocationOutcome {
    pub(crate) fn failed(
        invocation: &HelperInvocation,
        error: InvocationError,
        duration: Duration,
    ) -> Self {
        Self {
            id: invocation.id(),
            entity: invocation.entity().to_path_buf(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
