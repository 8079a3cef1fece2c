//! Run command - a session fed by JSON-lines host events on stdin

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::commands::{load_settings, StderrSink, TerminalIndicator};
use crate::host::stdin::{spawn_reader, HostInput};
use crate::invoke::deadline_after;
use crate::session::{Session, StopReport};

/// How often notifications are applied while waiting for input
const PUMP_INTERVAL: Duration = Duration::from_millis(25);

pub fn execute(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let session = Session::from_settings(settings)
        .context("Failed to create session")?
        .with_indicator(Box::new(TerminalIndicator::default()))
        .with_diagnostics(Box::new(StderrSink));

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let report = serve(session, BufReader::new(io::stdin()), &interrupted)?;
    if report.invocations.killed > 0 || report.provisioning_abandoned {
        eprintln!(
            "{} forced shutdown: {} helper(s) killed",
            "!".yellow().bold(),
            report.invocations.killed
        );
    }
    Ok(())
}

/// Drive `session` from `reader` until EOF or `interrupted`.
///
/// On EOF, heartbeats already started get up to the shutdown grace period
/// to finish before the session stops. An interrupt stops at once.
pub fn serve<R>(mut session: Session, reader: R, interrupted: &AtomicBool) -> Result<StopReport>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    spawn_reader(reader, tx).context("Failed to start host input reader")?;
    session.start();

    loop {
        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted");
            return Ok(session.stop());
        }
        session.pump();

        match rx.recv_timeout(PUMP_INTERVAL) {
            Ok(HostInput::Event(event)) => {
                if let Some(id) = session.handle_host_event(event) {
                    debug!(id, "heartbeat started");
                }
            }
            Ok(HostInput::Malformed { line, error }) => {
                warn!(%line, %error, "ignoring malformed host event");
            }
            Ok(HostInput::Closed) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    debug!("host input closed");
    let grace = session.settings().read().shutdown_grace();
    let deadline = deadline_after(grace);
    while session.in_flight() > 0
        && Instant::now() < deadline
        && !interrupted.load(Ordering::SeqCst)
    {
        session.pump_for(PUMP_INTERVAL);
    }
    session.pump();
    Ok(session.stop())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::provision::test_support::{provisioner, FakeSource};
    use std::fs;
    use std::io::Cursor;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn session_with_helper(temp: &TempDir, log: &Path) -> Session {
        let provisioner = provisioner(temp.path(), Arc::new(FakeSource::default()));
        let exe = provisioner.location().executable();
        fs::write(
            &exe,
            format!("#!/bin/sh\necho \"$@\" >> '{}'\n", log.display()),
        )
        .unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        Session::new(Settings::default(), provisioner)
    }

    #[test]
    fn test_serve_processes_events_until_eof() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let session = session_with_helper(&temp, &log);
        // The helper is already on disk, so the session is subscribed
        // before the reader delivers its first line.
        let input = concat!(
            "{\"event\":\"about-to-save\",\"document\":\"/p/a.rs\"}\n",
            "not json\n",
            "{\"event\":\"about-to-save\",\"document\":\"/p/b.rs\"}\n",
        );

        let report = serve(
            session,
            Cursor::new(input.as_bytes().to_vec()),
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(report.invocations.killed, 0);
        let calls = fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 2);
        assert!(calls.contains("--entity /p/a.rs"));
        assert!(calls.contains("--entity /p/b.rs"));
    }

    #[test]
    fn test_serve_stops_when_interrupted() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let session = session_with_helper(&temp, &log);

        let report = serve(
            session,
            Cursor::new(b"{\"event\":\"about-to-save\",\"document\":\"/p/a.rs\"}\n".to_vec()),
            &AtomicBool::new(true),
        )
        .unwrap();

        assert_eq!(report, StopReport::default());
        assert!(!log.exists());
    }
}
