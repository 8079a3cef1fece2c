//! Low-level helper execution: spawn, drain pipes, bounded wait.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

use crate::error::InvocationError;
use crate::models::{HelperInvocation, InvocationOutcome};

/// Timeout for collecting output from child process pipes
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum captured output per stream (1MB)
pub(crate) const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How often the wait loop checks the cancel flag
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Stderr kept in a `NonZeroExit` message
const STDERR_SUMMARY_CHARS: usize = 500;

enum WaitResult {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Run the helper to completion, blocking the calling thread.
///
/// `on_spawn` receives the child's PID as soon as it exists. The child is
/// killed and reaped on timeout or when `cancel` is raised.
pub(crate) fn run_helper(
    invocation: &HelperInvocation,
    timeout: Duration,
    cancel: &AtomicBool,
    on_spawn: impl FnOnce(u32),
) -> InvocationOutcome {
    let start = Instant::now();

    let mut child = match spawn_helper(invocation) {
        Ok(child) => child,
        Err(e) => {
            return InvocationOutcome::failed(
                invocation,
                InvocationError::SpawnFailure(format!(
                    "{}: {e}",
                    invocation.executable().display()
                )),
                start.elapsed(),
            );
        }
    };
    on_spawn(child.id());

    // Drain pipes before waiting; a full pipe buffer would block the child.
    let stdout_rx = drain_in_background(child.stdout.take());
    let stderr_rx = drain_in_background(child.stderr.take());

    let waited = wait_with_cancel(&mut child, timeout, cancel);
    if !matches!(waited, Ok(WaitResult::Exited(_))) {
        kill_child_process(&mut child);
    }

    let stdout = stdout_rx
        .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
        .unwrap_or_else(|_| "[output collection timed out]".to_string());
    let stderr = stderr_rx
        .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
        .unwrap_or_else(|_| "[output collection timed out]".to_string());

    let (exit_code, result) = match waited {
        Ok(WaitResult::Exited(status)) if status.success() => (status.code(), Ok(())),
        Ok(WaitResult::Exited(status)) => (
            status.code(),
            Err(InvocationError::NonZeroExit {
                code: status.code(),
                stderr: summarize(&stderr, STDERR_SUMMARY_CHARS),
            }),
        ),
        Ok(WaitResult::TimedOut) => (None, Err(InvocationError::Timeout(timeout))),
        Ok(WaitResult::Cancelled) => (None, Err(InvocationError::Cancelled)),
        Err(e) => (
            None,
            Err(InvocationError::SpawnFailure(format!("failed to wait for helper: {e}"))),
        ),
    };

    InvocationOutcome {
        id: invocation.id(),
        entity: invocation.entity().to_path_buf(),
        exit_code,
        stdout,
        stderr,
        duration: start.elapsed(),
        result,
    }
}

/// Spawn the helper with no stdin and piped output.
///
/// Runs in the invocation's working directory when that directory exists.
fn spawn_helper(invocation: &HelperInvocation) -> std::io::Result<Child> {
    let mut cmd = Command::new(invocation.executable());
    cmd.args(invocation.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = invocation.working_dir().filter(|d| d.is_dir()) {
        cmd.current_dir(dir);
    }

    cmd.spawn()
}

fn drain_in_background<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    match stream {
        Some(stream) => {
            thread::spawn(move || {
                let _ = tx.send(read_stream_to_string(stream));
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}

fn wait_with_cancel(
    child: &mut Child,
    timeout: Duration,
    cancel: &AtomicBool,
) -> std::io::Result<WaitResult> {
    let deadline = super::deadline_after(timeout);
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(WaitResult::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(WaitResult::TimedOut);
        }
        if let Some(status) = child.wait_timeout(remaining.min(WAIT_SLICE))? {
            return Ok(WaitResult::Exited(status));
        }
    }
}

/// Read a stream to string, capped at `MAX_OUTPUT_SIZE`.
///
/// Past the cap the rest is drained and discarded so the child never
/// blocks on a full pipe.
fn read_stream_to_string<R: Read>(mut stream: R) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let remaining = MAX_OUTPUT_SIZE.saturating_sub(buf.len());
                let to_copy = n.min(remaining);
                buf.extend_from_slice(&chunk[..to_copy]);
                if to_copy < n {
                    let mut discard = [0u8; 8192];
                    while stream.read(&mut discard).unwrap_or(0) > 0 {}
                    buf.extend_from_slice(b"\n[output truncated at 1MB]");
                    break;
                }
            }
            Err(_) => {
                if buf.is_empty() {
                    return "[error reading output]".to_string();
                }
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

/// Keep the last `max_chars` characters of trimmed output.
fn summarize(output: &str, max_chars: usize) -> String {
    let trimmed = output.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - max_chars).collect();
    format!("...{tail}")
}

/// Kill and reap. Errors are ignored since the process may have already exited.
fn kill_child_process(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
