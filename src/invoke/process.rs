//! PID-level process utilities used when a worker misses the shutdown grace period.

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Check if a process with the given PID is alive.
///
/// Sends the null signal: `EPERM` means it exists but belongs to someone
/// else, `ESRCH` means it does not exist.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(pid_i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => false,
    }
}

/// Send SIGKILL to `pid` if it is still alive. Returns whether a signal was delivered.
#[cfg(unix)]
pub fn force_kill(pid: u32) -> bool {
    if pid == 0 || !is_process_alive(pid) {
        return false;
    }
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(pid_i32), Signal::SIGKILL).is_ok()
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

// Workers on non-unix targets own their `Child` and kill it on cancel.
#[cfg(not(unix))]
pub fn force_kill(_pid: u32) -> bool {
    false
}
