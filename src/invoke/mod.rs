//! Running the helper off the main context.
//!
//! Each invocation gets its own worker thread so a slow helper never delays
//! the next one. Workers report back through the completion callback given
//! at construction; the session wires that to its notification channel.

pub(crate) mod executor;
pub mod process;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::InvocationError;
use crate::models::{HelperInvocation, InvocationOutcome};

type CompletionFn = dyn Fn(InvocationOutcome) + Send + Sync;

/// Poll interval while waiting for workers during shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Longest wait used when a requested deadline cannot be represented
const FALLBACK_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// What `shutdown` had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that finished within the grace period.
    pub completed: usize,
    /// Workers still running at the deadline, detached.
    pub abandoned: usize,
    /// Helper processes sent SIGKILL after the deadline.
    pub killed: usize,
}

struct Worker {
    id: u64,
    handle: JoinHandle<()>,
}

pub struct ProcessInvoker {
    cancel: Arc<AtomicBool>,
    on_complete: Arc<CompletionFn>,
    workers: Vec<Worker>,
    // invocation id -> helper pid, for workers that have a live child
    children: Arc<Mutex<HashMap<u64, u32>>>,
}

impl ProcessInvoker {
    pub fn new<F>(cancel: Arc<AtomicBool>, on_complete: F) -> Self
    where
        F: Fn(InvocationOutcome) + Send + Sync + 'static,
    {
        Self {
            cancel,
            on_complete: Arc::new(on_complete),
            workers: Vec::new(),
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start `invocation` on a new worker thread. Never blocks on the helper.
    pub fn invoke(&mut self, invocation: HelperInvocation, timeout: Duration) {
        self.reap();

        let id = invocation.id();
        if self.cancel.load(Ordering::Relaxed) {
            (self.on_complete)(InvocationOutcome::failed(
                &invocation,
                InvocationError::Cancelled,
                Duration::ZERO,
            ));
            return;
        }

        debug!(id, command = %invocation.command_line(), "invoking helper");

        let cancel = Arc::clone(&self.cancel);
        let on_complete = Arc::clone(&self.on_complete);
        let children = Arc::clone(&self.children);
        // Kept so a failed thread spawn can still report against the invocation.
        let fallback = invocation.clone();

        let spawned = thread::Builder::new()
            .name(format!("wakabeat-invoke-{id}"))
            .spawn(move || {
                let outcome = executor::run_helper(&invocation, timeout, &cancel, |pid| {
                    lock(&children).insert(id, pid);
                });
                lock(&children).remove(&id);
                log_outcome(&outcome);
                on_complete(outcome);
            });

        match spawned {
            Ok(handle) => self.workers.push(Worker { id, handle }),
            Err(e) => {
                warn!(id, error = %e, "failed to start invocation worker");
                (self.on_complete)(InvocationOutcome::failed(
                    &fallback,
                    InvocationError::SpawnFailure(format!("failed to start worker thread: {e}")),
                    Duration::ZERO,
                ));
            }
        }
    }

    /// Invocations whose worker has not finished yet.
    pub fn in_flight(&mut self) -> usize {
        self.reap();
        self.workers.len()
    }

    /// Cancel everything, wait up to `grace`, then kill what is left.
    ///
    /// Workers notice the cancel flag within one wait slice and kill their
    /// own child. Any helper still alive at the deadline gets SIGKILL and its
    /// worker thread is detached.
    pub fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        self.cancel.store(true, Ordering::Relaxed);

        let mut report = ShutdownReport::default();
        let deadline = deadline_after(grace);
        loop {
            report.completed += self.reap();
            if self.workers.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_POLL);
        }

        if self.workers.is_empty() {
            return report;
        }

        let remaining: Vec<Worker> = self.workers.drain(..).collect();
        let pids: Vec<(u64, u32)> = lock(&self.children).drain().collect();
        for (id, pid) in pids {
            if process::force_kill(pid) {
                warn!(id, pid, "helper outlived shutdown grace period; killed");
                report.killed += 1;
            }
        }
        for worker in remaining {
            debug!(id = worker.id, "detaching invocation worker");
            drop(worker.handle);
            report.abandoned += 1;
        }
        report
    }

    /// Join finished workers. Returns how many were reaped.
    fn reap(&mut self) -> usize {
        let before = self.workers.len();
        let (finished, running): (Vec<Worker>, Vec<Worker>) = self
            .workers
            .drain(..)
            .partition(|w| w.handle.is_finished());
        self.workers = running;
        for worker in finished {
            if worker.handle.join().is_err() {
                warn!(id = worker.id, "invocation worker panicked");
            }
        }
        before - self.workers.len()
    }
}

/// Run one invocation on the calling thread.
pub fn run(
    invocation: &HelperInvocation,
    timeout: Duration,
    cancel: &AtomicBool,
) -> InvocationOutcome {
    debug!(id = invocation.id(), command = %invocation.command_line(), "running helper");
    let outcome = executor::run_helper(invocation, timeout, cancel, |_| {});
    log_outcome(&outcome);
    outcome
}

fn log_outcome(outcome: &InvocationOutcome) {
    match &outcome.result {
        Ok(()) => debug!(
            id = outcome.id,
            entity = %outcome.entity.display(),
            elapsed_ms = outcome.duration.as_millis() as u64,
            "heartbeat sent"
        ),
        Err(e) => warn!(
            id = outcome.id,
            entity = %outcome.entity.display(),
            error = %e,
            "heartbeat failed"
        ),
    }
}

/// `now + timeout`, clamped to a day when the sum is out of the clock's range.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FALLBACK_WAIT))
        .unwrap_or(now)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
