//! Session lifecycle and setup coordination.
//!
//! A [`Session`] lives on the main context. It owns the dispatcher, the
//! invoker, the status indicator and the diagnostics sink. Worker threads
//! (provisioning, invocations) never touch that state; they post a
//! [`SessionNotice`] on the session channel and the main context applies it
//! in [`Session::pump`].

mod diagnostics;
mod indicator;


use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{Settings, SettingsHandle};
use crate::dispatch::{DispatchStats, HeartbeatDispatcher, Readiness};
use crate::error::{ConfigError, ProvisioningError};
use crate::host::{resolve_document, HostEvent};
use crate::invoke::{deadline_after, ProcessInvoker, ShutdownReport};
use crate::models::constants::STATUS_PULSE_MS;
use crate::models::{ActivityEvent, InvocationOutcome};
use crate::provision::{CliProvisioner, ProvisioningState};

pub use diagnostics::{DiagnosticSink, Diagnostics, TracingSink};
pub use indicator::{NullIndicator, StatusIndicator};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Completion notification from a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Provisioning(ProvisioningState),
    Invocation(InvocationOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Provisioning,
    /// Helper ready, host notifications subscribed.
    Running,
    /// Provisioning failed; nothing is sent for the rest of the session.
    Disabled,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Disabled => "disabled",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// What `stop` had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    pub invocations: ShutdownReport,
    /// The provisioning worker was still running at the deadline.
    pub provisioning_abandoned: bool,
}

pub struct Session {
    settings: SettingsHandle,
    provisioner: CliProvisioner,
    dispatcher: HeartbeatDispatcher,
    invoker: ProcessInvoker,
    indicator: Box<dyn StatusIndicator>,
    diagnostics: Diagnostics,
    lifecycle: Lifecycle,
    provisioning: ProvisioningState,
    subscribed: bool,
    cancel: Arc<AtomicBool>,
    notices_tx: Sender<SessionNotice>,
    notices_rx: Receiver<SessionNotice>,
    provision_worker: Option<JoinHandle<()>>,
    pulse_deadline: Option<Instant>,
}

impl Session {
    pub fn new(settings: Settings, provisioner: CliProvisioner) -> Self {
        let settings = SettingsHandle::new(settings);
        let cancel = Arc::new(AtomicBool::new(false));
        let (notices_tx, notices_rx) = mpsc::channel();

        let invoker_tx = notices_tx.clone();
        let invoker = ProcessInvoker::new(Arc::clone(&cancel), move |outcome| {
            let _ = invoker_tx.send(SessionNotice::Invocation(outcome));
        });

        Self {
            dispatcher: HeartbeatDispatcher::new(settings.clone()),
            diagnostics: Diagnostics::new(Box::new(TracingSink), settings.clone()),
            settings,
            provisioner,
            invoker,
            indicator: Box::new(NullIndicator),
            lifecycle: Lifecycle::Idle,
            provisioning: ProvisioningState::Unchecked,
            subscribed: false,
            cancel,
            notices_tx,
            notices_rx,
            provision_worker: None,
            pulse_deadline: None,
        }
    }

    /// Session for this machine with the default HTTPS download source.
    pub fn from_settings(settings: Settings) -> Result<Self, ProvisioningError> {
        let provisioner = CliProvisioner::new(&settings)?;
        Ok(Self::new(settings, provisioner))
    }

    pub fn with_indicator(mut self, indicator: Box<dyn StatusIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.diagnostics.replace_sink(sink);
        self
    }

    /// Begin setup. Only the first call on an idle session does anything.
    ///
    /// Returns `true` if provisioning was started. Completion arrives as a
    /// notice, so the helper becomes usable during a later [`pump`](Self::pump).
    pub fn start(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Idle {
            debug!(lifecycle = %self.lifecycle, "start ignored");
            return false;
        }
        self.lifecycle = Lifecycle::Provisioning;
        info!(dir = %self.provisioner.location().dir().display(), "session starting");

        let tx = self.notices_tx.clone();
        self.provision_worker = self
            .provisioner
            .spawn(Arc::clone(&self.cancel), move |state| {
                let _ = tx.send(SessionNotice::Provisioning(state));
            });
        true
    }

    /// Apply every queued notice without blocking. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(notice) = self.notices_rx.try_recv() {
            self.apply_notice(notice);
            applied += 1;
        }
        self.expire_pulse(Instant::now());
        applied
    }

    /// Wait up to `timeout` for the first notice, then apply whatever is queued.
    pub fn pump_for(&mut self, timeout: Duration) -> usize {
        let deadline = deadline_after(timeout);
        loop {
            let now = Instant::now();
            self.expire_pulse(now);
            let mut wait = deadline.saturating_duration_since(now);
            if let Some(pulse_end) = self.pulse_deadline {
                wait = wait.min(pulse_end.saturating_duration_since(now));
            }

            match self.notices_rx.recv_timeout(wait) {
                Ok(notice) => {
                    self.apply_notice(notice);
                    return 1 + self.pump();
                }
                Err(RecvTimeoutError::Timeout) if Instant::now() < deadline => continue,
                Err(_) => return self.pump(),
            }
        }
    }

    /// Translate a host notification into activity.
    ///
    /// Ignored until the session has subscribed (helper ready). Returns the
    /// id of the invocation started, if any.
    pub fn handle_host_event(&mut self, event: HostEvent) -> Option<u64> {
        if !self.subscribed {
            debug!(event = event.name(), "host event before subscription; ignored");
            return None;
        }

        match event {
            HostEvent::FocusLost { .. } => {
                self.dispatcher.detach_tracking();
                None
            }
            HostEvent::FocusGained { document } => {
                let path = resolve_document(document.as_deref())?;
                self.dispatcher.attach_tracking(&path);
                self.on_activity(ActivityEvent::focus_changed(path))
            }
            HostEvent::AboutToSave { document } => {
                let path = resolve_document(document.as_deref())?;
                self.on_activity(ActivityEvent::saved(path))
            }
            HostEvent::TextChanged => {
                let path = self.dispatcher.tracked_path()?.to_path_buf();
                self.on_activity(ActivityEvent::text_modified(path))
            }
        }
    }

    /// Offer an activity event to the dispatcher and start the helper if it
    /// decides to send. Never waits for the helper.
    pub fn on_activity(&mut self, event: ActivityEvent) -> Option<u64> {
        if self.lifecycle == Lifecycle::Stopped {
            return None;
        }
        let invocation = self.dispatcher.on_activity(event)?;
        let id = invocation.id();
        let timeout = self.settings.read().helper_timeout();

        self.begin_pulse();
        self.invoker.invoke(invocation, timeout);
        Some(id)
    }

    /// Replace the settings. Takes effect from the next event.
    pub fn apply_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        let visible = settings.show_status_indicator;
        self.settings.replace(settings);
        if !visible {
            self.end_pulse();
        }
        self.indicator.set_visible(visible);
        debug!("settings applied");
        Ok(())
    }

    /// Cancel outstanding work, wait up to the shutdown grace period, then
    /// forcibly terminate anything left. Idempotent.
    pub fn stop(&mut self) -> StopReport {
        if self.lifecycle == Lifecycle::Stopped {
            return StopReport::default();
        }
        info!(lifecycle = %self.lifecycle, "session stopping");
        self.lifecycle = Lifecycle::Stopped;
        self.subscribed = false;
        self.cancel.store(true, Ordering::Relaxed);
        self.dispatcher.detach_tracking();
        self.end_pulse();

        let grace = self.settings.read().shutdown_grace();
        let deadline = deadline_after(grace);

        let mut report = StopReport::default();
        if let Some(worker) = self.provision_worker.take() {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                warn!("provisioning worker outlived shutdown grace period; detached");
                report.provisioning_abandoned = true;
            }
        }

        report.invocations = self
            .invoker
            .shutdown(deadline.saturating_duration_since(Instant::now()));

        // Late completions are irrelevant once stopped.
        while self.notices_rx.try_recv().is_ok() {}
        report
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Latest provisioning state applied on the main context.
    pub fn provisioning_state(&self) -> &ProvisioningState {
        &self.provisioning
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn readiness(&self) -> Readiness {
        self.dispatcher.readiness()
    }

    pub fn dispatcher(&self) -> &HeartbeatDispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn provisioner(&self) -> &CliProvisioner {
        &self.provisioner
    }

    /// Invocations whose helper has not finished.
    pub fn in_flight(&mut self) -> usize {
        self.invoker.in_flight()
    }

    fn apply_notice(&mut self, notice: SessionNotice) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        match notice {
            SessionNotice::Provisioning(state) => self.apply_provisioning(state),
            SessionNotice::Invocation(outcome) => self.apply_outcome(outcome),
        }
    }

    fn apply_provisioning(&mut self, state: ProvisioningState) {
        debug!(state = %state, "provisioning update");
        self.provisioning = state.clone();
        if self.lifecycle != Lifecycle::Provisioning {
            return;
        }

        match state {
            ProvisioningState::Present | ProvisioningState::Installed => {
                self.dispatcher
                    .arm(self.provisioner.location().executable());
                self.subscribed = true;
                self.lifecycle = Lifecycle::Running;
                self.indicator
                    .set_visible(self.settings.read().show_status_indicator);
                info!("session running");
                self.diagnostics.debug("wakatime-cli ready");
                self.diagnostics.debug("wakabeat initialized");
            }
            ProvisioningState::Failed(e) => {
                self.lifecycle = Lifecycle::Disabled;
                warn!(error = %e, "heartbeats disabled for this session");
                self.diagnostics.always(&format!(
                    "wakatime-cli unavailable ({e}); heartbeats are disabled for this session"
                ));
            }
            ProvisioningState::Unchecked | ProvisioningState::Downloading => {}
        }
    }

    fn apply_outcome(&mut self, outcome: InvocationOutcome) {
        if let Err(e) = &outcome.result {
            self.diagnostics.debug(&format!(
                "heartbeat for {} failed: {e}",
                outcome.entity.display()
            ));
        }
    }

    fn begin_pulse(&mut self) {
        if !self.settings.read().show_status_indicator {
            return;
        }
        if self.dispatcher.window_mut().begin_pulse() {
            self.indicator.set_active(true);
            self.pulse_deadline = Some(Instant::now() + Duration::from_millis(STATUS_PULSE_MS));
        }
    }

    fn expire_pulse(&mut self, now: Instant) {
        if self.pulse_deadline.is_some_and(|deadline| now >= deadline) {
            self.end_pulse();
        }
    }

    fn end_pulse(&mut self) {
        if self.pulse_deadline.take().is_some() {
            self.indicator.set_active(false);
        }
        self.dispatcher.window_mut().end_pulse();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
