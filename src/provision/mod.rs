//! Helper provisioning: find `wakatime-cli`, or download and install it.
//!
//! `locate()` is a cheap synchronous check of one directory. The install path
//! (download, verify, extract, chmod) blocks on network and disk, so sessions
//! run it on a dedicated worker thread via [`CliProvisioner::spawn`] and learn
//! the outcome from a completion callback.

pub(crate) mod archive;
pub mod client;
pub mod location;
pub(crate) mod lock;


use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::ProvisioningError;
use crate::models::constants::LATEST_VERSION;

use archive::{
    compute_sha256_checksum, extract_archive, make_executable, parse_checksums,
    MAX_ARCHIVE_SIZE, MAX_CHECKSUMS_SIZE,
};
pub use client::{ArchiveSource, HttpSource};
pub use location::{HelperLocation, Platform};
use lock::InstallLock;

/// Where provisioning stands. Only the provisioner produces these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    Unchecked,
    /// Found on disk; no network used.
    Present,
    Downloading,
    /// Downloaded and installed during this attempt.
    Installed,
    Failed(ProvisioningError),
}

impl ProvisioningState {
    /// The helper can be invoked.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Present | Self::Installed)
    }

    /// No further state changes follow for this attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Present | Self::Installed | Self::Failed(_))
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchecked => write!(f, "unchecked"),
            Self::Present => write!(f, "present"),
            Self::Downloading => write!(f, "downloading"),
            Self::Installed => write!(f, "installed"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Which release to fetch and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSpec {
    pub base_url: String,
    pub version: String,
    pub verify_checksums: bool,
}

impl ReleaseSpec {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.download_base_url.trim_end_matches('/').to_string(),
            version: settings.cli_version.clone(),
            verify_checksums: settings.verify_checksums,
        }
    }

    /// URL of a release file, e.g. `.../releases/latest/download/<file>`.
    pub fn asset_url(&self, file_name: &str) -> String {
        if self.version == LATEST_VERSION {
            format!("{}/releases/latest/download/{file_name}", self.base_url)
        } else {
            let tag = if self.version.starts_with('v') {
                self.version.clone()
            } else {
                format!("v{}", self.version)
            };
            format!("{}/releases/download/{tag}/{file_name}", self.base_url)
        }
    }
}

/// Locates or installs the helper for the current platform.
#[derive(Clone)]
pub struct CliProvisioner {
    location: HelperLocation,
    platform: Result<Platform, ProvisioningError>,
    release: ReleaseSpec,
    source: Arc<dyn ArchiveSource>,
}

impl fmt::Debug for CliProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliProvisioner")
            .field("location", &self.location)
            .field("platform", &self.platform)
            .field("release", &self.release)
            .finish_non_exhaustive()
    }
}

impl CliProvisioner {
    /// Provisioner for this machine, downloading over HTTPS.
    pub fn new(settings: &Settings) -> Result<Self, ProvisioningError> {
        let dir = settings.resolved_helper_dir().ok_or_else(|| {
            ProvisioningError::FilesystemError("could not determine home directory".to_string())
        })?;
        let platform = Platform::current();
        let location = HelperLocation::for_platform(dir, platform.as_ref().ok());
        Ok(Self::with_parts(
            location,
            platform,
            ReleaseSpec::from_settings(settings),
            Arc::new(HttpSource),
        ))
    }

    pub fn with_parts(
        location: HelperLocation,
        platform: Result<Platform, ProvisioningError>,
        release: ReleaseSpec,
        source: Arc<dyn ArchiveSource>,
    ) -> Self {
        Self {
            location,
            platform,
            release,
            source,
        }
    }

    pub fn location(&self) -> &HelperLocation {
        &self.location
    }

    /// Check the well-known directory for the expected executable.
    pub fn locate(&self) -> Option<HelperLocation> {
        self.location.is_present().then(|| self.location.clone())
    }

    /// Archive URL for this platform.
    pub fn download_url(&self) -> Result<String, ProvisioningError> {
        let platform = self.platform.clone()?;
        Ok(self.release.asset_url(&platform.archive_name()))
    }

    /// Make the helper available, blocking until done.
    pub fn ensure_available(&self) -> ProvisioningState {
        self.ensure_available_with(&AtomicBool::new(false), |_| {})
    }

    /// Like [`ensure_available`](Self::ensure_available), reporting the
    /// intermediate `Downloading` state to `on_state` and stopping early when
    /// `cancel` is raised.
    pub fn ensure_available_with(
        &self,
        cancel: &AtomicBool,
        mut on_state: impl FnMut(&ProvisioningState),
    ) -> ProvisioningState {
        if self.locate().is_some() {
            debug!(path = %self.location.executable().display(), "helper present");
            return ProvisioningState::Present;
        }
        if self.repair_permissions() {
            return ProvisioningState::Present;
        }

        match self.install(cancel, &mut on_state) {
            Ok(()) => {
                info!(path = %self.location.executable().display(), "helper installed");
                ProvisioningState::Installed
            }
            Err(e) => {
                warn!(error = %e, "helper provisioning failed");
                ProvisioningState::Failed(e)
            }
        }
    }

    /// Provision off the calling thread.
    ///
    /// When the helper is already on disk `on_complete` runs immediately on
    /// the caller's thread and no worker is started. Otherwise a worker
    /// thread reports `Downloading` (if it downloads) and then the terminal
    /// state. Either way `on_complete` receives exactly one terminal state.
    pub fn spawn<F>(&self, cancel: Arc<AtomicBool>, on_state: F) -> Option<JoinHandle<()>>
    where
        F: Fn(ProvisioningState) + Send + Sync + 'static,
    {
        if self.locate().is_some() {
            on_state(ProvisioningState::Present);
            return None;
        }

        let provisioner = self.clone();
        let on_state = Arc::new(on_state);
        let worker_on_state = Arc::clone(&on_state);
        let spawned = thread::Builder::new()
            .name("wakabeat-provision".to_string())
            .spawn(move || {
                let state = provisioner.ensure_available_with(&cancel, |progress| {
                    worker_on_state(progress.clone());
                });
                worker_on_state(state);
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                on_state(ProvisioningState::Failed(ProvisioningError::FilesystemError(
                    format!("failed to start provisioning worker: {e}"),
                )));
                None
            }
        }
    }

    /// Restore the execute bit on a helper left without it, e.g. by an
    /// install interrupted between extraction and chmod.
    fn repair_permissions(&self) -> bool {
        if !self.location.exists() {
            return false;
        }
        let executable = self.location.executable();
        match make_executable(&executable) {
            Ok(()) if self.location.is_present() => {
                info!(path = %executable.display(), "restored execute permission on helper");
                true
            }
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "could not repair helper permissions; reinstalling");
                false
            }
        }
    }

    fn install(
        &self,
        cancel: &AtomicBool,
        on_state: &mut dyn FnMut(&ProvisioningState),
    ) -> Result<(), ProvisioningError> {
        let platform = self.platform.clone()?;
        let archive_name = platform.archive_name();
        let url = self.release.asset_url(&archive_name);

        let _lock = InstallLock::acquire(self.location.dir())?;
        if self.location.is_present() {
            info!("helper installed by another process while waiting for the lock");
            return Ok(());
        }
        check_cancel(cancel)?;

        on_state(&ProvisioningState::Downloading);
        info!(%url, "downloading helper");
        let archive = self
            .source
            .fetch(&url, MAX_ARCHIVE_SIZE, cancel)?
            .ok_or_else(|| ProvisioningError::NetworkFailure(format!("{url}: HTTP 404 - Not Found")))?;

        let digest = compute_sha256_checksum(&archive);
        info!(bytes = archive.len(), sha256 = %digest, "downloaded helper archive");
        if self.release.verify_checksums {
            self.verify_checksum(&archive_name, &digest, cancel)?;
        }

        check_cancel(cancel)?;
        let extracted = extract_archive(&archive, self.location.dir(), cancel)?;
        debug!(files = extracted.len(), "extracted helper archive");

        if !self.location.is_present() {
            return Err(ProvisioningError::ExtractionError(format!(
                "archive did not contain {}",
                self.location.executable_name()
            )));
        }
        make_executable(&self.location.executable())
    }

    fn verify_checksum(
        &self,
        archive_name: &str,
        digest: &str,
        cancel: &AtomicBool,
    ) -> Result<(), ProvisioningError> {
        let url = self.release.asset_url("checksums.txt");
        let Some(body) = self.source.fetch(&url, MAX_CHECKSUMS_SIZE, cancel)? else {
            debug!(%url, "release publishes no checksums; skipping verification");
            return Ok(());
        };

        let text = String::from_utf8_lossy(&body);
        match parse_checksums(&text, archive_name) {
            Some(expected) if expected == digest => {
                debug!("archive checksum verified");
                Ok(())
            }
            Some(expected) => Err(ProvisioningError::ExtractionError(format!(
                "checksum mismatch for {archive_name}: expected {expected}, got {digest}"
            ))),
            None => {
                warn!(archive = archive_name, "archive not listed in checksums.txt");
                Ok(())
            }
        }
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), ProvisioningError> {
    if cancel.load(Ordering::Relaxed) {
        Err(ProvisioningError::Cancelled)
    } else {
        Ok(())
    }
}
