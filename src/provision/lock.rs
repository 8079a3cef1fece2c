//! Advisory install lock.
//!
//! Two editor instances provisioning at once would both download into the
//! same directory. Holding an `fs2` exclusive lock on a marker file for the
//! duration of an install serializes them; the second one then finds the
//! helper already in place.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

use crate::error::ProvisioningError;

const LOCK_FILE_NAME: &str = ".wakabeat-install.lock";

/// Held for the duration of an install; released on drop.
pub(crate) struct InstallLock {
    file: File,
}

impl InstallLock {
    /// Block until the lock in `dir` is acquired, creating `dir` if needed.
    pub(crate) fn acquire(dir: &Path) -> Result<Self, ProvisioningError> {
        fs::create_dir_all(dir).map_err(|e| {
            ProvisioningError::FilesystemError(format!(
                "failed to create {}: {e}",
                dir.display()
            ))
        })?;

        let path = dir.join(LOCK_FILE_NAME);
        #[allow(clippy::suspicious_open_options)]
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                ProvisioningError::FilesystemError(format!(
                    "failed to open {}: {e}",
                    path.display()
                ))
            })?;
        file.lock_exclusive().map_err(|e| {
            ProvisioningError::FilesystemError(format!(
                "failed to lock {}: {e}",
                path.display()
            ))
        })?;

        Ok(Self { file })
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
