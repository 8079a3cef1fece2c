//! Where the helper lives and which prebuilt release fits this machine.

use std::env;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use crate::error::ProvisioningError;
use crate::models::constants::HELPER_BASENAME;

/// An operating system / CPU pair with a prebuilt helper release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    os: &'static str,
    arch: &'static str,
}

impl Platform {
    /// The platform this process runs on.
    pub fn current() -> Result<Self, ProvisioningError> {
        Self::from_parts(env::consts::OS, env::consts::ARCH)
    }

    /// Map Rust's `std::env::consts` names to the release naming scheme.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, ProvisioningError> {
        let unsupported = || ProvisioningError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };

        let release_os = match os {
            "linux" => "linux",
            "macos" | "darwin" => "darwin",
            "windows" => "windows",
            "freebsd" => "freebsd",
            "openbsd" => "openbsd",
            "netbsd" => "netbsd",
            _ => return Err(unsupported()),
        };
        let release_arch = match arch {
            "x86_64" | "amd64" => "amd64",
            "aarch64" | "arm64" => "arm64",
            "x86" | "386" => "386",
            "arm" => "arm",
            _ => return Err(unsupported()),
        };

        let supported = matches!(
            (release_os, release_arch),
            ("linux", _)
                | ("darwin", "amd64" | "arm64")
                | ("windows", "amd64" | "arm64" | "386")
                | ("freebsd" | "netbsd", "amd64" | "386" | "arm")
                | ("openbsd", _)
        );
        if !supported {
            return Err(unsupported());
        }

        Ok(Self {
            os: release_os,
            arch: release_arch,
        })
    }

    pub fn os(&self) -> &'static str {
        self.os
    }

    pub fn arch(&self) -> &'static str {
        self.arch
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// `wakatime-cli-<os>-<arch>`
    pub fn asset_stem(&self) -> String {
        format!("{HELPER_BASENAME}-{}-{}", self.os, self.arch)
    }

    pub fn executable_name(&self) -> String {
        if self.is_windows() {
            format!("{}.exe", self.asset_stem())
        } else {
            self.asset_stem()
        }
    }

    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.asset_stem())
    }
}

/// The directory and executable name the helper is expected under.
///
/// Computed once per session and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperLocation {
    dir: PathBuf,
    executable_name: String,
}

impl HelperLocation {
    pub fn new(dir: impl Into<PathBuf>, executable_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            executable_name: executable_name.into(),
        }
    }

    /// The platform-suffixed name, or plain `wakatime-cli` when no release exists.
    pub fn for_platform(dir: impl Into<PathBuf>, platform: Option<&Platform>) -> Self {
        let name = match platform {
            Some(p) => p.executable_name(),
            None => HELPER_BASENAME.to_string(),
        };
        Self::new(dir, name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }

    pub fn executable(&self) -> PathBuf {
        self.dir.join(&self.executable_name)
    }

    /// A regular file with the expected name exists in the directory.
    pub fn exists(&self) -> bool {
        self.executable().is_file()
    }

    /// The helper exists and can be executed.
    pub fn is_present(&self) -> bool {
        match fs::metadata(self.executable()) {
            Ok(metadata) => metadata.is_file() && is_executable(&metadata),
            Err(_) => false,
        }
    }
}

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &Metadata) -> bool {
    true
}
