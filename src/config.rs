//! wakabeat configuration.
//!
//! Loaded from `~/.wakabeat/config.toml`. A missing file means defaults.
//! The session keeps settings behind a [`SettingsHandle`]; replacing them
//! takes effect on the next event, never retroactively.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::constants::{
    DEFAULT_DEBOUNCE_SECS, DEFAULT_DOWNLOAD_BASE_URL, DEFAULT_HELPER_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_GRACE_MS, HELPER_DIR_NAME, LATEST_VERSION, MAX_HELPER_TIMEOUT_SECS,
    MAX_SHUTDOWN_GRACE_MS, PLUGIN_NAME, PLUGIN_VERSION,
};

/// User-facing settings for the integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Pulse the status indicator while heartbeats are sent.
    pub show_status_indicator: bool,
    /// Emit diagnostic messages for routine events and invocation failures.
    pub diagnostics: bool,
    /// Minimum seconds between two non-save heartbeats for the same file.
    pub debounce_secs: u64,
    /// Kill the helper if a single run exceeds this.
    pub helper_timeout_secs: u64,
    /// Bounded wait for workers on shutdown.
    pub shutdown_grace_ms: u64,
    /// Override for the helper directory. `~` and `$VAR` are expanded.
    pub helper_dir: Option<String>,
    /// Release tag to download: `latest` or a version such as `v1.98.0`.
    pub cli_version: String,
    /// Release host serving `releases/.../wakatime-cli-<os>-<arch>.zip`.
    pub download_base_url: String,
    /// Check the archive digest against the release's `checksums.txt`.
    pub verify_checksums: bool,
    /// Glob patterns of files that are never reported.
    pub exclude: Vec<String>,
    pub editor_name: String,
    pub editor_version: String,
    /// Forwarded to the helper as `--key`.
    ///
    /// The key is then part of the helper's argv and readable by other local
    /// users through `ps` or `/proc`. Prefer keeping it in the helper's own
    /// config file and pointing `helper-config` at it; when `helper-config`
    /// is set this field is not forwarded.
    pub api_key: Option<String>,
    /// Forwarded to the helper as `--config`.
    pub helper_config: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_status_indicator: true,
            diagnostics: false,
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            helper_timeout_secs: DEFAULT_HELPER_TIMEOUT_SECS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            helper_dir: None,
            cli_version: LATEST_VERSION.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            verify_checksums: true,
            exclude: Vec::new(),
            editor_name: PLUGIN_NAME.to_string(),
            editor_version: PLUGIN_VERSION.to_string(),
            api_key: None,
            helper_config: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// The config file path: `~/.wakabeat/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".wakabeat").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_secs == 0 {
            return Err(ConfigError::Invalid("debounce-secs must be positive".into()));
        }
        if self.helper_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "helper-timeout-secs must be positive".into(),
            ));
        }
        if self.helper_timeout_secs > MAX_HELPER_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "helper-timeout-secs must be at most {MAX_HELPER_TIMEOUT_SECS}"
            )));
        }
        if self.shutdown_grace_ms > MAX_SHUTDOWN_GRACE_MS {
            return Err(ConfigError::Invalid(format!(
                "shutdown-grace-ms must be at most {MAX_SHUTDOWN_GRACE_MS}"
            )));
        }
        if self.cli_version != LATEST_VERSION {
            let bare = self.cli_version.trim_start_matches('v');
            semver::Version::parse(bare).map_err(|e| {
                ConfigError::Invalid(format!("cli-version '{}': {e}", self.cli_version))
            })?;
        }
        if !self.download_base_url.starts_with("https://")
            && !self.download_base_url.starts_with("http://")
        {
            return Err(ConfigError::Invalid(format!(
                "download-base-url '{}' is not an http(s) URL",
                self.download_base_url
            )));
        }
        for pattern in &self.exclude {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("exclude pattern '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn helper_timeout(&self) -> Duration {
        Duration::from_secs(self.helper_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// The directory the helper lives in: the override, or `~/.wakatime`.
    pub fn resolved_helper_dir(&self) -> Option<PathBuf> {
        match &self.helper_dir {
            Some(dir) => Some(PathBuf::from(expand_env_vars(&expand_tilde(dir)))),
            None => dirs::home_dir().map(|h| h.join(HELPER_DIR_NAME)),
        }
    }

    /// `--plugin` value: `<editor>/<version> wakabeat/<version>`.
    pub fn plugin_identifier(&self) -> String {
        format!(
            "{}/{} {PLUGIN_NAME}/{PLUGIN_VERSION}",
            self.editor_name, self.editor_version
        )
    }

    /// Whether `path` matches any `exclude` pattern. Malformed patterns never match.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches_path(path))
                .unwrap_or(false)
        })
    }
}

/// Shared, replaceable settings.
///
/// Readers take a short read lock per event; `replace` swaps the whole value.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle(Arc<RwLock<Settings>>);

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    pub fn replace(&self, settings: Settings) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *guard = settings;
    }
}

static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("Invalid regex pattern")
});

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Expand `${VAR}` and `$VAR`; unknown variables are left as written.
pub fn expand_env_vars(s: &str) -> String {
    ENV_VAR_RE
        .replace_all(s, |caps: &regex::Captures| {
            let name = caps.get(1).or_else(|| caps.get(2));
            match name.and_then(|n| env::var(n.as_str()).ok()) {
                Some(value) => value,
                None => caps[0].to_string(),
            }
        })
        .to_string()
}
