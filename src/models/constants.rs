//! Fixed conventions shared across the crate.

/// Name of the directory under the user's home that holds the helper.
pub const HELPER_DIR_NAME: &str = ".wakatime";

/// Base name of the helper executable; the platform suffix is appended.
pub const HELPER_BASENAME: &str = "wakatime-cli";

/// Release host for prebuilt helper archives.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://github.com/wakatime/wakatime-cli";

/// Release tag meaning "whatever is newest".
pub const LATEST_VERSION: &str = "latest";

/// Minimum seconds between two non-save heartbeats for the same file.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 120;

/// Helpers running longer than this are killed.
pub const DEFAULT_HELPER_TIMEOUT_SECS: u64 = 60;

/// Bounded wait for workers when the session stops.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

/// Upper bound accepted for `helper-timeout-secs` (one day).
pub const MAX_HELPER_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Upper bound accepted for `shutdown-grace-ms` (one minute).
pub const MAX_SHUTDOWN_GRACE_MS: u64 = 60 * 1000;

/// How long the status indicator stays enabled after an invocation starts.
pub const STATUS_PULSE_MS: u64 = 200;

/// Identifier this integration reports in the helper's `--plugin` argument.
pub const PLUGIN_NAME: &str = "wakabeat";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");
