//! Error taxonomy for provisioning, helper invocation, and configuration.
//!
//! Provisioning and invocation errors are terminal for the attempt that raised
//! them but never fatal to the host: they are reported and then dropped.

use std::time::Duration;
use thiserror::Error;

/// Why the helper could not be made available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("no prebuilt wakatime-cli for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("filesystem error: {0}")]
    FilesystemError(String),

    #[error("extraction error: {0}")]
    ExtractionError(String),

    #[error("provisioning cancelled by shutdown")]
    Cancelled,
}

/// Why a single helper run did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("failed to spawn helper: {0}")]
    SpawnFailure(String),

    #[error("helper exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("helper timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("helper cancelled by shutdown")]
    Cancelled,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

/// Problems loading or validating `Settings`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}
