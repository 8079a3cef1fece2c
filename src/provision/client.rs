//! HTTP fetching for helper archives.
//!
//! Provides a timeout-bounded client and size-limited, cancellable downloads.

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::ProvisioningError;
use crate::models::constants::{PLUGIN_NAME, PLUGIN_VERSION};

pub(crate) const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub(crate) const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120; // Total request timeout (includes connection + transfer)

/// Something that can fetch release files.
///
/// `Ok(None)` means the server answered 404; any other failure is an error.
pub trait ArchiveSource: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        max_size: u64,
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<u8>>, ProvisioningError>;
}

/// Fetches over HTTPS with a blocking reqwest client.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpSource;

impl ArchiveSource for HttpSource {
    fn fetch(
        &self,
        url: &str,
        max_size: u64,
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<u8>>, ProvisioningError> {
        let client = create_http_client()?;
        let response = client
            .get(url)
            .send()
            .map_err(|e| ProvisioningError::NetworkFailure(format!("GET {url}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        validate_response_status(&response, url)?;

        let expected = response.content_length();
        read_with_limit(response, expected, max_size, cancel, url).map(Some)
    }
}

/// Create an HTTP client with connect and total-request timeouts.
pub(crate) fn create_http_client() -> Result<Client, ProvisioningError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(format!("{PLUGIN_NAME}/{PLUGIN_VERSION}"))
        .build()
        .map_err(|e| ProvisioningError::NetworkFailure(format!("failed to create HTTP client: {e}")))
}

fn validate_response_status(response: &Response, url: &str) -> Result<(), ProvisioningError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ProvisioningError::NetworkFailure(format!(
            "{url}: HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        )));
    }
    Ok(())
}

/// Read a body with size limit enforcement and truncation detection.
///
/// Checks `expected` (Content-Length) up front, enforces `max_size` while
/// streaming, polls `cancel` between chunks, and fails if fewer bytes than
/// advertised arrive.
pub(crate) fn read_with_limit<R: Read>(
    mut reader: R,
    expected: Option<u64>,
    max_size: u64,
    cancel: &AtomicBool,
    context: &str,
) -> Result<Vec<u8>, ProvisioningError> {
    if let Some(len) = expected {
        if len > max_size {
            return Err(ProvisioningError::NetworkFailure(format!(
                "{context}: Content-Length {len} bytes exceeds maximum of {max_size} bytes"
            )));
        }
    }

    let mut bytes = Vec::new();
    let mut total_read: u64 = 0;
    let mut buffer = [0u8; 8192];

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(ProvisioningError::Cancelled);
        }
        let n = reader.read(&mut buffer).map_err(|e| {
            ProvisioningError::NetworkFailure(format!("{context}: failed to read body: {e}"))
        })?;
        if n == 0 {
            break;
        }
        total_read += n as u64;
        if total_read > max_size {
            return Err(ProvisioningError::NetworkFailure(format!(
                "{context}: download exceeds maximum of {max_size} bytes"
            )));
        }
        bytes.extend_from_slice(&buffer[..n]);
    }

    if let Some(len) = expected {
        if total_read < len {
            return Err(ProvisioningError::NetworkFailure(format!(
                "{context}: truncated download ({total_read} of {len} bytes)"
            )));
        }
    }

    Ok(bytes)
}
