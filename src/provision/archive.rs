//! Archive extraction with protections against zip slip and zip bombs,
//! plus digest helpers for release checksums.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;

use crate::error::ProvisioningError;

/// Maximum uncompressed size for any single entry (200 MB)
pub(crate) const MAX_UNCOMPRESSED_SIZE: u64 = 200 * 1024 * 1024;
/// Maximum compression ratio before an entry is treated as a zip bomb
pub(crate) const MAX_COMPRESSION_RATIO: f64 = 100.0;
/// Maximum total extracted size for all entries combined (400 MB)
pub(crate) const MAX_TOTAL_EXTRACTED_SIZE: u64 = 400 * 1024 * 1024;
/// Maximum size for downloaded archives
pub(crate) const MAX_ARCHIVE_SIZE: u64 = 100 * 1024 * 1024;
/// Maximum size for a release's checksums.txt
pub(crate) const MAX_CHECKSUMS_SIZE: u64 = 64 * 1024;

fn extraction(message: impl Into<String>) -> ProvisioningError {
    ProvisioningError::ExtractionError(message.into())
}

fn filesystem(context: &str, path: &Path, err: impl std::fmt::Display) -> ProvisioningError {
    ProvisioningError::FilesystemError(format!("{context} {}: {err}", path.display()))
}

/// A reader wrapper that limits the number of bytes that can be read.
/// Catches entries that lie about their uncompressed size in headers.
pub(crate) struct LimitedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R> LimitedReader<R> {
    pub(crate) fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other(
                "Zip entry exceeds maximum allowed size during extraction - possible zip bomb",
            ));
        }

        let max_read = std::cmp::min(buf.len() as u64, self.remaining) as usize;
        let bytes_read = self.inner.read(&mut buf[..max_read])?;
        self.remaining = self.remaining.saturating_sub(bytes_read as u64);

        Ok(bytes_read)
    }
}

/// Validate an entry's declared size and compression ratio.
pub(crate) fn validate_zip_entry<R: Read + ?Sized>(
    file: &zip::read::ZipFile<'_, R>,
) -> Result<(), ProvisioningError> {
    let compressed = file.compressed_size();
    let uncompressed = file.size();

    if uncompressed > MAX_UNCOMPRESSED_SIZE {
        return Err(extraction(format!(
            "entry '{}' too large: {uncompressed} bytes (max: {MAX_UNCOMPRESSED_SIZE} bytes)",
            file.name()
        )));
    }

    if compressed > 0 {
        let ratio = uncompressed as f64 / compressed as f64;
        if ratio > MAX_COMPRESSION_RATIO {
            return Err(extraction(format!(
                "suspicious compression ratio in '{}': {ratio:.1}x (max: {MAX_COMPRESSION_RATIO:.1}x) - possible zip bomb",
                file.name()
            )));
        }
    }

    Ok(())
}

/// Resolve an entry name inside `dest_dir`, rejecting anything that escapes it.
pub(crate) fn safe_extract_path(
    dest_dir: &Path,
    entry_name: &str,
) -> Result<PathBuf, ProvisioningError> {
    if entry_name.contains("..") {
        return Err(extraction(format!(
            "zip slip detected: path contains '..' component - '{entry_name}'"
        )));
    }

    let entry_path = Path::new(entry_name);
    if entry_path.is_absolute() || entry_name.starts_with('/') || entry_name.starts_with('\\') {
        return Err(extraction(format!(
            "zip slip detected: absolute path in archive - '{entry_name}'"
        )));
    }

    fs::create_dir_all(dest_dir).map_err(|e| filesystem("failed to create", dest_dir, e))?;
    let canonical_dest = dest_dir
        .canonicalize()
        .map_err(|e| filesystem("failed to canonicalize", dest_dir, e))?;

    // The output may not exist yet, so normalize component by component.
    let mut normalized = canonical_dest.clone();
    for component in entry_path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(extraction(format!(
                    "zip slip detected: disallowed path component in '{entry_name}'"
                )));
            }
        }
    }

    if !normalized.starts_with(&canonical_dest) {
        return Err(extraction(format!(
            "zip slip detected: '{}' escapes '{}'",
            normalized.display(),
            canonical_dest.display()
        )));
    }

    Ok(normalized)
}

fn entry_name<R: Read + ?Sized>(file: &zip::read::ZipFile<'_, R>) -> String {
    file.enclosed_name()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| file.mangled_name().to_string_lossy().to_string())
}

/// Extract an in-memory zip archive into `dest_dir`.
///
/// All entries are validated before anything is written. Each file is staged
/// in a temp file next to its destination and renamed into place, so an
/// interrupted extraction never leaves a half-written executable behind.
/// Returns the paths of the extracted files.
pub(crate) fn extract_archive(
    bytes: &[u8],
    dest_dir: &Path,
    cancel: &AtomicBool,
) -> Result<Vec<PathBuf>, ProvisioningError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| extraction(format!("failed to read zip archive: {e}")))?;

    let mut total_uncompressed_size: u64 = 0;
    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| extraction(format!("failed to read zip entry {i}: {e}")))?;

        validate_zip_entry(&file)?;

        total_uncompressed_size = total_uncompressed_size
            .checked_add(file.size())
            .ok_or_else(|| extraction("total uncompressed size overflow - possible zip bomb"))?;
        if total_uncompressed_size > MAX_TOTAL_EXTRACTED_SIZE {
            return Err(extraction(format!(
                "total uncompressed size {total_uncompressed_size} exceeds maximum {MAX_TOTAL_EXTRACTED_SIZE} bytes - possible zip bomb"
            )));
        }

        let name = entry_name(&file);
        if !name.is_empty() {
            safe_extract_path(dest_dir, &name)?;
        }
    }

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        if cancel.load(Ordering::Relaxed) {
            return Err(ProvisioningError::Cancelled);
        }

        let mut file = archive
            .by_index(i)
            .map_err(|e| extraction(format!("failed to read zip entry {i}: {e}")))?;
        let name = entry_name(&file);
        if name.is_empty() {
            continue;
        }

        let outpath = safe_extract_path(dest_dir, &name)?;
        if file.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| filesystem("failed to create", &outpath, e))?;
            continue;
        }

        let parent = outpath.parent().unwrap_or(dest_dir);
        fs::create_dir_all(parent).map_err(|e| filesystem("failed to create", parent, e))?;

        let mut staging = NamedTempFile::new_in(parent)
            .map_err(|e| filesystem("failed to stage file in", parent, e))?;
        let mut limited_reader = LimitedReader::new(&mut file, MAX_UNCOMPRESSED_SIZE);
        io::copy(&mut limited_reader, staging.as_file_mut())
            .map_err(|e| extraction(format!("failed to extract '{name}': {e}")))?;
        staging
            .as_file()
            .sync_all()
            .map_err(|e| filesystem("failed to sync", staging.path(), e))?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staging.path(), fs::Permissions::from_mode(mode & 0o777))
                .map_err(|e| filesystem("failed to set permissions on", staging.path(), e))?;
        }

        staging
            .persist(&outpath)
            .map_err(|e| filesystem("failed to install", &outpath, e.error))?;
        extracted.push(outpath);
    }

    Ok(extracted)
}

/// Set the owner/group/other execute bits.
pub(crate) fn make_executable(path: &Path) -> Result<(), ProvisioningError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| filesystem("failed to set executable bit on", path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Hex-encoded SHA-256 digest.
pub(crate) fn compute_sha256_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Find the digest listed for `file_name` in a `checksums.txt` body
/// (`<hex digest>  <file name>` per line).
pub(crate) fn parse_checksums(text: &str, file_name: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == file_name).then(|| digest.to_ascii_lowercase())
    })
}
