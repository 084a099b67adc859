//! Content-addressed kubeconfig cache
//!
//! Callers sometimes hold a kubeconfig as a string (e.g. from an API or an
//! environment variable) while the kube client wants a file. The content is
//! written once under a directory named by its SHA-256 digest and reused on
//! later calls.
//!
//! Cache location: ~/.kwait/kubeconfigs/<digest>/config

use crate::error::WaitError;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const CONFIG_FILE: &str = "config";

/// Default cache root, if a home directory is known
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kwait").join("kubeconfigs"))
}

/// Hex-encoded SHA-256 of the kubeconfig content
pub fn content_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Path of the cached file for `content`, writing it on first use
///
/// An existing non-empty file is reused as-is; the digest in the path already
/// ties it to the content.
pub fn kubeconfig_path(content: &str, base_dir: &Path) -> Result<PathBuf, WaitError> {
    let dir = base_dir.join(content_digest(content));
    let path = dir.join(CONFIG_FILE);

    match fs::read_to_string(&path) {
        Ok(existing) if !existing.is_empty() => {
            debug!("Reusing cached kubeconfig {:?}", path);
            return Ok(path);
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    fs::create_dir_all(&dir)?;
    atomic_write(&path, content.as_bytes())?;
    debug!("Wrote kubeconfig to {:?}", path);
    Ok(path)
}

/// Write via a temp file in the same directory and rename it into place,
/// so concurrent readers never see a partial file
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_file = NamedTempFile::new_in(parent)?;
    fs::write(temp_file.path(), content)?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
