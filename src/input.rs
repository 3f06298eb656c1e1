//! Input validation: check user-supplied paths and URLs before any external
//! program is started.
//!
//! External tools report a missing or unreadable input in their own words
//! (ffmpeg: "No such file or directory", pdfium: an opaque load error).
//! Checking up front gives one consistent message per failure mode and keeps
//! the tool from being spawned at all.

use crate::error::KitError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Validate that `url` is an absolute http(s) URL.
pub fn require_url(url: &str) -> Result<reqwest::Url, KitError> {
    if !is_url(url) {
        return Err(KitError::invalid(url, "not an HTTP/HTTPS URL"));
    }
    reqwest::Url::parse(url).map_err(|e| KitError::invalid(url, e.to_string()))
}

/// Validate that `path` is an existing, readable regular file.
pub fn require_file(path: &Path) -> Result<PathBuf, KitError> {
    if !path.exists() {
        return Err(KitError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(KitError::invalid(
            path.display().to_string(),
            "expected a file, found a directory",
        ));
    }

    match std::fs::File::open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(KitError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(KitError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved input file: {}", path.display());
    Ok(path.to_path_buf())
}

/// Validate that `path` is a readable file starting with the `%PDF` magic.
pub fn require_pdf(path: &Path) -> Result<PathBuf, KitError> {
    let path = require_file(path)?;
    let mut f = std::fs::File::open(&path).map_err(|_| KitError::FileNotFound {
        path: path.clone(),
    })?;
    let mut head = Vec::with_capacity(4);
    f.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|e| KitError::invalid(path.display().to_string(), e.to_string()))?;
    if head != b"%PDF" {
        let mut magic = [0u8; 4];
        magic[..head.len()].copy_from_slice(&head);
        return Err(KitError::NotAPdf { path, magic });
    }
    Ok(path)
}

/// Lower-cased extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
