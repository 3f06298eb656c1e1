//! Output side of the file boundary: clobber checks, directory creation and
//! atomic writes.
//!
//! Bytes produced in-process (PDF saves, Kroki responses, rendered pages) are
//! written to a sibling temp file and renamed into place, so an interrupted
//! run never leaves a truncated file under the final name. Files written by
//! external programs are checked afterwards with [`ensure_non_empty`].

use crate::error::KitError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Make `path` ready to receive output.
///
/// Fails with [`KitError::OutputExists`] when the file exists and
/// `overwrite` is false. Creates missing parent directories.
pub fn prepare_output(path: &Path, overwrite: bool) -> Result<(), KitError> {
    if path.exists() && !overwrite {
        return Err(KitError::OutputExists {
            path: path.to_path_buf(),
        });
    }
    ensure_parent(path)
}

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> Result<(), KitError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| KitError::write_failed(path, e))?;
        }
    }
    Ok(())
}

/// Create `dir` (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), KitError> {
    std::fs::create_dir_all(dir).map_err(|e| KitError::write_failed(dir, e))
}

/// Write `bytes` to `path` via temp file + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), KitError> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| KitError::write_failed(path, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| KitError::write_failed(path, e))?;
    tmp.persist(path)
        .map_err(|e| KitError::write_failed(path, e.error))?;
    debug!("Wrote {} bytes → {}", bytes.len(), path.display());
    Ok(())
}

/// Async variant of [`write_atomic`] for callers already on the runtime.
pub async fn write_atomic_async(path: &Path, bytes: &[u8]) -> Result<(), KitError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KitError::write_failed(path, e))?;
        }
    }
    let tmp_path = tmp_sibling(path);
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| KitError::write_failed(path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| KitError::write_failed(path, e))?;
    debug!("Wrote {} bytes → {}", bytes.len(), path.display());
    Ok(())
}

/// Confirm a tool actually produced `path` and that it is non-empty.
/// Returns the file size in bytes.
pub fn ensure_non_empty(tool: &str, path: &Path) -> Result<u64, KitError> {
    let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if len == 0 {
        return Err(KitError::ToolFailed {
            tool: tool.to_string(),
            status: "exit status: 0".into(),
            stderr: format!("no output was written to '{}'", path.display()),
        });
    }
    Ok(len)
}

/// Removes a file an external program is writing unless the run commits it.
///
/// A failed, timed-out or rejected run must not leave its half-written file
/// under the final name, where it would block the next attempt with
/// [`KitError::OutputExists`]. Only a file this run created or modified is
/// removed; an untouched pre-existing file stays.
#[derive(Debug)]
pub struct OutputGuard {
    path: PathBuf,
    before: Option<SystemTime>,
    committed: bool,
}

impl OutputGuard {
    /// Start guarding `path`. Call after [`prepare_output`].
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            before: modified(path),
            committed: false,
        }
    }

    /// Keep the file.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let now = modified(&self.path);
        let touched = match (self.before, now) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(a), Some(b)) => a != b,
        };
        if touched {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!("Removed incomplete output {}", self.path.display()),
                Err(e) => warn!(
                    "Could not remove incomplete output {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_refuses_existing_without_overwrite() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let err = prepare_output(f.path(), false).unwrap_err();
        assert!(matches!(err, KitError::OutputExists { .. }));
        assert!(prepare_output(f.path(), true).is_ok());
    }

    #[test]
    fn prepare_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a/b/out.mkv");
        prepare_output(&out, false).unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }

    #[test]
    fn atomic_write_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.pdf");
        write_atomic(&out, b"%PDF-1.4").unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-1.4");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn empty_output_is_an_error() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert!(ensure_non_empty("mmdc", f.path()).is_err());
        std::fs::write(f.path(), b"data").unwrap();
        assert_eq!(ensure_non_empty("mmdc", f.path()).unwrap(), 4);
    }

    #[test]
    fn guard_removes_uncommitted_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        {
            let _guard = OutputGuard::new(&out);
            std::fs::write(&out, b"partial").unwrap();
        }
        assert!(!out.exists());
    }

    #[test]
    fn guard_keeps_committed_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.svg");
        let guard = OutputGuard::new(&out);
        std::fs::write(&out, b"<svg/>").unwrap();
        guard.commit();
        assert!(out.exists());
    }

    #[test]
    fn guard_leaves_untouched_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("keep.png");
        std::fs::write(&out, b"old").unwrap();
        drop(OutputGuard::new(&out));
        assert_eq!(std::fs::read(&out).unwrap(), b"old");
    }

    #[tokio::test]
    async fn async_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/r.json");
        write_atomic_async(&out, b"{}").await.unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"{}");
    }
}
