//! PDFium library resolution: fetch once, cache per user, bind per call.
//!
//! Resolution order on [`ensure_library`]:
//!
//! 1. `PDFIUM_LIB_PATH` pointing at an existing file.
//! 2. `<cache>/pdfium-{VERSION}/<libname>` from an earlier download.
//! 3. Download the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//!    and extract the library into the cache.
//!
//! `<cache>` is `KIT_PDFIUM_CACHE_DIR` when set, otherwise the platform cache
//! directory joined with `scriptkit`.

use crate::error::KitError;
use crate::progress::{emit, ProgressCallback};
use futures::StreamExt;
use pdfium_render::prelude::Pdfium;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Platform {
    archive: &'static str,
    member: &'static str,
    lib_name: &'static str,
}

fn platform_for(os: &str, arch: &str) -> Option<Platform> {
    let (archive, member, lib_name) = match (os, arch) {
        ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
        _ => return None,
    };
    Some(Platform {
        archive,
        member,
        lib_name,
    })
}

fn current_platform() -> Result<Platform, KitError> {
    let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
    platform_for(os, arch).ok_or_else(|| {
        KitError::PdfiumBindingFailed(format!(
            "no prebuilt PDFium for {os}/{arch}; set PDFIUM_LIB_PATH"
        ))
    })
}

/// Per-version directory holding the downloaded library.
pub fn cache_dir() -> PathBuf {
    let base = match std::env::var_os("KIT_PDFIUM_CACHE_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("scriptkit"),
    };
    base.join(format!("pdfium-{PDFIUM_VERSION}"))
}

fn env_library() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os("PDFIUM_LIB_PATH")?);
    if path.is_file() {
        Some(path)
    } else {
        warn!(
            "PDFIUM_LIB_PATH '{}' does not exist; falling back to the cache",
            path.display()
        );
        None
    }
}

/// The library path if one is available without network access.
pub fn cached_library() -> Option<PathBuf> {
    if let Some(p) = RESOLVED.get() {
        return Some(p.clone());
    }
    if let Some(p) = env_library() {
        return Some(p);
    }
    let platform = current_platform().ok()?;
    let p = cache_dir().join(platform.lib_name);
    p.is_file().then_some(p)
}

/// Make sure a PDFium library exists locally, downloading it if needed.
///
/// Download progress is reported in bytes.
pub async fn ensure_library(progress: Option<&ProgressCallback>) -> Result<PathBuf, KitError> {
    if let Some(path) = cached_library() {
        let _ = RESOLVED.set(path.clone());
        return Ok(path);
    }

    let platform = current_platform()?;
    let dir = cache_dir();
    let dest = dir.join(platform.lib_name);
    let url = format!("{BASE_URL}/chromium%2F{PDFIUM_VERSION}/{}", platform.archive);

    info!("PDFium not found locally, downloading {}", url);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| KitError::write_failed(&dir, e))?;

    let archive = match download(&url, progress).await {
        Ok(bytes) => bytes,
        Err(e) => {
            emit(progress, |p| p.on_finish(false));
            return Err(e);
        }
    };
    emit(progress, |p| p.on_finish(true));

    let member = platform.member;
    let target = dest.clone();
    tokio::task::spawn_blocking(move || extract_member(&archive, member, &target))
        .await
        .map_err(|e| KitError::Internal(format!("Extract task panicked: {e}")))??;

    info!("PDFium cached at {}", dest.display());
    let _ = RESOLVED.set(dest.clone());
    Ok(dest)
}

async fn download(url: &str, progress: Option<&ProgressCallback>) -> Result<Vec<u8>, KitError> {
    let http_err = |reason: String| KitError::HttpFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .user_agent(concat!("scriptkit/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| http_err(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| http_err(e.to_string()))?;
    if !response.status().is_success() {
        return Err(http_err(format!("HTTP {}", response.status())));
    }

    let total = response.content_length();
    emit(progress, |p| p.on_start("Downloading PDFium", total));

    let mut buf = Vec::with_capacity(total.unwrap_or(32 * 1024 * 1024) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| http_err(e.to_string()))?;
        buf.extend_from_slice(&chunk);
        emit(progress, |p| p.on_position(buf.len() as u64));
    }
    debug!("Downloaded {} bytes", buf.len());
    Ok(buf)
}

/// Pull one file out of a gzipped tarball into `dest`.
///
/// The member is copied into a temp file beside `dest` and only persisted
/// once complete, so an interrupted extraction never leaves a truncated
/// library where [`cached_library`] would trust it.
fn extract_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), KitError> {
    use flate2::read::GzDecoder;
    use std::io::Write;
    use tar::Archive;

    let extract_err = |detail: String| KitError::PdfiumBindingFailed(format!("extracting {member}: {detail}"));

    let mut tarball = Archive::new(GzDecoder::new(archive));
    for entry in tarball.entries().map_err(|e| extract_err(e.to_string()))? {
        let mut entry = entry.map_err(|e| extract_err(e.to_string()))?;
        let is_member = entry
            .path()
            .map(|p| p.to_string_lossy() == member)
            .map_err(|e| extract_err(e.to_string()))?;
        if is_member {
            let dir = match dest.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let mut tmp = tempfile::NamedTempFile::new_in(dir)
                .map_err(|e| KitError::write_failed(dest, e))?;
            let expected = entry.header().size().map_err(|e| extract_err(e.to_string()))?;
            let copied = std::io::copy(&mut entry, &mut tmp)
                .and_then(|n| tmp.flush().map(|_| n))
                .and_then(|n| tmp.as_file().sync_all().map(|_| n))
                .map_err(|e| KitError::write_failed(dest, e))?;
            if copied != expected {
                return Err(extract_err(format!("truncated ({copied} of {expected} bytes)")));
            }
            tmp.persist(dest)
                .map_err(|e| KitError::write_failed(dest, e.error))?;
            return Ok(());
        }
    }
    Err(extract_err("not present in archive".to_string()))
}

/// Bind to PDFium: the resolved library if there is one, the system library
/// otherwise.
///
/// Blocking; call from inside `spawn_blocking`.
pub fn bind() -> Result<Pdfium, KitError> {
    let bindings = match cached_library() {
        Some(path) => {
            debug!("Binding PDFium from {}", path.display());
            Pdfium::bind_to_library(&path)
        }
        None => {
            debug!("Binding system PDFium");
            Pdfium::bind_to_system_library()
        }
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| KitError::PdfiumBindingFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    #[test]
    fn known_platforms_resolve() {
        let p = platform_for("linux", "x86_64").unwrap();
        assert_eq!(p.archive, "pdfium-linux-x64.tgz");
        assert_eq!(p.member, "lib/libpdfium.so");
        let p = platform_for("windows", "x86").unwrap();
        assert_eq!(p.lib_name, "pdfium.dll");
        assert!(platform_for("freebsd", "x86_64").is_none());
    }

    #[test]
    fn cache_dir_is_versioned() {
        let d = cache_dir();
        assert!(d.to_string_lossy().ends_with(&format!("pdfium-{PDFIUM_VERSION}")));
    }

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn extracts_only_the_requested_member() {
        let archive = tarball(&[("include/fpdfview.h", b"hdr"), ("lib/libpdfium.so", b"ELF")]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        extract_member(&archive, "lib/libpdfium.so", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF");
        assert!(!dir.path().join("fpdfview.h").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn truncated_archive_leaves_no_library() {
        let mut archive = tarball(&[("lib/libpdfium.so", &[7u8; 64 * 1024])]);
        archive.truncate(archive.len() / 2);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        assert!(extract_member(&archive, "lib/libpdfium.so", &dest).is_err());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_member_is_an_error() {
        let archive = tarball(&[("README", b"x")]);
        let dir = tempfile::tempdir().unwrap();
        let err = extract_member(&archive, "lib/libpdfium.so", &dir.path().join("l.so")).unwrap_err();
        assert!(err.to_string().contains("not present"));
    }
}
