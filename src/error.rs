//! Error type shared by every tool in the kit.
//!
//! All failures are fatal for the run that produced them: each tool performs
//! one conversion or action, so there is nothing to salvage once the
//! underlying program or library gives up. The variants are grouped by where
//! the failure came from so the CLI can print a message that points at the
//! right fix (install a tool, fix a path, pass a password, …).

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the scriptkit library.
#[derive(Debug, Error)]
pub enum KitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// An argument was syntactically or semantically invalid.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Output already exists and overwriting was not requested.
    #[error("Output '{path}' already exists\nPass --overwrite to replace it.")]
    OutputExists { path: PathBuf },

    // ── External tool errors ──────────────────────────────────────────────
    /// The external program could not be started.
    #[error("'{tool}' was not found on PATH.\n{hint}")]
    ToolNotFound { tool: String, hint: String },

    /// The external program ran but exited unsuccessfully.
    #[error("'{tool}' failed ({status}):\n{stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The external program did not finish in time and was killed.
    #[error("'{tool}' timed out after {secs}s")]
    ToolTimedOut { tool: String, secs: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first use.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page selection '{selection}' matches no page (document has {total} pages)")]
    PageOutOfRange { selection: String, total: usize },

    /// pdfium returned an error while editing or saving a document.
    #[error("PDF operation '{op}' failed: {detail}")]
    PdfOperation { op: &'static str, detail: String },

    // ── Network errors ────────────────────────────────────────────────────
    /// An HTTP call (Kroki render, PDFium download) failed.
    #[error("Request to '{url}' failed: {reason}")]
    HttpFailed { url: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KitError {
    pub(crate) fn invalid(input: impl Into<String>, reason: impl Into<String>) -> Self {
        KitError::InvalidInput {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KitError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_carries_hint() {
        let e = KitError::ToolNotFound {
            tool: "ffmpeg".into(),
            hint: "Install it with: brew install ffmpeg".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("ffmpeg"), "got: {msg}");
        assert!(msg.contains("brew install"), "got: {msg}");
    }

    #[test]
    fn tool_failed_display() {
        let e = KitError::ToolFailed {
            tool: "dot".into(),
            status: "exit status: 1".into(),
            stderr: "syntax error in line 3".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exit status: 1"));
        assert!(msg.contains("line 3"));
    }

    #[test]
    fn page_out_of_range_display() {
        let e = KitError::PageOutOfRange {
            selection: "9-12".into(),
            total: 4,
        };
        assert!(e.to_string().contains("9-12"));
        assert!(e.to_string().contains("4 pages"));
    }

    #[test]
    fn invalid_helper_builds_invalid_input() {
        let e = KitError::invalid("foo.xyz", "unknown extension");
        assert!(matches!(e, KitError::InvalidInput { .. }));
        assert!(e.to_string().contains("unknown extension"));
    }
}
