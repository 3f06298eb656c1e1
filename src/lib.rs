//! # scriptkit
//!
//! Five small utilities behind one library and one `kit` binary. Each is a
//! thin wrapper that hands a single job to the program or library that is
//! good at it:
//!
//! | Module       | Job                                     | Delegates to                 |
//! |--------------|-----------------------------------------|------------------------------|
//! | [`video`]    | change a video's container              | `ffmpeg` / `ffprobe`         |
//! | [`diagram`]  | Mermaid / Graphviz / PlantUML → image   | `mmdc`, `dot`, `plantuml`, or Kroki |
//! | [`pdf`]      | merge, split, extract, rotate, render   | PDFium (`pdfium-render`)     |
//! | [`stress`]   | load-test a URL                         | `reqwest`                    |
//! | [`download`] | fetch a video from a supported site     | `yt-dlp`                     |
//!
//! The tools share nothing but plumbing: input checks ([`input`]), atomic
//! output ([`output`]), the external program runner ([`process`]), the
//! progress callback ([`TaskProgress`]) and the error type ([`KitError`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scriptkit::video::{convert, ConvertConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let report = convert(
//!         Path::new("talk.mov"),
//!         Path::new("talk.mp4"),
//!         &ConvertConfig::default(),
//!         None,
//!     )
//!     .await?;
//!     println!("{} bytes", report.output_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `kit` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scriptkit = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod diagram;
pub mod download;
pub mod error;
pub mod input;
pub mod output;
pub mod pdf;
pub mod process;
pub mod progress;
pub mod stress;
pub mod video;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use diagram::{Backend, DiagramConfig, DiagramKind, ImageFormat, RenderReport};
pub use download::{DownloadConfig, DownloadReport, MergeFormat};
pub use error::KitError;
pub use pdf::{DocumentMetadata, PageSelection, PdfReport, Rotation};
pub use progress::{NoopProgress, ProgressCallback, TaskProgress};
pub use stress::{StopHandle, StressConfig, StressReport, StressTest};
pub use video::{Container, ConvertConfig, ConvertReport};
